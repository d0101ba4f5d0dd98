//! Schedule and settings synchronization engine.
//!
//! The engine owns the canonical in-memory schedule collection and settings
//! for one authenticated identity. Every mutation flows through it:
//!
//! 1. the local cache is updated optimistically,
//! 2. the *entire* collection is persisted to the remote store (whole-value
//!    overwrite, never a per-item patch),
//! 3. the updated set is pushed to the dispensing device on a spawned task.
//!
//! [`SyncEngine::subscribe`] applies the current remote state, then starts
//! watcher tasks that wholesale-replace the caches whenever the store emits
//! a snapshot. The client never merges: whichever write reaches the store
//! last is what every subscriber converges to. A persistence failure is
//! surfaced to the caller without rolling back the in-memory state; the next
//! incoming snapshot reconciles it. A snapshot read before a concurrent
//! local edit committed is discarded rather than applied over the newer
//! cache; the edit's own persisted echo follows it.
//!
//! Concurrent edits are not mutually excluded. Two racing saves both perform
//! a full-collection overwrite and the later one silently discards the
//! earlier one's persisted effect. That lost-update behavior is inherent to
//! whole-value replication and is accepted for this single-user system.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

use crate::device::DevicePusher;
use crate::model::{CONTAINER_COUNT, ContainerSettings, Schedule, ScheduleDraft, Settings, Theme, WEEKDAYS};
use crate::store::Store;
use crate::timefmt;

/// Errors surfaced by engine mutations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A local precondition failed; nothing was mutated or sent anywhere.
    #[error("validation failed: {0}")]
    Validation(&'static str),

    /// The remote write failed. The optimistic in-memory mutation stands;
    /// the next snapshot or successful save reconciles it.
    #[error("remote write failed: {0}")]
    RemoteWrite(#[source] anyhow::Error),
}

/// Which cache a change event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Schedules,
    Settings,
}

/// Synchronization engine for one user session. Cheap to clone; clones share
/// the caches and subscription state.
#[derive(Clone)]
pub struct SyncEngine {
    store: Store,
    pusher: DevicePusher,
    uid: String,
    schedules: Arc<RwLock<Vec<Schedule>>>,
    settings: Arc<RwLock<Settings>>,
    // Bumped inside the cache write lock on every local edit. Snapshot
    // application compares against the value it read before decoding, so a
    // snapshot that predates a local edit is never applied over it.
    schedules_gen: Arc<AtomicU64>,
    settings_gen: Arc<AtomicU64>,
    changes: broadcast::Sender<Change>,
    subscribed: Arc<AtomicBool>,
}

impl SyncEngine {
    /// Create an engine bound to one authenticated identity.
    pub fn new(store: Store, pusher: DevicePusher, uid: &str) -> Self {
        let (changes, _) = broadcast::channel(32);
        Self {
            store,
            pusher,
            uid: uid.to_string(),
            schedules: Arc::new(RwLock::new(Vec::new())),
            settings: Arc::new(RwLock::new(Settings::default())),
            schedules_gen: Arc::new(AtomicU64::new(0)),
            settings_gen: Arc::new(AtomicU64::new(0)),
            changes,
            subscribed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn schedules_path(&self) -> String {
        format!("users/{}/schedules", self.uid)
    }

    fn settings_path(&self) -> String {
        format!("users/{}/settings", self.uid)
    }

    /// Begin observing the remote store for this identity.
    ///
    /// Idempotent: repeated calls never spawn a second watcher pair. The
    /// current snapshots are applied before this returns, so an edit made
    /// right after subscribing can never be clobbered by pre-subscription
    /// state applied late; the watcher tasks then apply one snapshot per
    /// store emission and end when the store goes away.
    pub async fn subscribe(&self) -> anyhow::Result<()> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut schedules_rx = self.store.watch(&self.schedules_path()).await?;
        let mut settings_rx = self.store.watch(&self.settings_path()).await?;
        info!(uid = %self.uid, "subscribed to remote store");

        let seen_gen = self.schedules_gen.load(Ordering::SeqCst);
        let initial = schedules_rx.borrow_and_update().clone();
        self.apply_schedules_snapshot(initial, seen_gen).await;

        let seen_gen = self.settings_gen.load(Ordering::SeqCst);
        let initial = settings_rx.borrow_and_update().clone();
        self.apply_settings_snapshot(initial, seen_gen).await;

        let engine = self.clone();
        tokio::spawn(async move {
            while schedules_rx.changed().await.is_ok() {
                let seen_gen = engine.schedules_gen.load(Ordering::SeqCst);
                let snapshot = schedules_rx.borrow_and_update().clone();
                engine.apply_schedules_snapshot(snapshot, seen_gen).await;
            }
        });

        let engine = self.clone();
        tokio::spawn(async move {
            while settings_rx.changed().await.is_ok() {
                let seen_gen = engine.settings_gen.load(Ordering::SeqCst);
                let snapshot = settings_rx.borrow_and_update().clone();
                engine.apply_settings_snapshot(snapshot, seen_gen).await;
            }
        });

        Ok(())
    }

    /// Replace the schedule cache with a remote snapshot.
    ///
    /// `seen_gen` is the edit generation observed when the snapshot was
    /// read: if a local edit has committed since, the snapshot is stale and
    /// is dropped (the edit's own echo arrives next). A snapshot that
    /// differs from the local cache came from another writer, so it is
    /// mirrored to the device; the loopback of our own write is identical
    /// to the cache and skipped.
    async fn apply_schedules_snapshot(&self, snapshot: Option<Value>, seen_gen: u64) {
        let incoming = decode_schedule_map(snapshot);

        let externally_changed = {
            let mut schedules = self.schedules.write().await;
            if self.schedules_gen.load(Ordering::SeqCst) != seen_gen {
                debug!("dropping schedule snapshot read before a local edit");
                return;
            }
            let differs = *schedules != incoming;
            *schedules = incoming.clone();
            differs
        };

        debug!(count = incoming.len(), "schedules replaced from snapshot");
        let _ = self.changes.send(Change::Schedules);

        if externally_changed {
            self.spawn_push(incoming);
        }
    }

    /// Replace the settings cache with a remote snapshot, unless a local
    /// edit committed after the snapshot was read.
    async fn apply_settings_snapshot(&self, snapshot: Option<Value>, seen_gen: u64) {
        let incoming = Settings::from_remote(snapshot.as_ref());

        {
            let mut settings = self.settings.write().await;
            if self.settings_gen.load(Ordering::SeqCst) != seen_gen {
                debug!("dropping settings snapshot read before a local edit");
                return;
            }
            *settings = incoming;
        }

        debug!("settings replaced from snapshot");
        let _ = self.changes.send(Change::Settings);
    }

    /// Snapshot of the current schedule collection.
    pub async fn schedules(&self) -> Vec<Schedule> {
        self.schedules.read().await.clone()
    }

    /// Snapshot of the current settings.
    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    /// Receive a change event after every cache replacement. This is the
    /// hook reactive consumers (renderers, tests) attach to.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    /// Create a new schedule, or replace the existing record in place when
    /// the draft carries an id. A draft id matching no current record is a
    /// validation failure, never a silent append.
    ///
    /// New ids derive from the current time in milliseconds. Draft times
    /// are normalized to display form. Returns the committed record.
    pub async fn create_or_update_schedule(
        &self,
        draft: ScheduleDraft,
    ) -> Result<Schedule, EngineError> {
        if draft.days.is_empty() {
            return Err(EngineError::Validation("no days selected"));
        }
        if draft.days.iter().any(|day| !WEEKDAYS.contains(&day.as_str())) {
            return Err(EngineError::Validation("unknown day name"));
        }
        if !(1..=CONTAINER_COUNT).contains(&draft.container) {
            return Err(EngineError::Validation("unknown container"));
        }

        let (record, snapshot) = {
            let mut schedules = self.schedules.write().await;

            // Ids derive from the wall clock; API callers can create faster
            // than the clock ticks, so bump until unique.
            let id = match draft.id {
                Some(id) => {
                    if !schedules.iter().any(|s| s.id == id) {
                        return Err(EngineError::Validation("unknown schedule id"));
                    }
                    id
                }
                None => {
                    let mut id = Utc::now().timestamp_millis();
                    while schedules.iter().any(|s| s.id == id) {
                        id += 1;
                    }
                    id
                }
            };

            let record = Schedule {
                id,
                container: draft.container,
                days: draft.days,
                pill_count: draft.pill_count,
                times: draft
                    .times
                    .iter()
                    .map(|time| timefmt::normalize(time))
                    .collect(),
                med_name: draft.med_name.filter(|name| !name.trim().is_empty()),
            };

            match schedules.iter_mut().find(|s| s.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => schedules.push(record.clone()),
            }
            self.schedules_gen.fetch_add(1, Ordering::SeqCst);
            (record, schedules.clone())
        };

        self.persist_schedules(&snapshot).await?;
        info!(id = record.id, container = record.container, "schedule saved");
        self.spawn_push(snapshot);

        Ok(record)
    }

    /// Remove the schedule with the given id. Unknown ids are a no-op, but
    /// the (unchanged) collection is still persisted and pushed.
    pub async fn delete_schedule(&self, id: i64) -> Result<(), EngineError> {
        let snapshot = {
            let mut schedules = self.schedules.write().await;
            schedules.retain(|s| s.id != id);
            self.schedules_gen.fetch_add(1, Ordering::SeqCst);
            schedules.clone()
        };

        self.persist_schedules(&snapshot).await?;
        info!(id, remaining = snapshot.len(), "schedule deleted");
        self.spawn_push(snapshot);

        Ok(())
    }

    /// Replace the tuning values for one container and persist the whole
    /// settings object.
    pub async fn set_container_settings(
        &self,
        container: u8,
        values: ContainerSettings,
    ) -> Result<(), EngineError> {
        if !(1..=CONTAINER_COUNT).contains(&container) {
            return Err(EngineError::Validation("unknown container"));
        }

        let snapshot = {
            let mut settings = self.settings.write().await;
            settings.containers.insert(container, values);
            self.settings_gen.fetch_add(1, Ordering::SeqCst);
            settings.clone()
        };

        self.persist_settings(&snapshot).await?;
        info!(container, "container settings saved");
        Ok(())
    }

    /// Set the global theme flag and persist the whole settings object.
    ///
    /// Theme and container tuning share one remote value, so a theme toggle
    /// racing a tuning edit loses one of the two in-flight writes. Accepted
    /// limitation of whole-value overwrite.
    pub async fn set_theme(&self, theme: Theme) -> Result<(), EngineError> {
        let snapshot = {
            let mut settings = self.settings.write().await;
            settings.theme = Some(theme);
            self.settings_gen.fetch_add(1, Ordering::SeqCst);
            settings.clone()
        };

        self.persist_settings(&snapshot).await?;
        info!(theme = ?theme, "theme saved");
        Ok(())
    }

    /// Persist the full schedule collection as an id-keyed object map.
    async fn persist_schedules(&self, schedules: &[Schedule]) -> Result<(), EngineError> {
        let mut map = serde_json::Map::new();
        for schedule in schedules {
            let value = serde_json::to_value(schedule)
                .map_err(|e| EngineError::RemoteWrite(e.into()))?;
            map.insert(schedule.id.to_string(), value);
        }

        self.store
            .put(&self.schedules_path(), &Value::Object(map))
            .await
            .map_err(EngineError::RemoteWrite)
    }

    async fn persist_settings(&self, settings: &Settings) -> Result<(), EngineError> {
        self.store
            .put(&self.settings_path(), &settings.to_remote())
            .await
            .map_err(EngineError::RemoteWrite)
    }

    /// Push a schedule snapshot to the device without blocking the caller.
    fn spawn_push(&self, schedules: Vec<Schedule>) {
        let pusher = self.pusher.clone();
        tokio::spawn(async move {
            pusher.push(&schedules).await;
        });
    }
}

/// Decode a remote `id -> record` object map into the in-memory collection.
///
/// Ids are creation timestamps, so ascending id order reproduces insertion
/// order. An absent value is an empty collection; individual records that do
/// not decode are skipped so one corrupt record never hides the rest.
fn decode_schedule_map(value: Option<Value>) -> Vec<Schedule> {
    let map = match value {
        Some(Value::Object(map)) => map,
        None | Some(Value::Null) => return Vec::new(),
        Some(_) => {
            warn!("schedules value has unexpected shape, treating as empty");
            return Vec::new();
        }
    };

    let mut entries: Vec<(i64, Schedule)> = Vec::with_capacity(map.len());
    for (key, raw) in map {
        match serde_json::from_value::<Schedule>(raw) {
            Ok(schedule) => {
                let order = key.parse::<i64>().unwrap_or(schedule.id);
                entries.push((order, schedule));
            }
            Err(e) => warn!(key = %key, error = %e, "skipping malformed schedule record"),
        }
    }
    entries.sort_by_key(|(order, _)| *order);
    entries.into_iter().map(|(_, schedule)| schedule).collect()
}
