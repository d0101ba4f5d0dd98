//! Dose-time checker.
//!
//! Once per tick the checker compares the wall clock against every
//! schedule's day-set and time-set. Matching is string equality at minute
//! granularity: the current time is formatted with the same 12-hour pattern
//! the stored times use, and the weekday is the full English name. A matched
//! occurrence is keyed by `"{scheduleId}-{timeIndex}"` and recorded in a
//! notified-set whose entries expire after 60 seconds, which with a
//! 1-second poll gives an at-most-once-per-minute delivery guarantee that
//! tolerates clock and poll jitter without any monotonic bookkeeping.
//!
//! The matching logic is pure over an explicit `now` so tests drive it with
//! a simulated clock; the ticking loop lives in [`CheckerTask`].

use chrono::{DateTime, Local};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::engine::SyncEngine;
use crate::model::{Notification, Schedule};
use crate::notify::NotificationPresenter;
use crate::timefmt;

/// How often the wall clock is compared against the schedules.
pub const CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Seconds before a fired occurrence may fire again.
const RENOTIFY_AFTER_SECS: i64 = 60;

/// Evaluates schedules against the clock and deduplicates occurrences.
#[derive(Debug, Default)]
pub struct ScheduleChecker {
    /// Occurrence key -> when it fired. Entries expire after
    /// [`RENOTIFY_AFTER_SECS`].
    notified: HashMap<String, DateTime<Local>>,
}

impl ScheduleChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// One tick: return the notifications due at `now`.
    ///
    /// Never fails: schedules whose `days`/`times` decoded as empty simply
    /// match nothing.
    pub fn check(&mut self, schedules: &[Schedule], now: DateTime<Local>) -> Vec<Notification> {
        self.notified
            .retain(|_, fired_at| (now - *fired_at).num_seconds() < RENOTIFY_AFTER_SECS);

        let day = now.format("%A").to_string();
        let current_time = now.format(timefmt::DISPLAY_FORMAT).to_string();

        let mut due = Vec::new();
        for schedule in schedules {
            if !schedule.days.iter().any(|d| *d == day) {
                continue;
            }
            for (index, time) in schedule.times.iter().enumerate() {
                if *time != current_time {
                    continue;
                }
                let pill_id = format!("{}-{}", schedule.id, index);
                if self.notified.contains_key(&pill_id) {
                    continue;
                }
                self.notified.insert(pill_id.clone(), now);
                due.push(Notification {
                    med_name: schedule.display_name(),
                    time: time.clone(),
                    pill_id,
                });
            }
        }
        due
    }
}

/// Owns the recurring checker loop for one session.
///
/// `start` is idempotent (a session never runs two timers) and `stop` aborts
/// the loop; both may be called in any order.
#[derive(Default)]
pub struct CheckerTask {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl CheckerTask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn the ticking loop if it is not already running.
    pub async fn start(&self, engine: SyncEngine, presenter: NotificationPresenter) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return;
        }
        *handle = Some(tokio::spawn(run_loop(engine, presenter)));
    }

    /// Abort the ticking loop. Safe to call when it was never started.
    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }
}

/// Reads the engine's current schedules every tick and hands due doses to
/// the presenter. Runs for the life of the session; nothing in here can
/// stop the loop.
async fn run_loop(engine: SyncEngine, presenter: NotificationPresenter) {
    let mut checker = ScheduleChecker::new();
    let mut ticker = tokio::time::interval(CHECK_INTERVAL);
    loop {
        ticker.tick().await;
        let schedules = engine.schedules().await;
        for entry in checker.check(&schedules, Local::now()) {
            presenter.notify(entry).await;
        }
    }
}
