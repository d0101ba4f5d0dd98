//! Notification presenter.
//!
//! Queues dose alerts raised by the checker until the user acknowledges
//! them. The queue is all-or-nothing: there is no per-entry acknowledgment,
//! only "stop" which silences the alarm and clears everything. Exactly one
//! continuous alarm is active while anything is pending; a second pending
//! entry never stacks a second alarm.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::model::Notification;

#[derive(Debug, Default)]
struct PresenterState {
    pending: Vec<Notification>,
    alarm_active: bool,
}

/// Shared pending-alert queue. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct NotificationPresenter {
    inner: Arc<RwLock<PresenterState>>,
}

impl NotificationPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a dose alert to the pending queue and make sure the alarm is
    /// sounding.
    pub async fn notify(&self, entry: Notification) {
        let mut state = self.inner.write().await;

        info!(med = %entry.med_name, time = %entry.time, "dose due");
        state.pending.push(entry);

        if !state.alarm_active {
            state.alarm_active = true;
            info!("alarm started");
        }
    }

    /// Stop the alarm and clear the whole pending queue.
    pub async fn acknowledge_all(&self) {
        let mut state = self.inner.write().await;

        let cleared = state.pending.len();
        state.pending.clear();
        if state.alarm_active {
            state.alarm_active = false;
            info!(cleared, "alarm acknowledged");
        }
    }

    /// Current pending entries (oldest first) and whether the alarm is
    /// sounding.
    pub async fn pending(&self) -> (Vec<Notification>, bool) {
        let state = self.inner.read().await;
        (state.pending.clone(), state.alarm_active)
    }
}
