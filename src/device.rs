//! HTTP client for the dispensing device.
//!
//! The device is a microcontroller on the local network. It accepts the full
//! schedule set at `POST /updateSchedules` and answers with a plain-text
//! acknowledgment that is logged but never parsed. Schedule pushes are
//! best-effort: a timeout or refusal is logged and swallowed, never retried,
//! and never surfaced to the save flow. The next successful schedule commit
//! re-sends the complete set, which is recovery enough because the device
//! never receives deltas.
//!
//! The legacy `testMotor`/`testSchedule` endpoints are different: they back
//! interactive buttons, so their failures are surfaced to the caller.

use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::model::Schedule;

/// Bound on every device call; the device either answers quickly on the LAN
/// or not at all.
const DEVICE_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the dispensing device's HTTP endpoints.
#[derive(Clone)]
pub struct DevicePusher {
    client: reqwest::Client,
    base_url: String,
}

impl DevicePusher {
    /// Create a pusher targeting `base_url` (e.g. "http://192.168.1.175").
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(DEVICE_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Send the full schedule collection to the device.
    ///
    /// Fire-and-forget: every failure mode is logged and discarded so a dead
    /// or absent device can never block or fail a schedule save.
    pub async fn push(&self, schedules: &[Schedule]) {
        let url = format!("{}/updateSchedules", self.base_url);
        let body = json!({ "schedules": schedules });

        debug!(count = schedules.len(), "pushing schedules to device");

        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                let reply = response.text().await.unwrap_or_default();
                debug!(reply = %reply, "device acknowledged schedule push");
            }
            Ok(response) => {
                warn!(status = %response.status(), "device rejected schedule push");
            }
            Err(e) => {
                warn!(error = %e, "failed to reach device for schedule push");
            }
        }
    }

    /// Run the device's motor test for one container with the given tuning
    /// values. Returns the device's plain-text reply.
    pub async fn test_motor(
        &self,
        container: u8,
        motor_speed: i64,
        trigger_threshold: i64,
    ) -> anyhow::Result<String> {
        let url = format!("{}/testMotor", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("container", container.to_string()),
                ("motorSpeed", motor_speed.to_string()),
                ("triggerThreshold", trigger_threshold.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.text().await?)
    }

    /// Trigger the device's schedule dry-run. Returns the plain-text reply.
    pub async fn test_schedule(&self) -> anyhow::Result<String> {
        let url = format!("{}/testSchedule", self.base_url);
        let response = self.client.get(&url).send().await?.error_for_status()?;

        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schedule() -> Schedule {
        Schedule {
            id: 1700000000000,
            container: 1,
            days: vec!["Monday".to_string()],
            pill_count: 1,
            times: vec!["8:00 AM".to_string()],
            med_name: None,
        }
    }

    #[tokio::test]
    async fn test_push_swallows_unreachable_device() {
        // Nothing listens on this port; push must return without error.
        let pusher = DevicePusher::new("http://127.0.0.1:1").unwrap();
        pusher.push(&[sample_schedule()]).await;
    }

    #[tokio::test]
    async fn test_motor_surfaces_unreachable_device() {
        let pusher = DevicePusher::new("http://127.0.0.1:1").unwrap();
        assert!(pusher.test_motor(1, 128, 1500).await.is_err());
        assert!(pusher.test_schedule().await.is_err());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let pusher = DevicePusher::new("http://device.local/").unwrap();
        assert_eq!(pusher.base_url, "http://device.local");
    }
}
