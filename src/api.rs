//! HTTP API handlers for Pillbox.
//!
//! The API is the control-panel surface over the sync engine: schedule CRUD,
//! per-container settings, theme, pending notifications, and passthroughs to
//! the device's legacy test endpoints.
//!
//! Error mapping follows the engine's taxonomy: validation failures are
//! `422 Unprocessable Entity`, remote-write failures are
//! `500 Internal Server Error` (the optimistic local state stands either
//! way), and device test failures are `502 Bad Gateway`. Schedule pushes to
//! the device never surface here at all.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::device::DevicePusher;
use crate::engine::{EngineError, SyncEngine};
use crate::model::{ContainerSettings, Notification, Schedule, ScheduleDraft, Theme};
use crate::notify::NotificationPresenter;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: SyncEngine,
    pub presenter: NotificationPresenter,
    pub device: DevicePusher,
}

fn engine_error_status(error: &EngineError) -> StatusCode {
    match error {
        EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::RemoteWrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// GET /schedules - The current schedule collection, insertion-ordered.
#[instrument(skip(state))]
pub async fn get_schedules(State(state): State<AppState>) -> Json<Vec<Schedule>> {
    Json(state.engine.schedules().await)
}

/// POST /schedules - Create a schedule, or update one when the draft
/// carries an `id`.
///
/// # Request Body
///
/// ```json
/// {
///     "container": 1,
///     "days": ["Monday", "Friday"],
///     "pillCount": 2,
///     "times": ["08:00", "20:00"],
///     "medName": "Aspirin"
/// }
/// ```
///
/// # Response
///
/// `201 Created` with the committed record; `422` when validation fails
/// (e.g. no days selected, or an `id` matching no existing record), `500`
/// when the remote write fails.
#[instrument(skip(state, draft))]
pub async fn post_schedule(
    State(state): State<AppState>,
    Json(draft): Json<ScheduleDraft>,
) -> impl IntoResponse {
    match state.engine.create_or_update_schedule(draft).await {
        Ok(record) => {
            info!(id = record.id, container = record.container, "schedule committed");
            (StatusCode::CREATED, Json(record)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "failed to save schedule");
            engine_error_status(&e).into_response()
        }
    }
}

/// DELETE /schedules/:id - Remove a schedule. Unknown ids are a no-op and
/// still answer `204 No Content`.
#[instrument(skip(state))]
pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    match state.engine.delete_schedule(id).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            warn!(id, error = %e, "failed to delete schedule");
            Err(engine_error_status(&e))
        }
    }
}

/// GET /settings - The settings object in its persisted flat shape
/// (container keys `"1".."4"` plus `"theme"`).
#[instrument(skip(state))]
pub async fn get_settings(State(state): State<AppState>) -> Json<Value> {
    Json(state.engine.settings().await.to_remote())
}

/// PUT /settings/:container - Replace one container's tuning values.
///
/// # Request Body
///
/// ```json
/// { "motorSpeed": 128, "triggerThreshold": 1500 }
/// ```
#[instrument(skip(state, values))]
pub async fn put_container_settings(
    State(state): State<AppState>,
    Path(container): Path<u8>,
    Json(values): Json<ContainerSettings>,
) -> Result<StatusCode, StatusCode> {
    match state.engine.set_container_settings(container, values).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            warn!(container, error = %e, "failed to save container settings");
            Err(engine_error_status(&e))
        }
    }
}

/// Request body for PUT /theme.
#[derive(Debug, Deserialize)]
pub struct ThemeRequest {
    pub theme: Theme,
}

/// PUT /theme - Set the global theme flag.
#[instrument(skip(state))]
pub async fn put_theme(
    State(state): State<AppState>,
    Json(request): Json<ThemeRequest>,
) -> Result<StatusCode, StatusCode> {
    match state.engine.set_theme(request.theme).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            warn!(error = %e, "failed to save theme");
            Err(engine_error_status(&e))
        }
    }
}

/// Response for GET /notifications.
#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<Notification>,
    /// Whether the continuous alert is currently sounding.
    #[serde(rename = "alarmActive")]
    pub alarm_active: bool,
}

/// GET /notifications - Pending dose alerts, oldest first.
#[instrument(skip(state))]
pub async fn get_notifications(State(state): State<AppState>) -> Json<NotificationsResponse> {
    let (notifications, alarm_active) = state.presenter.pending().await;
    Json(NotificationsResponse {
        notifications,
        alarm_active,
    })
}

/// POST /notifications/ack - Stop the alarm and clear all pending alerts.
#[instrument(skip(state))]
pub async fn ack_notifications(State(state): State<AppState>) -> StatusCode {
    state.presenter.acknowledge_all().await;
    info!("notifications acknowledged");
    StatusCode::NO_CONTENT
}

/// Request body for POST /containers/:container/test-motor.
#[derive(Debug, Deserialize)]
pub struct TestMotorRequest {
    #[serde(rename = "motorSpeed")]
    pub motor_speed: i64,
    #[serde(rename = "triggerThreshold")]
    pub trigger_threshold: i64,
}

/// POST /containers/:container/test-motor - Run the device's motor test
/// with the given tuning values. Answers with the device's plain-text reply,
/// or `502 Bad Gateway` when the device cannot be reached.
#[instrument(skip(state, request))]
pub async fn test_motor(
    State(state): State<AppState>,
    Path(container): Path<u8>,
    Json(request): Json<TestMotorRequest>,
) -> Result<String, StatusCode> {
    match state
        .device
        .test_motor(container, request.motor_speed, request.trigger_threshold)
        .await
    {
        Ok(reply) => {
            info!(container, "motor test ran");
            Ok(reply)
        }
        Err(e) => {
            warn!(container, error = %e, "motor test failed");
            Err(StatusCode::BAD_GATEWAY)
        }
    }
}

/// POST /device/test-schedule - Trigger the device's schedule dry-run.
#[instrument(skip(state))]
pub async fn test_schedule(State(state): State<AppState>) -> Result<String, StatusCode> {
    match state.device.test_schedule().await {
        Ok(reply) => {
            info!("schedule test ran");
            Ok(reply)
        }
        Err(e) => {
            warn!(error = %e, "schedule test failed");
            Err(StatusCode::BAD_GATEWAY)
        }
    }
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
