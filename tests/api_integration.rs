//! Integration tests for Pillbox API endpoints.
//!
//! These tests verify the full request/response cycle through the HTTP API,
//! backed by an in-memory store and a deliberately unreachable device
//! endpoint (schedule saves must never depend on the device).

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use axum_test::TestServer;
use serde_json::json;

use pillbox::api::{
    AppState, ack_notifications, delete_schedule, get_notifications, get_schedules, get_settings,
    health_check, post_schedule, put_container_settings, put_theme, test_motor, test_schedule,
};
use pillbox::device::DevicePusher;
use pillbox::engine::SyncEngine;
use pillbox::model::Notification;
use pillbox::notify::NotificationPresenter;
use pillbox::store::Store;

async fn create_test_server() -> (TestServer, AppState) {
    let store = Store::new("sqlite::memory:").await.unwrap();
    // Nothing listens on this port: device pushes are fire-and-forget and
    // the test endpoints must answer 502.
    let device = DevicePusher::new("http://127.0.0.1:1").unwrap();
    let engine = SyncEngine::new(store, device.clone(), "test-user");
    engine.subscribe().await.unwrap();

    let state = AppState {
        engine,
        presenter: NotificationPresenter::new(),
        device,
    };

    let app = Router::new()
        .route("/schedules", get(get_schedules).post(post_schedule))
        .route("/schedules/:id", delete(delete_schedule))
        .route("/settings", get(get_settings))
        .route("/settings/:container", put(put_container_settings))
        .route("/theme", put(put_theme))
        .route("/notifications", get(get_notifications))
        .route("/notifications/ack", post(ack_notifications))
        .route("/containers/:container/test-motor", post(test_motor))
        .route("/device/test-schedule", post(test_schedule))
        .route("/health", get(health_check))
        .with_state(state.clone());

    (TestServer::new(app).unwrap(), state)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (server, _) = create_test_server().await;

    let response = server.get("/health").await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_schedule_crud_round_trip() {
    let (server, _) = create_test_server().await;

    let response = server
        .post("/schedules")
        .json(&json!({
            "container": 2,
            "days": ["Monday", "Friday"],
            "pillCount": 2,
            "times": ["08:00", "20:00"],
            "medName": "Aspirin"
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);

    let created: serde_json::Value = response.json();
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["container"], 2);
    // Wire names and 12-hour normalization.
    assert_eq!(created["pillCount"], 2);
    assert_eq!(created["medName"], "Aspirin");
    assert_eq!(created["times"], json!(["8:00 AM", "8:00 PM"]));

    let response = server.get("/schedules").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["id"], id);

    let response = server.delete(&format!("/schedules/{id}")).await;
    response.assert_status(axum::http::StatusCode::NO_CONTENT);

    let body: serde_json::Value = server.get("/schedules").await.json();
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_schedule_update_keeps_position() {
    let (server, _) = create_test_server().await;

    let first: serde_json::Value = server
        .post("/schedules")
        .json(&json!({ "container": 1, "days": ["Monday"], "pillCount": 1, "times": ["08:00"] }))
        .await
        .json();
    server
        .post("/schedules")
        .json(&json!({ "container": 2, "days": ["Tuesday"], "pillCount": 1, "times": ["09:00"] }))
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    let response = server
        .post("/schedules")
        .json(&json!({
            "id": first["id"],
            "container": 1,
            "days": ["Sunday"],
            "pillCount": 1,
            "times": ["10:00"]
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CREATED);

    let body: serde_json::Value = server.get("/schedules").await.json();
    let schedules = body.as_array().unwrap();
    assert_eq!(schedules.len(), 2);
    assert_eq!(schedules[0]["id"], first["id"]);
    assert_eq!(schedules[0]["days"], json!(["Sunday"]));
}

#[tokio::test]
async fn test_schedule_validation_failure() {
    let (server, state) = create_test_server().await;

    let response = server
        .post("/schedules")
        .json(&json!({ "container": 1, "days": [], "pillCount": 1, "times": ["08:00"] }))
        .await;

    response.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);

    // An id that matches no record is rejected, not appended.
    let response = server
        .post("/schedules")
        .json(&json!({ "id": 1, "container": 1, "days": ["Monday"], "pillCount": 1, "times": ["08:00"] }))
        .await;
    response.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);

    assert!(state.engine.schedules().await.is_empty());
}

#[tokio::test]
async fn test_delete_unknown_id_is_ok() {
    let (server, _) = create_test_server().await;

    let response = server.delete("/schedules/9999").await;

    response.assert_status(axum::http::StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_settings_round_trip_in_flat_shape() {
    let (server, _) = create_test_server().await;

    server
        .put("/settings/3")
        .json(&json!({ "motorSpeed": 200, "triggerThreshold": 1200 }))
        .await
        .assert_status(axum::http::StatusCode::NO_CONTENT);
    server
        .put("/theme")
        .json(&json!({ "theme": "dark" }))
        .await
        .assert_status(axum::http::StatusCode::NO_CONTENT);

    let body: serde_json::Value = server.get("/settings").await.json();
    assert_eq!(body["3"]["motorSpeed"], 200);
    assert_eq!(body["3"]["triggerThreshold"], 1200);
    assert_eq!(body["theme"], "dark");
}

#[tokio::test]
async fn test_settings_rejects_unknown_container() {
    let (server, _) = create_test_server().await;

    let response = server
        .put("/settings/7")
        .json(&json!({ "motorSpeed": 100, "triggerThreshold": 1000 }))
        .await;

    response.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_notifications_queue_and_ack() {
    let (server, state) = create_test_server().await;

    let body: serde_json::Value = server.get("/notifications").await.json();
    assert!(body["notifications"].as_array().unwrap().is_empty());
    assert_eq!(body["alarmActive"], false);

    state
        .presenter
        .notify(Notification {
            med_name: "Aspirin".to_string(),
            time: "8:00 AM".to_string(),
            pill_id: "1-0".to_string(),
        })
        .await;

    let body: serde_json::Value = server.get("/notifications").await.json();
    assert_eq!(body["notifications"].as_array().unwrap().len(), 1);
    assert_eq!(body["notifications"][0]["medName"], "Aspirin");
    assert_eq!(body["notifications"][0]["pillId"], "1-0");
    assert_eq!(body["alarmActive"], true);

    server
        .post("/notifications/ack")
        .await
        .assert_status(axum::http::StatusCode::NO_CONTENT);

    let body: serde_json::Value = server.get("/notifications").await.json();
    assert!(body["notifications"].as_array().unwrap().is_empty());
    assert_eq!(body["alarmActive"], false);
}

#[tokio::test]
async fn test_device_test_endpoints_answer_bad_gateway() {
    let (server, _) = create_test_server().await;

    let response = server
        .post("/containers/1/test-motor")
        .json(&json!({ "motorSpeed": 128, "triggerThreshold": 1500 }))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_GATEWAY);

    let response = server.post("/device/test-schedule").await;
    response.assert_status(axum::http::StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_save_reflected_in_store_despite_dead_device() {
    let (server, state) = create_test_server().await;

    let created: serde_json::Value = server
        .post("/schedules")
        .json(&json!({ "container": 4, "days": ["Wednesday"], "pillCount": 1, "times": ["12:00"] }))
        .await
        .json();

    // Local cache and remote persistence both hold the record even though
    // the device endpoint is unreachable.
    let schedules = state.engine.schedules().await;
    assert_eq!(schedules.len(), 1);
    assert_eq!(schedules[0].times, vec!["12:00 PM"]);
    assert_eq!(schedules[0].id, created["id"].as_i64().unwrap());
}
