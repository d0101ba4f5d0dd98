//! Pillbox - schedule synchronization and notification engine for a
//! multi-container medicine dispenser.
//!
//! # Overview
//!
//! Pillbox keeps dosage schedules and per-container dispensing settings for
//! one user synchronized with a remote store, relays every committed
//! schedule set to the network-attached dispensing device, and raises a
//! local alert exactly once per scheduled dose occurrence.
//!
//! # API Endpoints
//!
//! - `GET /schedules` / `POST /schedules` / `DELETE /schedules/:id`
//! - `GET /settings` / `PUT /settings/:container` / `PUT /theme`
//! - `GET /notifications` / `POST /notifications/ack`
//! - `POST /containers/:container/test-motor` / `POST /device/test-schedule`
//! - `GET /health`

use std::env;
use std::net::SocketAddr;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use pillbox::api::{
    AppState, ack_notifications, delete_schedule, get_notifications, get_schedules, get_settings,
    health_check, post_schedule, put_container_settings, put_theme, test_motor, test_schedule,
};
use pillbox::checker::CheckerTask;
use pillbox::device::DevicePusher;
use pillbox::engine::SyncEngine;
use pillbox::notify::NotificationPresenter;
use pillbox::store::Store;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 3000;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_PATH: &str = "sqlite:pillbox.db?mode=rwc";

/// Default dispensing device address on the local network.
const DEFAULT_DEVICE_URL: &str = "http://192.168.1.175";

/// Default user identity when no authentication provider is wired in.
const DEFAULT_USER: &str = "local";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with environment filter
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("pillbox=info".parse()?))
        .init();

    // Load configuration from environment
    let port: u16 = env::var("PILLBOX_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let db_url = env::var("PILLBOX_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());
    let device_url =
        env::var("PILLBOX_DEVICE_URL").unwrap_or_else(|_| DEFAULT_DEVICE_URL.to_string());
    let user = env::var("PILLBOX_USER").unwrap_or_else(|_| DEFAULT_USER.to_string());

    info!(port, db_url = %db_url, device_url = %device_url, user = %user, "Starting Pillbox");

    // Initialize the remote store and the engine bound to this session
    let store = Store::new(&db_url).await?;
    let device = DevicePusher::new(&device_url)?;
    let engine = SyncEngine::new(store, device.clone(), &user);
    engine.subscribe().await?;
    info!("Sync engine subscribed");

    // Start the dose-time checker loop
    let presenter = NotificationPresenter::new();
    let checker = CheckerTask::new();
    checker.start(engine.clone(), presenter.clone()).await;
    info!("Schedule checker running");

    // Create application state
    let state = AppState {
        engine,
        presenter,
        device,
    };

    // Build router
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
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "Pillbox is listening");

    axum::serve(listener, app).await?;

    checker.stop().await;
    Ok(())
}
