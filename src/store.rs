//! Key-path remote store client.
//!
//! The store holds whole JSON values addressed by slash-separated paths
//! (e.g. `users/{uid}/schedules`) and supports subscribe-on-change: a watcher
//! receives the current value immediately and a fresh full-value snapshot
//! after every write to that path. There is no partial update primitive;
//! [`Store::put`] replaces the entire value, so replication is strictly
//! last-writer-wins. A slow watcher only ever observes the latest snapshot.
//!
//! Values are persisted in SQLite via sqlx; tests run against
//! `sqlite::memory:`.

use serde_json::Value;
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

/// Remote store handle. Cheap to clone; clones share the pool and the
/// watcher registry.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    watchers: Arc<Mutex<HashMap<String, watch::Sender<Option<Value>>>>>,
}

impl Store {
    /// Open (or create) the store and initialize its schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g. "sqlite:pillbox.db?mode=rwc"
    ///   or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let store = Self {
            pool,
            watchers: Arc::new(Mutex::new(HashMap::new())),
        };
        store.initialize_schema().await?;

        Ok(store)
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                path TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Read the value at `path`, or `None` if the path has never been written.
    pub async fn get(&self, path: &str) -> anyhow::Result<Option<Value>> {
        let row = sqlx::query(
            r#"
            SELECT value FROM kv WHERE path = ?
            "#,
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let raw: String = row.get("value");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    /// Atomically replace the entire value at `path` and notify watchers.
    ///
    /// Writes are serialized through the watcher registry lock so snapshot
    /// delivery order always matches commit order for a given path.
    pub async fn put(&self, path: &str, value: &Value) -> anyhow::Result<()> {
        let watchers = self.watchers.lock().await;

        sqlx::query(
            r#"
            INSERT INTO kv (path, value)
            VALUES (?, ?)
            ON CONFLICT(path) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(path)
        .bind(value.to_string())
        .execute(&self.pool)
        .await?;

        if let Some(sender) = watchers.get(path) {
            sender.send_replace(Some(value.clone()));
        }

        Ok(())
    }

    /// Subscribe to full-value snapshots of `path`.
    ///
    /// The receiver is seeded with the current value; each subsequent
    /// [`Store::put`] to the path delivers a new snapshot. Dropping the
    /// receiver unsubscribes and halts further delivery.
    pub async fn watch(&self, path: &str) -> anyhow::Result<watch::Receiver<Option<Value>>> {
        let mut watchers = self.watchers.lock().await;

        if let Some(sender) = watchers.get(path) {
            return Ok(sender.subscribe());
        }

        let current = self.get(path).await?;
        let (sender, receiver) = watch::channel(current);
        watchers.insert(path.to_string(), sender);
        Ok(receiver)
    }

    /// Close the connection pool. Every subsequent read or write fails.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
