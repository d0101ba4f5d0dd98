//! Pillbox - schedule synchronization and notification engine for a
//! multi-container medicine dispenser.
//!
//! # Overview
//!
//! Pillbox is the server-side core of a medicine dispenser control panel.
//! It maintains an in-memory model of dosage schedules and per-container
//! settings synchronized bidirectionally with a remote key-path store,
//! relays committed schedules to the dispensing device over a best-effort
//! network push, and continuously evaluates the clock against every
//! schedule to raise exactly-once-per-occurrence dose alerts.
//!
//! # Replication Contract
//!
//! All persistence is whole-value overwrite of a key path, and the local
//! model is a cache that is wholesale-replaced on every remote snapshot:
//! last-writer-wins, no merging. Concurrent writers lose updates by design;
//! the system is built for one human editing at a time.
//!
//! # Modules
//!
//! - [`model`]: Schedules, settings, notifications, and their wire shapes
//! - [`timefmt`]: 24-hour to 12-hour display-time conversion
//! - [`store`]: Key-path remote store client with subscribe-on-change
//! - [`engine`]: The synchronization engine owning all mutations
//! - [`device`]: Best-effort HTTP push to the dispensing device
//! - [`checker`]: Recurring dose-time evaluation with per-occurrence dedup
//! - [`notify`]: Pending-alert queue with all-or-nothing acknowledgment
//! - [`api`]: HTTP API handlers

pub mod api;
pub mod checker;
pub mod device;
pub mod engine;
pub mod model;
pub mod notify;
pub mod store;
pub mod timefmt;
