//! BookPlayer Sync Queue Database
//!
//! Persists the pending sync task queue in SQLite via sqlx so it survives
//! process restarts. The queue is a reference table ordered by position plus
//! one payload table per job type.

pub mod connection;
pub mod migrations;
pub mod queries;
pub mod store;

pub use connection::{connect, DatabaseConfig, DbPool};
pub use migrations::{current_version, run_migrations, verify_integrity};
pub use store::SqliteTaskStore;
