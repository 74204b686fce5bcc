// crates/sync-engine/src/lib.rs
//! Offline-first synchronization engine for the BookPlayer library
//!
//! Local mutations are recorded as durable tasks, collapsed per item and
//! replayed against the remote service in enqueue order:
//! - Task queue with per-path collapsing
//! - Remote sync executor with retry-safe batching
//! - Last-played conflict resolution
//! - Tri-state download manager
//!
//! # Example
//!
//! ```no_run
//! use bookplayer_core::{MemoryTaskStore, MetadataUpdate, RelativePath};
//! use bookplayer_sync_engine::{LibraryStore, Player, SyncEngine};
//! use std::sync::Arc;
//!
//! # async fn demo(
//! #     library: Arc<dyn LibraryStore>,
//! #     player: Arc<dyn Player>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = bookplayer_config::Config::default();
//! let engine = SyncEngine::connect(&config, Arc::new(MemoryTaskStore::new()), library, player)?;
//!
//! let path = RelativePath::new("Novels/Dune.m4b")?;
//! let update = MetadataUpdate {
//!     current_time: Some(120.0),
//!     ..Default::default()
//! };
//! engine.schedule_update(path, update).await?;
//!
//! let report = engine.drain().await?;
//! println!("{} task(s) committed", report.committed);
//! # Ok(())
//! # }
//! ```

mod collaborators;
mod collapsing;
mod conflict;
mod download;
mod engine;
mod error;
mod events;
mod executor;
mod queue;
mod scheduler;
mod tracker;
mod types;

pub use collaborators::{LibraryStore, Player, RemoteUpdate};
pub use collapsing::{decide, CollapsingDecision};
pub use conflict::{ConflictResolver, Resolution};
pub use download::DownloadManager;
pub use engine::{EngineConfig, ListingSync, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, SyncEvent};
pub use executor::{ExecutorConfig, SyncExecutor};
pub use queue::{ScheduleOutcome, SyncQueue};
pub use scheduler::SyncScheduler;
pub use tracker::StatusTracker;
pub use types::{
    ConflictOutcome, DownloadCompleted, DownloadState, DrainReport, ErrorKind, ErrorRecord,
    SyncState,
};
