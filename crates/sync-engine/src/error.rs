// crates/sync-engine/src/error.rs
//! Error types for sync operations

use crate::types::ErrorKind;
use bookplayer_core::{AppError, RelativePath};
use bookplayer_network::{FailureKind, NetworkError};
use thiserror::Error;

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during synchronization
#[derive(Debug, Error)]
pub enum SyncError {
    /// Task store or library store failure
    #[error("Storage error: {0}")]
    Storage(#[from] AppError),

    /// Remote call failed
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Local file access failed
    #[error("Local IO error: {0}")]
    LocalIo(#[from] std::io::Error),

    /// A task failed validation before it reached the queue
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// Another drain holds the executor
    #[error("Sync already in progress")]
    AlreadyRunning,

    /// A transfer for the item is already running
    #[error("Download already in progress for {0}")]
    DownloadInProgress(RelativePath),

    /// The library store has no such item
    #[error("Item not found: {0}")]
    ItemNotFound(RelativePath),

    /// Cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl SyncError {
    /// Classifies a failed task attempt
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Network(e) => match e.failure_kind() {
                FailureKind::Retryable | FailureKind::Cancelled => ErrorKind::Retryable,
                FailureKind::Terminal if e.is_not_found() => ErrorKind::Conflict,
                FailureKind::Terminal => ErrorKind::Terminal,
                FailureKind::LocalIo => ErrorKind::LocalIo,
            },
            SyncError::LocalIo(_) => ErrorKind::LocalIo,
            SyncError::InvalidTask(_) | SyncError::ItemNotFound(_) => ErrorKind::Terminal,
            SyncError::Storage(e) if !e.is_retryable() => ErrorKind::Terminal,
            SyncError::Storage(_)
            | SyncError::AlreadyRunning
            | SyncError::DownloadInProgress(_)
            | SyncError::Cancelled
            | SyncError::LockPoisoned(_) => ErrorKind::Retryable,
        }
    }

    /// True if the remote reported the item as gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::Network(e) if e.is_not_found())
    }

    pub(crate) fn lock_poisoned(resource: &str) -> Self {
        SyncError::LockPoisoned(resource.to_string())
    }
}
