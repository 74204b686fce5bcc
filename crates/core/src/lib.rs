//! Shared domain types, errors and the task store interface for BookPlayer sync

pub mod error;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use error::{AppError, ErrorSeverity, RecoveryAction, Result};
pub use store::{MemoryTaskStore, TaskStore};
pub use types::{
    same_time, ArtworkParams, BookmarkParams, BookmarkRef, ItemMetadata, ItemType, JobType,
    MetadataUpdate, MoveParams, RelativePath, RenameParams, SyncTask, TaskId, TaskPayload,
    Timestamp, Validator,
};
