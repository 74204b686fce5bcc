//! Domain types for the BookPlayer sync engine
//!
//! - `path`: library-relative item keys
//! - `item`: item metadata snapshots and partial updates
//! - `task`: queued sync tasks and their payloads
//! - `common`: shared traits and utilities

mod common;
mod item;
mod path;
mod task;

pub use common::{same_time, Timestamp, Validator};
pub use item::{ItemMetadata, ItemType, MetadataUpdate};
pub use path::RelativePath;
pub use task::{
    ArtworkParams, BookmarkParams, BookmarkRef, JobType, MoveParams, RenameParams, SyncTask,
    TaskId, TaskPayload,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_types_are_exported() {
        let path = RelativePath::new("folder/book.mp3").unwrap();
        let metadata = ItemMetadata::new(path.clone(), "Book", ItemType::Book);
        let task = SyncTask::new(path, TaskPayload::Upload(metadata));
        assert_eq!(task.job_type(), JobType::Upload);
    }
}
