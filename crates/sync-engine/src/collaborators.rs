//! Narrow interfaces to the on-device library and the player
//!
//! The engine reads both and writes to the library only after the remote
//! confirmed a change.

use async_trait::async_trait;
use bookplayer_core::{ItemMetadata, RelativePath, Result};

/// Remote-confirmed change applied back to a local item
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteUpdate {
    /// Server-assigned artwork thumbnail
    Thumbnail { url: String },
    BookmarkSynced { time: f64, note: Option<String> },
    BookmarkRemoved { time: f64 },
}

/// Hierarchical library persistence, keyed by relative path
#[async_trait]
pub trait LibraryStore: Send + Sync {
    async fn get_item(&self, path: &RelativePath) -> Result<Option<ItemMetadata>>;

    async fn apply_remote_update(&self, path: &RelativePath, update: RemoteUpdate) -> Result<()>;

    /// Records whether the item's bytes are present locally
    async fn mark_downloaded(&self, path: &RelativePath, downloaded: bool) -> Result<()>;

    /// Item the local player most recently had loaded
    async fn last_played_path(&self) -> Result<Option<RelativePath>>;

    /// Direct children of a container
    async fn child_paths(&self, path: &RelativePath) -> Result<Vec<RelativePath>>;
}

/// Read-only view of the audio player
pub trait Player: Send + Sync {
    fn is_playing(&self) -> bool;

    fn current_item_path(&self) -> Option<RelativePath>;
}
