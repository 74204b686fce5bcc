//! Queued sync tasks

use crate::types::{ItemMetadata, MetadataUpdate, RelativePath, Timestamp, Validator};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Unique identifier for a queued task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a new random TaskId
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wraps an existing identifier (e.g. read back from storage)
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of remote mutations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum JobType {
    Upload,
    Update,
    Move,
    RenameFolder,
    Delete,
    ShallowDelete,
    SetBookmark,
    DeleteBookmark,
    UploadArtwork,
}

impl JobType {
    pub const ALL: [JobType; 9] = [
        JobType::Upload,
        JobType::Update,
        JobType::Move,
        JobType::RenameFolder,
        JobType::Delete,
        JobType::ShallowDelete,
        JobType::SetBookmark,
        JobType::DeleteBookmark,
        JobType::UploadArtwork,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Upload => "upload",
            JobType::Update => "update",
            JobType::Move => "move",
            JobType::RenameFolder => "renameFolder",
            JobType::Delete => "delete",
            JobType::ShallowDelete => "shallowDelete",
            JobType::SetBookmark => "setBookmark",
            JobType::DeleteBookmark => "deleteBookmark",
            JobType::UploadArtwork => "uploadArtwork",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|job| job.as_str() == value)
    }

    /// Delete and shallow delete
    pub fn is_delete(&self) -> bool {
        matches!(self, JobType::Delete | JobType::ShallowDelete)
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `move` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveParams {
    pub origin: RelativePath,
    pub destination: RelativePath,
}

/// `renameFolder` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameParams {
    /// New last path segment
    pub name: String,
}

/// `setBookmark` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkParams {
    /// Bookmark position in seconds
    pub time: f64,
    pub note: Option<String>,
}

/// `deleteBookmark` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkRef {
    pub time: f64,
}

/// `uploadArtwork` parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtworkParams {
    /// Local image file holding the artwork bytes
    pub image_path: PathBuf,
}

/// Job type plus its type-specific parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "jobType", content = "parameters", rename_all = "camelCase")]
pub enum TaskPayload {
    Upload(ItemMetadata),
    Update(MetadataUpdate),
    Move(MoveParams),
    RenameFolder(RenameParams),
    Delete,
    ShallowDelete,
    SetBookmark(BookmarkParams),
    DeleteBookmark(BookmarkRef),
    UploadArtwork(ArtworkParams),
}

impl TaskPayload {
    pub fn job_type(&self) -> JobType {
        match self {
            TaskPayload::Upload(_) => JobType::Upload,
            TaskPayload::Update(_) => JobType::Update,
            TaskPayload::Move(_) => JobType::Move,
            TaskPayload::RenameFolder(_) => JobType::RenameFolder,
            TaskPayload::Delete => JobType::Delete,
            TaskPayload::ShallowDelete => JobType::ShallowDelete,
            TaskPayload::SetBookmark(_) => JobType::SetBookmark,
            TaskPayload::DeleteBookmark(_) => JobType::DeleteBookmark,
            TaskPayload::UploadArtwork(_) => JobType::UploadArtwork,
        }
    }
}

/// One pending mutation; never modified once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTask {
    pub id: TaskId,
    pub relative_path: RelativePath,
    #[serde(flatten)]
    pub payload: TaskPayload,
    pub created_at: Timestamp,
}

impl SyncTask {
    /// Creates a task with a fresh id
    pub fn new(relative_path: RelativePath, payload: TaskPayload) -> Self {
        Self {
            id: TaskId::new(),
            relative_path,
            payload,
            created_at: Timestamp::now(),
        }
    }

    /// Rebuilds a stored task
    pub fn restore(
        id: TaskId,
        relative_path: RelativePath,
        payload: TaskPayload,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            relative_path,
            payload,
            created_at,
        }
    }

    pub fn job_type(&self) -> JobType {
        self.payload.job_type()
    }

    /// Target path of a move or rename
    pub fn destination(&self) -> Option<RelativePath> {
        match &self.payload {
            TaskPayload::Move(params) => Some(params.destination.clone()),
            TaskPayload::RenameFolder(params) => {
                self.relative_path.with_file_name(&params.name).ok()
            }
            _ => None,
        }
    }

    /// Every library path whose remote state this task changes
    pub fn touched_paths(&self) -> Vec<RelativePath> {
        let mut paths = vec![self.relative_path.clone()];
        if let Some(destination) = self.destination() {
            paths.push(destination);
        }
        paths
    }
}

impl Validator for SyncTask {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        match &self.payload {
            TaskPayload::Upload(metadata) if metadata.relative_path != self.relative_path => {
                errors.push("upload snapshot path does not match task path".to_string());
            }
            TaskPayload::Update(update) if update.is_empty() => {
                errors.push("update carries no fields".to_string());
            }
            TaskPayload::Move(params) => {
                if params.origin != self.relative_path {
                    errors.push("move origin does not match task path".to_string());
                }
                if params.origin == params.destination {
                    errors.push("move origin equals destination".to_string());
                }
            }
            TaskPayload::RenameFolder(params) => {
                if params.name.is_empty() || params.name.contains('/') {
                    errors.push("rename target must be a single path segment".to_string());
                }
            }
            TaskPayload::SetBookmark(params) if !(params.time >= 0.0) => {
                errors.push("bookmark time must be non-negative".to_string());
            }
            TaskPayload::DeleteBookmark(params) if !(params.time >= 0.0) => {
                errors.push("bookmark time must be non-negative".to_string());
            }
            _ => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
