// crates/sync-engine/src/types.rs
//! Core sync types and data structures

use bookplayer_core::{JobType, RelativePath, TaskId, Timestamp};
use serde::{Deserialize, Serialize};

/// How a failed task attempt is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Transient; the task stays queued for the next drain
    Retryable,
    /// The task can never succeed and is removed
    Terminal,
    /// Local and remote already diverged (remote item gone); the task is removed
    Conflict,
    /// Local file problem; the task is removed
    LocalIo,
}

impl ErrorKind {
    /// True if a failure of this kind drops the task from the queue
    pub fn removes_task(&self) -> bool {
        !matches!(self, ErrorKind::Retryable)
    }
}

/// Observability record for one failed task attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub task_id: TaskId,
    pub relative_path: RelativePath,
    pub job_type: JobType,
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: Timestamp,
}

/// Snapshot of queue health exposed to the UI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Tasks still waiting for remote replay
    pub pending_tasks: usize,
    /// Most recent failure, if any
    pub last_error: Option<ErrorRecord>,
    /// Whether a drain is currently running
    pub in_progress: bool,
    /// End of the last completed drain
    pub last_sync: Option<Timestamp>,
}

impl SyncState {
    /// Returns true if there are tasks waiting
    pub fn has_pending_tasks(&self) -> bool {
        self.pending_tasks > 0
    }
}

/// Result of comparing local and remote last-played items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictOutcome {
    NoConflict,
    /// Same item, stale local progress
    ReloadLastBook(RelativePath),
    /// The remote reports another item as last played
    DifferentLastBook(RelativePath),
}

impl ConflictOutcome {
    pub fn is_conflict(&self) -> bool {
        !matches!(self, ConflictOutcome::NoConflict)
    }
}

/// Tri-state local byte presence of a remote-backed item
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadState {
    NotDownloaded,
    /// Transfer in flight, progress in `0.0..=1.0`
    Downloading { progress: f64 },
    Downloaded,
}

impl DownloadState {
    pub fn is_downloading(&self) -> bool {
        matches!(self, DownloadState::Downloading { .. })
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self, DownloadState::Downloaded)
    }

    /// Progress fraction; 0 when not downloaded, 1 when downloaded
    pub fn progress(&self) -> f64 {
        match self {
            DownloadState::NotDownloaded => 0.0,
            DownloadState::Downloading { progress } => *progress,
            DownloadState::Downloaded => 1.0,
        }
    }
}

/// Emitted once per transferred item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadCompleted {
    /// Item whose bytes are now local
    pub relative_path: RelativePath,
    /// Item the download was requested for (the item itself or its container)
    pub initiating_path: RelativePath,
    /// Container of `relative_path`
    pub parent_path: Option<RelativePath>,
}

/// Counts for one drain of the queue
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Tasks whose remote call was issued
    pub attempted: usize,
    pub committed: usize,
    /// Tasks left queued after a transient failure
    pub retryable: usize,
    /// Tasks dropped after a terminal failure
    pub dropped: usize,
    /// Whether the drain stopped early on cancellation
    pub cancelled: bool,
}

impl DrainReport {
    pub(crate) fn absorb(&mut self, other: DrainReport) {
        self.attempted += other.attempted;
        self.committed += other.committed;
        self.retryable += other.retryable;
        self.dropped += other.dropped;
        self.cancelled |= other.cancelled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_state_default() {
        let state = SyncState::default();
        assert!(!state.has_pending_tasks());
        assert!(!state.in_progress);
        assert!(state.last_sync.is_none());
    }

    #[test]
    fn test_only_retryable_keeps_task() {
        assert!(!ErrorKind::Retryable.removes_task());
        assert!(ErrorKind::Terminal.removes_task());
        assert!(ErrorKind::Conflict.removes_task());
        assert!(ErrorKind::LocalIo.removes_task());
    }

    #[test]
    fn test_download_state_progress() {
        assert_eq!(DownloadState::NotDownloaded.progress(), 0.0);
        assert_eq!(DownloadState::Downloading { progress: 0.4 }.progress(), 0.4);
        assert!(DownloadState::Downloaded.is_downloaded());
        assert!(DownloadState::Downloading { progress: 0.0 }.is_downloading());
    }

    #[test]
    fn test_report_absorb() {
        let mut total = DrainReport::default();
        total.absorb(DrainReport {
            attempted: 2,
            committed: 1,
            retryable: 1,
            ..Default::default()
        });
        total.absorb(DrainReport {
            attempted: 1,
            dropped: 1,
            cancelled: true,
            ..Default::default()
        });
        assert_eq!(total.attempted, 3);
        assert_eq!(total.committed, 1);
        assert_eq!(total.dropped, 1);
        assert!(total.cancelled);
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let outcome = ConflictOutcome::DifferentLastBook(RelativePath::new("b").unwrap());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json, serde_json::json!({"differentLastBook": "b"}));
    }
}
