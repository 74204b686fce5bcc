//! Engine event bus
//!
//! Consumers (UI, companion-device bridge) subscribe without the engine
//! knowing about them. Events are dropped when nobody listens.

use crate::types::{ConflictOutcome, DownloadCompleted, ErrorRecord};
use bookplayer_core::{JobType, RelativePath, TaskId};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Everything observable the engine does
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    TaskEnqueued {
        task_id: TaskId,
        relative_path: RelativePath,
        job_type: JobType,
    },
    TaskCompleted {
        task_id: TaskId,
        relative_path: RelativePath,
        job_type: JobType,
    },
    TaskFailed(ErrorRecord),
    /// A task hit a 404; local and remote disagree about the item
    RemoteItemMissing { relative_path: RelativePath },
    ConflictDetected(ConflictOutcome),
    DownloadProgress {
        relative_path: RelativePath,
        progress: f64,
    },
    DownloadCompleted(DownloadCompleted),
    DownloadFailed {
        relative_path: RelativePath,
        message: String,
    },
    DownloadCancelled { relative_path: RelativePath },
    ItemOffloaded { relative_path: RelativePath },
}

/// Broadcast channel for [`SyncEvent`]s
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publishes `event` to current subscribers
    pub fn emit(&self, event: SyncEvent) {
        if self.sender.send(event).is_err() {
            log::trace!("Sync event dropped, no subscribers");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
