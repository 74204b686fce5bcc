// crates/sync-engine/src/tracker.rs
//! Queue status tracking for observers

use crate::error::{SyncError, SyncResult};
use crate::types::{ErrorRecord, SyncState};
use bookplayer_core::Timestamp;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Publishes [`SyncState`] and keeps a bounded history of task failures
#[derive(Clone)]
pub struct StatusTracker {
    state: Arc<watch::Sender<SyncState>>,
    errors: Arc<Mutex<VecDeque<ErrorRecord>>>,
    capacity: usize,
}

impl StatusTracker {
    /// Creates a tracker keeping at most `capacity` error records
    pub fn new(capacity: usize) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            state: Arc::new(state),
            errors: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Stream of state changes
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Current state snapshot
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Records a failure, evicting the oldest record when full
    pub fn record_error(&self, record: ErrorRecord) -> SyncResult<()> {
        {
            let mut errors = self
                .errors
                .lock()
                .map_err(|_| SyncError::lock_poisoned("error history"))?;
            if errors.len() == self.capacity {
                errors.pop_front();
            }
            errors.push_back(record.clone());
        }

        self.state.send_modify(|state| state.last_error = Some(record));
        Ok(())
    }

    /// Failures oldest first
    pub fn recent_errors(&self) -> SyncResult<Vec<ErrorRecord>> {
        let errors = self
            .errors
            .lock()
            .map_err(|_| SyncError::lock_poisoned("error history"))?;
        Ok(errors.iter().cloned().collect())
    }

    pub fn set_pending(&self, pending_tasks: usize) {
        self.state.send_if_modified(|state| {
            let changed = state.pending_tasks != pending_tasks;
            state.pending_tasks = pending_tasks;
            changed
        });
    }

    /// Marks a drain as started; false if one is already running
    pub(crate) fn try_begin_drain(&self) -> bool {
        self.state.send_if_modified(|state| {
            if state.in_progress {
                false
            } else {
                state.in_progress = true;
                true
            }
        })
    }

    pub(crate) fn finish_drain(&self, completed: Option<Timestamp>) {
        self.state.send_modify(|state| {
            state.in_progress = false;
            if completed.is_some() {
                state.last_sync = completed;
            }
        });
    }
}

/// Ends the drain when dropped, even if the drain future is abandoned
pub(crate) struct DrainGuard<'a> {
    tracker: &'a StatusTracker,
    completed: Option<Timestamp>,
}

impl<'a> DrainGuard<'a> {
    pub(crate) fn acquire(tracker: &'a StatusTracker) -> SyncResult<Self> {
        if tracker.try_begin_drain() {
            Ok(Self {
                tracker,
                completed: None,
            })
        } else {
            Err(SyncError::AlreadyRunning)
        }
    }

    pub(crate) fn completed(&mut self) {
        self.completed = Some(Timestamp::now());
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.tracker.finish_drain(self.completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;
    use bookplayer_core::{JobType, RelativePath, TaskId};

    fn record(message: &str) -> ErrorRecord {
        ErrorRecord {
            task_id: TaskId::new(),
            relative_path: RelativePath::new("a").unwrap(),
            job_type: JobType::Update,
            kind: ErrorKind::Retryable,
            message: message.to_string(),
            timestamp: Timestamp::now(),
        }
    }

    #[test]
    fn test_history_is_bounded() {
        let tracker = StatusTracker::new(2);
        tracker.record_error(record("one")).unwrap();
        tracker.record_error(record("two")).unwrap();
        tracker.record_error(record("three")).unwrap();

        let messages: Vec<_> = tracker
            .recent_errors()
            .unwrap()
            .into_iter()
            .map(|r| r.message)
            .collect();
        assert_eq!(messages, vec!["two", "three"]);
        assert_eq!(tracker.state().last_error.unwrap().message, "three");
    }

    #[test]
    fn test_second_drain_is_rejected() {
        let tracker = StatusTracker::new(10);
        let mut guard = DrainGuard::acquire(&tracker).unwrap();
        assert!(tracker.state().in_progress);
        assert!(matches!(
            DrainGuard::acquire(&tracker),
            Err(SyncError::AlreadyRunning)
        ));

        guard.completed();
        drop(guard);
        let state = tracker.state();
        assert!(!state.in_progress);
        assert!(state.last_sync.is_some());
    }

    #[tokio::test]
    async fn test_subscribers_see_pending_count() {
        let tracker = StatusTracker::new(10);
        let mut rx = tracker.subscribe();
        tracker.set_pending(3);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().pending_tasks, 3);
    }
}
