//! Sync queue: collapsing on top of a durable task store

use crate::collapsing::{decide, CollapsingDecision};
use crate::error::{SyncError, SyncResult};
use bookplayer_core::{RelativePath, SyncTask, TaskId, TaskStore, Validator};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

const LOCK_PRUNE_THRESHOLD: usize = 64;

/// What scheduling a task did to the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Queued at the tail
    Appended(TaskId),
    /// Superseded the pending tasks of its path
    Replaced(TaskId),
    /// Cancelled out against pending tasks and was not queued
    Dropped { cancelled: Vec<TaskId> },
}

/// Orders all task mutations for a path through one lock
///
/// The executor takes the same lock while a task is in flight, so a
/// collapse never races the remote call of a task it would remove.
pub struct SyncQueue {
    store: Arc<dyn TaskStore>,
    locks: Mutex<HashMap<RelativePath, Arc<AsyncMutex<()>>>>,
}

impl SyncQueue {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Waits for exclusive access to `path`'s tasks
    pub async fn lock_path(&self, path: &RelativePath) -> SyncResult<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| SyncError::lock_poisoned("path locks"))?;

            if locks.len() > LOCK_PRUNE_THRESHOLD {
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }

            Arc::clone(locks.entry(path.clone()).or_default())
        };

        Ok(lock.lock_owned().await)
    }

    /// Validates `task` and records it, collapsing against pending tasks for its path
    pub async fn schedule(&self, task: SyncTask) -> SyncResult<ScheduleOutcome> {
        if let Err(errors) = task.validate() {
            return Err(SyncError::InvalidTask(format!(
                "{} {}: {}",
                task.job_type(),
                task.relative_path,
                errors.join("; ")
            )));
        }

        let _guard = self.lock_path(&task.relative_path).await?;
        let existing = self.store.tasks_for_path(&task.relative_path).await?;

        let outcome = match decide(&existing, &task) {
            CollapsingDecision::AppendNew => {
                ScheduleOutcome::Appended(self.store.enqueue(task).await?)
            }
            CollapsingDecision::ReplaceAll(replacement) => {
                log::debug!(
                    "Collapsing {} pending task(s) for {} into {}",
                    existing.len(),
                    task.relative_path,
                    replacement.job_type()
                );
                let path = replacement.relative_path.clone();
                ScheduleOutcome::Replaced(self.store.replace_tasks(&path, replacement).await?)
            }
            CollapsingDecision::DropIncoming { cancel } => {
                log::debug!(
                    "{} on {} cancels {} pending task(s)",
                    task.job_type(),
                    task.relative_path,
                    cancel.len()
                );
                for id in &cancel {
                    self.store.remove(id).await?;
                }
                ScheduleOutcome::Dropped { cancelled: cancel }
            }
        };

        Ok(outcome)
    }

    /// Removes a task once its remote effect committed or can never commit
    pub async fn complete(&self, id: &TaskId) -> SyncResult<()> {
        self.store.remove(id).await?;
        Ok(())
    }

    pub async fn pending_count(&self) -> SyncResult<usize> {
        Ok(self.store.count().await?)
    }

    pub async fn tasks_for_path(&self, path: &RelativePath) -> SyncResult<Vec<SyncTask>> {
        Ok(self.store.tasks_for_path(path).await?)
    }

    pub async fn all_tasks(&self) -> SyncResult<Vec<SyncTask>> {
        Ok(self.store.all_tasks().await?)
    }

    pub async fn next_batch(&self, limit: usize) -> SyncResult<Vec<SyncTask>> {
        Ok(self.store.next_batch(limit).await?)
    }

    /// Drops every pending task
    pub async fn clear(&self) -> SyncResult<()> {
        self.store.clear().await?;
        Ok(())
    }
}
