//! Task store interface and the in-memory implementation

use crate::error::{AppError, Result};
use crate::types::{RelativePath, SyncTask, TaskId};
use async_trait::async_trait;
use std::sync::Mutex;

/// Ordered, durable collection of pending sync tasks
///
/// Insertion order is replay order. Implementations must make every
/// mutating call a single atomic write so a crash never reorders or
/// half-applies unaffected tasks.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Appends a task at the tail and returns its id once durable
    async fn enqueue(&self, task: SyncTask) -> Result<TaskId>;

    /// All pending tasks for `path`, in enqueue order
    async fn tasks_for_path(&self, path: &RelativePath) -> Result<Vec<SyncTask>>;

    /// Removes a task; unknown ids are ignored
    async fn remove(&self, id: &TaskId) -> Result<()>;

    /// Up to `limit` tasks in global enqueue order
    async fn next_batch(&self, limit: usize) -> Result<Vec<SyncTask>>;

    /// Atomically drops every task for `path` and inserts `replacement` at
    /// the position of the earliest dropped task (or the tail if none)
    async fn replace_tasks(&self, path: &RelativePath, replacement: SyncTask) -> Result<TaskId>;

    /// Number of pending tasks
    async fn count(&self) -> Result<usize>;

    /// Every pending task in order
    async fn all_tasks(&self) -> Result<Vec<SyncTask>>;

    /// Drops every pending task
    async fn clear(&self) -> Result<()>;
}

/// Volatile store used by tests and by callers that opt out of persistence
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<Vec<SyncTask>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<SyncTask>>> {
        self.tasks
            .lock()
            .map_err(|_| AppError::lock_poisoned("memory task store"))
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn enqueue(&self, task: SyncTask) -> Result<TaskId> {
        let id = task.id.clone();
        self.lock()?.push(task);
        Ok(id)
    }

    async fn tasks_for_path(&self, path: &RelativePath) -> Result<Vec<SyncTask>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|task| &task.relative_path == path)
            .cloned()
            .collect())
    }

    async fn remove(&self, id: &TaskId) -> Result<()> {
        self.lock()?.retain(|task| &task.id != id);
        Ok(())
    }

    async fn next_batch(&self, limit: usize) -> Result<Vec<SyncTask>> {
        Ok(self.lock()?.iter().take(limit).cloned().collect())
    }

    async fn replace_tasks(&self, path: &RelativePath, replacement: SyncTask) -> Result<TaskId> {
        let id = replacement.id.clone();
        let mut tasks = self.lock()?;
        let position = tasks
            .iter()
            .position(|task| &task.relative_path == path)
            .unwrap_or(tasks.len());
        tasks.retain(|task| &task.relative_path != path);
        let position = position.min(tasks.len());
        tasks.insert(position, replacement);
        Ok(id)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    async fn all_tasks(&self) -> Result<Vec<SyncTask>> {
        Ok(self.lock()?.clone())
    }

    async fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}
