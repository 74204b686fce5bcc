//! SQLite-backed task store

use crate::connection::{connect, DatabaseConfig, DbPool};
use crate::migrations::{run_migrations, verify_integrity};
use crate::queries::{
    clear_tasks, count_tasks, delete_path_tasks, delete_task, insert_task, load_tasks, TaskFilter,
};
use async_trait::async_trait;
use bookplayer_core::{AppError, RelativePath, Result, SyncTask, TaskId, TaskStore};
use sqlx::pool::PoolConnection;
use sqlx::Sqlite;

/// Durable [`TaskStore`]; every mutation commits in one transaction
#[derive(Clone)]
pub struct SqliteTaskStore {
    pool: DbPool,
}

impl SqliteTaskStore {
    /// Opens (creating if needed) the queue database and brings its schema up to date
    pub async fn open(config: DatabaseConfig) -> Result<Self> {
        let pool = connect(config).await?;
        verify_integrity(&pool).await?;
        Self::from_pool(pool).await
    }

    /// Wraps an existing pool, running pending migrations
    pub async fn from_pool(pool: DbPool) -> Result<Self> {
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    /// Closes the underlying pool
    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn conn(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .map_err(|e| AppError::database("Failed to acquire connection", e))
    }
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn enqueue(&self, task: SyncTask) -> Result<TaskId> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database("Failed to begin enqueue", e))?;
        insert_task(&mut tx, &task, None).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::database("Failed to commit enqueue", e))?;

        log::debug!("Persisted {} task {} for {}", task.job_type(), task.id, task.relative_path);
        Ok(task.id)
    }

    async fn tasks_for_path(&self, path: &RelativePath) -> Result<Vec<SyncTask>> {
        let mut conn = self.conn().await?;
        load_tasks(&mut conn, TaskFilter::Path(path)).await
    }

    async fn remove(&self, id: &TaskId) -> Result<()> {
        let mut conn = self.conn().await?;
        delete_task(&mut conn, id).await
    }

    async fn next_batch(&self, limit: usize) -> Result<Vec<SyncTask>> {
        let mut conn = self.conn().await?;
        load_tasks(&mut conn, TaskFilter::First(limit)).await
    }

    async fn replace_tasks(&self, path: &RelativePath, replacement: SyncTask) -> Result<TaskId> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database("Failed to begin replace", e))?;
        let position = delete_path_tasks(&mut tx, path).await?;
        insert_task(&mut tx, &replacement, position).await?;
        tx.commit()
            .await
            .map_err(|e| AppError::database("Failed to commit replace", e))?;

        Ok(replacement.id)
    }

    async fn count(&self) -> Result<usize> {
        let mut conn = self.conn().await?;
        count_tasks(&mut conn).await
    }

    async fn all_tasks(&self) -> Result<Vec<SyncTask>> {
        let mut conn = self.conn().await?;
        load_tasks(&mut conn, TaskFilter::All).await
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        clear_tasks(&mut conn).await
    }
}
