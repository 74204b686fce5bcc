//! Sync task queue operations
//!
//! Each task is one row in `sync_task_refs` plus, for job types that carry
//! parameters, one row in that job type's payload table.

use bookplayer_core::{
    AppError, ArtworkParams, BookmarkParams, BookmarkRef, ItemMetadata, ItemType, JobType,
    MetadataUpdate, MoveParams, RelativePath, RenameParams, SyncTask, TaskId, TaskPayload,
    Timestamp,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::path::PathBuf;

/// Which queued tasks to load
#[derive(Debug, Clone, Copy)]
pub enum TaskFilter<'a> {
    All,
    Path(&'a RelativePath),
    First(usize),
}

/// Inserts a task, optionally at an explicit queue position
pub async fn insert_task(
    conn: &mut SqliteConnection,
    task: &SyncTask,
    position: Option<i64>,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO sync_task_refs (position, task_id, relative_path, job_type, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(position)
    .bind(task.id.as_str())
    .bind(task.relative_path.as_str())
    .bind(task.job_type().as_str())
    .bind(task.created_at.as_millis())
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::database("Failed to insert task reference", e))?;

    insert_payload(conn, &task.id, &task.payload).await
}

async fn insert_payload(
    conn: &mut SqliteConnection,
    id: &TaskId,
    payload: &TaskPayload,
) -> Result<(), AppError> {
    let query = match payload {
        TaskPayload::Delete | TaskPayload::ShallowDelete => return Ok(()),
        TaskPayload::Upload(item) => sqlx::query(
            r#"
            INSERT INTO upload_task_payloads
                (task_id, title, details, speed, current_time_secs, duration_secs,
                 percent_completed, is_finished, order_rank, last_play_date, item_type)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.as_str())
        .bind(&item.title)
        .bind(&item.details)
        .bind(item.speed.map(f64::from))
        .bind(item.current_time)
        .bind(item.duration)
        .bind(item.percent_completed)
        .bind(item.is_finished)
        .bind(item.order_rank)
        .bind(item.last_play_date.map(|t| t.as_millis()))
        .bind(item.item_type.as_str()),
        TaskPayload::Update(update) => sqlx::query(
            r#"
            INSERT INTO update_task_payloads
                (task_id, title, details, speed, current_time_secs, duration_secs,
                 percent_completed, is_finished, order_rank, last_play_date)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.as_str())
        .bind(update.title.as_deref())
        .bind(update.details.as_deref())
        .bind(update.speed.map(f64::from))
        .bind(update.current_time)
        .bind(update.duration)
        .bind(update.percent_completed)
        .bind(update.is_finished)
        .bind(update.order_rank)
        .bind(update.last_play_date.map(|t| t.as_millis())),
        TaskPayload::Move(params) => sqlx::query(
            "INSERT INTO move_task_payloads (task_id, origin, destination) VALUES (?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(params.origin.as_str())
        .bind(params.destination.as_str()),
        TaskPayload::RenameFolder(params) => {
            sqlx::query("INSERT INTO rename_folder_task_payloads (task_id, name) VALUES (?, ?)")
                .bind(id.as_str())
                .bind(&params.name)
        }
        TaskPayload::SetBookmark(params) => sqlx::query(
            "INSERT INTO set_bookmark_task_payloads (task_id, time_secs, note) VALUES (?, ?, ?)",
        )
        .bind(id.as_str())
        .bind(params.time)
        .bind(params.note.as_deref()),
        TaskPayload::DeleteBookmark(params) => sqlx::query(
            "INSERT INTO delete_bookmark_task_payloads (task_id, time_secs) VALUES (?, ?)",
        )
        .bind(id.as_str())
        .bind(params.time),
        TaskPayload::UploadArtwork(params) => sqlx::query(
            "INSERT INTO upload_artwork_task_payloads (task_id, image_path) VALUES (?, ?)",
        )
        .bind(id.as_str())
        .bind(params.image_path.to_string_lossy().into_owned()),
    };

    query
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to insert task payload", e))?;

    Ok(())
}

/// Loads tasks in queue order
pub async fn load_tasks(
    conn: &mut SqliteConnection,
    filter: TaskFilter<'_>,
) -> Result<Vec<SyncTask>, AppError> {
    const COLUMNS: &str = "SELECT task_id, relative_path, job_type, created_at FROM sync_task_refs";

    let rows = match filter {
        TaskFilter::All => {
            sqlx::query(&format!("{} ORDER BY position", COLUMNS))
                .fetch_all(&mut *conn)
                .await
        }
        TaskFilter::Path(path) => {
            sqlx::query(&format!("{} WHERE relative_path = ? ORDER BY position", COLUMNS))
                .bind(path.as_str())
                .fetch_all(&mut *conn)
                .await
        }
        TaskFilter::First(limit) => {
            sqlx::query(&format!("{} ORDER BY position LIMIT ?", COLUMNS))
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .fetch_all(&mut *conn)
                .await
        }
    }
    .map_err(|e| AppError::database("Failed to load tasks", e))?;

    let mut tasks = Vec::with_capacity(rows.len());
    for row in rows {
        tasks.push(row_to_task(conn, row).await?);
    }
    Ok(tasks)
}

/// Deletes one task; payload rows cascade
pub async fn delete_task(conn: &mut SqliteConnection, id: &TaskId) -> Result<(), AppError> {
    sqlx::query("DELETE FROM sync_task_refs WHERE task_id = ?")
        .bind(id.as_str())
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to delete task", e))?;

    Ok(())
}

/// Deletes every task for `path`, returning the earliest freed position
pub async fn delete_path_tasks(
    conn: &mut SqliteConnection,
    path: &RelativePath,
) -> Result<Option<i64>, AppError> {
    let earliest: Option<i64> =
        sqlx::query_scalar("SELECT MIN(position) FROM sync_task_refs WHERE relative_path = ?")
            .bind(path.as_str())
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| AppError::database("Failed to find tasks for path", e))?;

    sqlx::query("DELETE FROM sync_task_refs WHERE relative_path = ?")
        .bind(path.as_str())
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to delete tasks for path", e))?;

    Ok(earliest)
}

/// Number of queued tasks
pub async fn count_tasks(conn: &mut SqliteConnection) -> Result<usize, AppError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_task_refs")
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to count tasks", e))?;

    Ok(usize::try_from(count).unwrap_or_default())
}

/// Drops every queued task
pub async fn clear_tasks(conn: &mut SqliteConnection) -> Result<(), AppError> {
    sqlx::query("DELETE FROM sync_task_refs")
        .execute(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to clear tasks", e))?;

    Ok(())
}

async fn row_to_task(conn: &mut SqliteConnection, row: SqliteRow) -> Result<SyncTask, AppError> {
    let id: String = row
        .try_get("task_id")
        .map_err(|e| AppError::database("Missing task ID", e))?;
    let path: String = row
        .try_get("relative_path")
        .map_err(|e| AppError::database("Missing task path", e))?;
    let job_name: String = row
        .try_get("job_type")
        .map_err(|e| AppError::database("Missing job type", e))?;
    let created_at: i64 = row
        .try_get("created_at")
        .map_err(|e| AppError::database("Missing creation time", e))?;

    let job_type = JobType::parse(&job_name).ok_or_else(|| AppError::InvalidTaskPayload {
        job_type: job_name.clone(),
        reason: "unknown job type".to_string(),
    })?;
    let id = TaskId::from_string(id);
    let relative_path = RelativePath::new(path)?;
    let payload = load_payload(conn, &id, job_type, &relative_path).await?;

    Ok(SyncTask::restore(
        id,
        relative_path,
        payload,
        Timestamp::from_millis(created_at),
    ))
}

async fn load_payload(
    conn: &mut SqliteConnection,
    id: &TaskId,
    job_type: JobType,
    path: &RelativePath,
) -> Result<TaskPayload, AppError> {
    let table = match job_type {
        JobType::Delete => return Ok(TaskPayload::Delete),
        JobType::ShallowDelete => return Ok(TaskPayload::ShallowDelete),
        JobType::Upload => "upload_task_payloads",
        JobType::Update => "update_task_payloads",
        JobType::Move => "move_task_payloads",
        JobType::RenameFolder => "rename_folder_task_payloads",
        JobType::SetBookmark => "set_bookmark_task_payloads",
        JobType::DeleteBookmark => "delete_bookmark_task_payloads",
        JobType::UploadArtwork => "upload_artwork_task_payloads",
    };

    let row = sqlx::query(&format!("SELECT * FROM {} WHERE task_id = ?", table))
        .bind(id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::database("Failed to load task payload", e))?
        .ok_or_else(|| AppError::InvalidTaskPayload {
            job_type: job_type.to_string(),
            reason: format!("no payload row for task {}", id),
        })?;

    let field = |e: sqlx::Error| AppError::InvalidTaskPayload {
        job_type: job_type.to_string(),
        reason: e.to_string(),
    };

    let payload = match job_type {
        JobType::Upload => {
            let kind: String = row.try_get("item_type").map_err(field)?;
            let item_type = ItemType::parse(&kind).ok_or_else(|| AppError::InvalidTaskPayload {
                job_type: job_type.to_string(),
                reason: format!("unknown item type '{}'", kind),
            })?;
            TaskPayload::Upload(ItemMetadata {
                relative_path: path.clone(),
                title: row.try_get("title").map_err(field)?,
                details: row.try_get("details").map_err(field)?,
                speed: row
                    .try_get::<Option<f64>, _>("speed")
                    .map_err(field)?
                    .map(|s| s as f32),
                current_time: row.try_get("current_time_secs").map_err(field)?,
                duration: row.try_get("duration_secs").map_err(field)?,
                percent_completed: row.try_get("percent_completed").map_err(field)?,
                is_finished: row.try_get("is_finished").map_err(field)?,
                order_rank: row.try_get("order_rank").map_err(field)?,
                last_play_date: row
                    .try_get::<Option<i64>, _>("last_play_date")
                    .map_err(field)?
                    .map(Timestamp::from_millis),
                item_type,
            })
        }
        JobType::Update => TaskPayload::Update(MetadataUpdate {
            title: row.try_get("title").map_err(field)?,
            details: row.try_get("details").map_err(field)?,
            speed: row
                .try_get::<Option<f64>, _>("speed")
                .map_err(field)?
                .map(|s| s as f32),
            current_time: row.try_get("current_time_secs").map_err(field)?,
            duration: row.try_get("duration_secs").map_err(field)?,
            percent_completed: row.try_get("percent_completed").map_err(field)?,
            is_finished: row.try_get("is_finished").map_err(field)?,
            order_rank: row.try_get("order_rank").map_err(field)?,
            last_play_date: row
                .try_get::<Option<i64>, _>("last_play_date")
                .map_err(field)?
                .map(Timestamp::from_millis),
        }),
        JobType::Move => {
            let origin: String = row.try_get("origin").map_err(field)?;
            let destination: String = row.try_get("destination").map_err(field)?;
            TaskPayload::Move(MoveParams {
                origin: RelativePath::new(origin)?,
                destination: RelativePath::new(destination)?,
            })
        }
        JobType::RenameFolder => TaskPayload::RenameFolder(RenameParams {
            name: row.try_get("name").map_err(field)?,
        }),
        JobType::SetBookmark => TaskPayload::SetBookmark(BookmarkParams {
            time: row.try_get("time_secs").map_err(field)?,
            note: row.try_get("note").map_err(field)?,
        }),
        JobType::DeleteBookmark => TaskPayload::DeleteBookmark(BookmarkRef {
            time: row.try_get("time_secs").map_err(field)?,
        }),
        JobType::UploadArtwork => {
            let image_path: String = row.try_get("image_path").map_err(field)?;
            TaskPayload::UploadArtwork(ArtworkParams {
                image_path: PathBuf::from(image_path),
            })
        }
        JobType::Delete => TaskPayload::Delete,
        JobType::ShallowDelete => TaskPayload::ShallowDelete,
    };

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::create_test_db;
    use crate::migrations::run_migrations;

    fn path(s: &str) -> RelativePath {
        RelativePath::new(s).unwrap()
    }

    fn every_payload() -> Vec<SyncTask> {
        let mut item = ItemMetadata::new(path("a/book.m4b"), "Book", ItemType::Bound);
        item.speed = Some(1.5);
        item.last_play_date = Some(Timestamp::from_seconds(1_700_000_000));
        vec![
            SyncTask::new(path("a/book.m4b"), TaskPayload::Upload(item)),
            SyncTask::new(
                path("a/book.m4b"),
                TaskPayload::Update(MetadataUpdate {
                    percent_completed: Some(12.5),
                    is_finished: Some(false),
                    ..Default::default()
                }),
            ),
            SyncTask::new(
                path("a/book.m4b"),
                TaskPayload::Move(MoveParams {
                    origin: path("a/book.m4b"),
                    destination: path("b/book.m4b"),
                }),
            ),
            SyncTask::new(
                path("a"),
                TaskPayload::RenameFolder(RenameParams {
                    name: "c".to_string(),
                }),
            ),
            SyncTask::new(path("x"), TaskPayload::Delete),
            SyncTask::new(path("y"), TaskPayload::ShallowDelete),
            SyncTask::new(
                path("x"),
                TaskPayload::SetBookmark(BookmarkParams {
                    time: 12.0,
                    note: Some("hi".to_string()),
                }),
            ),
            SyncTask::new(path("x"), TaskPayload::DeleteBookmark(BookmarkRef { time: 3.25 })),
            SyncTask::new(
                path("x"),
                TaskPayload::UploadArtwork(ArtworkParams {
                    image_path: PathBuf::from("/tmp/cover.jpg"),
                }),
            ),
        ]
    }

    #[tokio::test]
    async fn test_every_job_type_is_stored_faithfully() {
        let pool = create_test_db().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let tasks = every_payload();
        for task in &tasks {
            insert_task(&mut conn, task, None).await.unwrap();
        }

        let loaded = load_tasks(&mut conn, TaskFilter::All).await.unwrap();
        assert_eq!(loaded, tasks);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_payload() {
        let pool = create_test_db().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        let task = SyncTask::new(
            path("x"),
            TaskPayload::SetBookmark(BookmarkParams {
                time: 1.0,
                note: None,
            }),
        );
        insert_task(&mut conn, &task, None).await.unwrap();
        delete_task(&mut conn, &task.id).await.unwrap();

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM set_bookmark_task_payloads")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_delete_path_reports_earliest_position() {
        let pool = create_test_db().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        insert_task(&mut conn, &SyncTask::new(path("a"), TaskPayload::Delete), None)
            .await
            .unwrap();
        insert_task(&mut conn, &SyncTask::new(path("b"), TaskPayload::Delete), None)
            .await
            .unwrap();
        insert_task(&mut conn, &SyncTask::new(path("b"), TaskPayload::Delete), None)
            .await
            .unwrap();

        assert_eq!(delete_path_tasks(&mut conn, &path("b")).await.unwrap(), Some(2));
        assert_eq!(delete_path_tasks(&mut conn, &path("zz")).await.unwrap(), None);
        assert_eq!(count_tasks(&mut conn).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_first_filter_limits_in_order() {
        let pool = create_test_db().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let mut conn = pool.acquire().await.unwrap();

        for name in ["a", "b", "c"] {
            insert_task(&mut conn, &SyncTask::new(path(name), TaskPayload::Delete), None)
                .await
                .unwrap();
        }

        let first = load_tasks(&mut conn, TaskFilter::First(2)).await.unwrap();
        let names: Vec<_> = first.iter().map(|t| t.relative_path.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        clear_tasks(&mut conn).await.unwrap();
        assert_eq!(count_tasks(&mut conn).await.unwrap(), 0);
    }
}
