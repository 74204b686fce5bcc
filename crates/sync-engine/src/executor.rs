//! Remote sync executor
//!
//! Replays queued tasks against the remote API. Tasks that touch
//! overlapping paths share a lane and run in enqueue order; separate
//! lanes run concurrently.

use crate::collaborators::{LibraryStore, RemoteUpdate};
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::queue::SyncQueue;
use crate::tracker::{DrainGuard, StatusTracker};
use crate::types::{DrainReport, ErrorKind, ErrorRecord};
use bookplayer_core::{JobType, RelativePath, SyncTask, TaskPayload, Timestamp};
use bookplayer_network::{NetworkError, RemoteApi};
use bookplayer_resilience::with_timeout;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Drain tuning
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Tasks pulled from the store per batch
    pub batch_size: usize,
    /// Lanes replayed concurrently
    pub max_parallel_paths: usize,
    /// Bound on one remote call, after which it counts as retryable
    pub request_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            max_parallel_paths: 4,
            request_timeout: Duration::from_secs(30),
        }
    }
}

enum Attempt {
    Committed(Option<RemoteUpdate>),
    Failed(SyncError),
}

/// Drains the task queue against a [`RemoteApi`]
pub struct SyncExecutor {
    queue: Arc<SyncQueue>,
    api: Arc<dyn RemoteApi>,
    library: Arc<dyn LibraryStore>,
    events: EventBus,
    tracker: StatusTracker,
    config: ExecutorConfig,
}

impl SyncExecutor {
    pub fn new(
        queue: Arc<SyncQueue>,
        api: Arc<dyn RemoteApi>,
        library: Arc<dyn LibraryStore>,
        events: EventBus,
        tracker: StatusTracker,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            queue,
            api,
            library,
            events,
            tracker,
            config,
        }
    }

    /// Replays pending tasks until every remaining task is held back or
    /// `cancel` fires
    ///
    /// A transient failure holds back its path, and every later task that
    /// overlaps it, until the next drain; unrelated paths keep draining.
    /// Cancellation is observed between tasks, never inside one.
    pub async fn run(&self, cancel: &CancellationToken) -> SyncResult<DrainReport> {
        let mut guard = DrainGuard::acquire(&self.tracker)?;
        let mut report = DrainReport::default();
        let batch_size = self.config.batch_size.max(1);
        let mut blocked: Vec<RelativePath> = Vec::new();
        let mut window = batch_size;

        loop {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let pending = self.queue.next_batch(window).await?;
            let exhausted = pending.len() < window;
            let (held, mut runnable) = hold_back(pending, &mut blocked);
            runnable.truncate(batch_size);
            // Page past held tasks so they never starve the rest of the queue
            window = held + batch_size;

            if runnable.is_empty() {
                if exhausted {
                    break;
                }
                continue;
            }

            let (batch_report, newly_blocked) = self.run_batch(runnable, cancel).await?;
            let stalled = batch_report.cancelled || batch_report.attempted == 0;
            if !newly_blocked.is_empty() {
                log::debug!("Holding back {} path(s) until the next drain", newly_blocked.len());
                blocked.extend(newly_blocked);
            }
            report.absorb(batch_report);

            if stalled {
                break;
            }
        }

        self.tracker.set_pending(self.queue.pending_count().await?);
        if !report.cancelled {
            guard.completed();
        }

        log::info!(
            "Sync drain finished: {} attempted, {} committed, {} dropped, {} left for retry{}",
            report.attempted,
            report.committed,
            report.dropped,
            report.retryable,
            if report.cancelled { " (cancelled)" } else { "" }
        );

        Ok(report)
    }

    /// Runs a batch, returning its counts and the paths a transient failure blocked
    async fn run_batch(
        &self,
        batch: Vec<SyncTask>,
        cancel: &CancellationToken,
    ) -> SyncResult<(DrainReport, Vec<RelativePath>)> {
        let lanes = build_lanes(batch);
        log::debug!("Replaying batch in {} lane(s)", lanes.len());

        let results: Vec<SyncResult<(DrainReport, Vec<RelativePath>)>> = stream::iter(lanes)
            .map(|lane| self.run_lane(lane, cancel))
            .buffer_unordered(self.config.max_parallel_paths.max(1))
            .collect()
            .await;

        let mut report = DrainReport::default();
        let mut blocked = Vec::new();
        for result in results {
            let (lane_report, lane_blocked) = result?;
            report.absorb(lane_report);
            blocked.extend(lane_blocked);
        }
        Ok((report, blocked))
    }

    async fn run_lane(
        &self,
        lane: Vec<SyncTask>,
        cancel: &CancellationToken,
    ) -> SyncResult<(DrainReport, Vec<RelativePath>)> {
        let mut report = DrainReport::default();
        let mut blocked = Vec::new();
        let mut tasks = lane.into_iter();

        while let Some(task) = tasks.next() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let _path_guard = self.queue.lock_path(&task.relative_path).await?;

            // Collapsing may have removed the task while the lane waited
            let still_queued = self
                .queue
                .tasks_for_path(&task.relative_path)
                .await?
                .iter()
                .any(|pending| pending.id == task.id);
            if !still_queued {
                continue;
            }

            report.attempted += 1;
            match self.attempt(&task).await {
                Attempt::Committed(update) => {
                    self.commit(&task, update).await?;
                    report.committed += 1;
                }
                Attempt::Failed(error) => {
                    let kind = error.kind();
                    self.fail(&task, kind, &error).await?;
                    if kind.removes_task() {
                        report.dropped += 1;
                    } else {
                        report.retryable += 1;
                        blocked.extend(task.touched_paths());
                        blocked.extend(tasks.by_ref().flat_map(|rest| rest.touched_paths()));
                        break;
                    }
                }
            }
        }

        Ok((report, blocked))
    }

    async fn attempt(&self, task: &SyncTask) -> Attempt {
        log::debug!("Replaying {} for {}", task.job_type(), task.relative_path);

        match self.dispatch(task).await {
            Ok(update) => Attempt::Committed(update),
            Err(error) if error.is_not_found() && already_gone(task) => {
                log::debug!(
                    "{} for {} found nothing to remove, treating as done",
                    task.job_type(),
                    task.relative_path
                );
                Attempt::Committed(removal_update(task))
            }
            Err(error) => Attempt::Failed(error),
        }
    }

    /// Issues exactly one remote call for `task`
    async fn dispatch(&self, task: &SyncTask) -> SyncResult<Option<RemoteUpdate>> {
        let path = &task.relative_path;
        let timeout = self.config.request_timeout;

        let update = match &task.payload {
            TaskPayload::Upload(snapshot) => {
                self.call(timeout, self.api.upload_item(snapshot)).await?;
                None
            }
            TaskPayload::Update(update) => {
                self.call(timeout, self.api.update_item(path, update)).await?;
                None
            }
            TaskPayload::Move(params) => {
                self.call(timeout, self.api.move_item(&params.origin, &params.destination))
                    .await?;
                None
            }
            TaskPayload::RenameFolder(params) => {
                let destination = task.destination().ok_or_else(|| {
                    SyncError::InvalidTask(format!("cannot rename {} to {}", path, params.name))
                })?;
                self.call(timeout, self.api.move_item(path, &destination)).await?;
                None
            }
            TaskPayload::Delete => {
                self.call(timeout, self.api.delete_item(path, false)).await?;
                None
            }
            TaskPayload::ShallowDelete => {
                self.call(timeout, self.api.delete_item(path, true)).await?;
                None
            }
            TaskPayload::SetBookmark(bookmark) => {
                self.call(timeout, self.api.set_bookmark(path, bookmark)).await?;
                Some(RemoteUpdate::BookmarkSynced {
                    time: bookmark.time,
                    note: bookmark.note.clone(),
                })
            }
            TaskPayload::DeleteBookmark(bookmark) => {
                self.call(timeout, self.api.delete_bookmark(path, bookmark.time))
                    .await?;
                Some(RemoteUpdate::BookmarkRemoved {
                    time: bookmark.time,
                })
            }
            TaskPayload::UploadArtwork(artwork) => {
                let image = tokio::fs::read(&artwork.image_path).await?;
                let url = self
                    .call(timeout, self.api.upload_artwork(path, Bytes::from(image)))
                    .await?;
                Some(RemoteUpdate::Thumbnail { url })
            }
        };

        Ok(update)
    }

    async fn call<T, F>(&self, timeout: Duration, request: F) -> SyncResult<T>
    where
        F: std::future::Future<Output = Result<T, NetworkError>>,
    {
        let result = with_timeout(timeout, request).await.map_err(NetworkError::from)?;
        Ok(result?)
    }

    async fn commit(&self, task: &SyncTask, update: Option<RemoteUpdate>) -> SyncResult<()> {
        if let Some(update) = update {
            if let Err(e) = self
                .library
                .apply_remote_update(&task.relative_path, update)
                .await
            {
                log::warn!(
                    "Remote accepted {} for {} but the local item could not be updated: {}",
                    task.job_type(),
                    task.relative_path,
                    e
                );
            }
        }

        self.queue.complete(&task.id).await?;
        log::debug!("Committed {} for {}", task.job_type(), task.relative_path);

        self.events.emit(SyncEvent::TaskCompleted {
            task_id: task.id.clone(),
            relative_path: task.relative_path.clone(),
            job_type: task.job_type(),
        });
        Ok(())
    }

    async fn fail(&self, task: &SyncTask, kind: ErrorKind, error: &SyncError) -> SyncResult<()> {
        let record = ErrorRecord {
            task_id: task.id.clone(),
            relative_path: task.relative_path.clone(),
            job_type: task.job_type(),
            kind,
            message: error.to_string(),
            timestamp: Timestamp::now(),
        };

        if kind.removes_task() {
            log::warn!(
                "Dropping {} for {} after {:?} failure: {}",
                task.job_type(),
                task.relative_path,
                kind,
                error
            );
            self.queue.complete(&task.id).await?;
        } else {
            log::warn!(
                "{} for {} will be retried: {}",
                task.job_type(),
                task.relative_path,
                error
            );
        }

        if error.is_not_found() {
            log::warn!(
                "Remote has no item at {}, local library needs reconciliation",
                task.relative_path
            );
            self.events.emit(SyncEvent::RemoteItemMissing {
                relative_path: task.relative_path.clone(),
            });
        }

        self.tracker.record_error(record.clone())?;
        self.events.emit(SyncEvent::TaskFailed(record));
        Ok(())
    }
}

/// Jobs whose goal is absence, so a 404 means the goal already holds
fn already_gone(task: &SyncTask) -> bool {
    task.job_type().is_delete() || task.job_type() == JobType::DeleteBookmark
}

fn removal_update(task: &SyncTask) -> Option<RemoteUpdate> {
    match &task.payload {
        TaskPayload::DeleteBookmark(bookmark) => Some(RemoteUpdate::BookmarkRemoved {
            time: bookmark.time,
        }),
        _ => None,
    }
}

/// Splits pending tasks into the number held back and those free to run
///
/// A task overlapping a blocked path is held and blocks its own paths too,
/// so nothing queued after it can overtake it.
fn hold_back(pending: Vec<SyncTask>, blocked: &mut Vec<RelativePath>) -> (usize, Vec<SyncTask>) {
    let mut held = 0;
    let mut runnable = Vec::new();

    for task in pending {
        let touched = task.touched_paths();
        let is_held = touched
            .iter()
            .any(|path| blocked.iter().any(|b| b.overlaps(path)));
        if is_held {
            held += 1;
            for path in touched {
                if !blocked.contains(&path) {
                    blocked.push(path);
                }
            }
        } else {
            runnable.push(task);
        }
    }

    (held, runnable)
}

/// Groups a batch into lanes of tasks with overlapping paths, keeping enqueue order
fn build_lanes(batch: Vec<SyncTask>) -> Vec<Vec<SyncTask>> {
    let mut lanes: Vec<(Vec<RelativePath>, Vec<usize>)> = Vec::new();

    for (index, task) in batch.iter().enumerate() {
        let touched = task.touched_paths();
        let (overlapping, mut rest): (Vec<_>, Vec<_>) = lanes.into_iter().partition(|(paths, _)| {
            paths
                .iter()
                .any(|path| touched.iter().any(|t| t.overlaps(path)))
        });

        let mut paths = touched;
        let mut members = Vec::new();
        for (lane_paths, lane_members) in overlapping {
            paths.extend(lane_paths);
            members.extend(lane_members);
        }
        members.sort_unstable();
        members.push(index);

        rest.push((paths, members));
        lanes = rest;
    }

    // Lane order follows each lane's first task
    lanes.sort_by_key(|(_, members)| members[0]);

    let mut slots: Vec<Option<SyncTask>> = batch.into_iter().map(Some).collect();
    lanes
        .into_iter()
        .map(|(_, members)| {
            members
                .into_iter()
                .filter_map(|index| slots[index].take())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bookplayer_core::{MetadataUpdate, MoveParams, RenameParams};

    fn path(s: &str) -> RelativePath {
        RelativePath::new(s).unwrap()
    }

    fn update(p: &str) -> SyncTask {
        SyncTask::new(
            path(p),
            TaskPayload::Update(MetadataUpdate {
                current_time: Some(1.0),
                ..Default::default()
            }),
        )
    }

    fn lane_paths(lanes: &[Vec<SyncTask>]) -> Vec<Vec<String>> {
        lanes
            .iter()
            .map(|lane| lane.iter().map(|t| t.relative_path.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_unrelated_paths_get_separate_lanes() {
        let lanes = build_lanes(vec![update("a"), update("b"), update("a")]);
        assert_eq!(lane_paths(&lanes), vec![vec!["a", "a"], vec!["b"]]);
    }

    #[test]
    fn test_ancestors_share_a_lane() {
        let lanes = build_lanes(vec![
            update("folder/book"),
            update("other"),
            SyncTask::new(path("folder"), TaskPayload::Delete),
        ]);
        assert_eq!(
            lane_paths(&lanes),
            vec![vec!["folder/book", "folder"], vec!["other"]]
        );
    }

    #[test]
    fn test_move_joins_destination_lane() {
        let lanes = build_lanes(vec![
            update("a"),
            update("b"),
            SyncTask::new(
                path("a"),
                TaskPayload::Move(MoveParams {
                    origin: path("a"),
                    destination: path("b"),
                }),
            ),
            update("c"),
        ]);
        assert_eq!(lane_paths(&lanes), vec![vec!["a", "b", "a"], vec!["c"]]);
    }

    #[test]
    fn test_rename_destination_is_touched() {
        let lanes = build_lanes(vec![
            SyncTask::new(
                path("shelf/old"),
                TaskPayload::RenameFolder(RenameParams {
                    name: "new".to_string(),
                }),
            ),
            update("shelf/new/book"),
        ]);
        assert_eq!(lanes.len(), 1);
    }

    #[test]
    fn test_held_tasks_block_what_follows_them() {
        let mut blocked = vec![path("a")];
        let rename = SyncTask::new(
            path("a"),
            TaskPayload::RenameFolder(RenameParams {
                name: "b".to_string(),
            }),
        );
        let (held, runnable) =
            hold_back(vec![update("a/book"), rename, update("b"), update("c")], &mut blocked);

        assert_eq!(held, 3);
        assert_eq!(lane_paths(&[runnable]), vec![vec!["c"]]);
        assert!(blocked.iter().any(|p| p.as_str() == "b"));
    }

    #[test]
    fn test_deletes_tolerate_missing_remote() {
        assert!(already_gone(&SyncTask::new(path("a"), TaskPayload::ShallowDelete)));
        assert!(!already_gone(&update("a")));
    }
}
