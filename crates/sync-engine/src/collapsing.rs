//! Task collapsing policy
//!
//! Decides what happens to the pending tasks of a path when a new mutation
//! for the same path arrives. Structural mutations (move, rename, delete)
//! are never lost; rapid metadata edits fold into a single task.

use bookplayer_core::{same_time, SyncTask, TaskId, TaskPayload};

/// What the queue should do with an incoming task
#[derive(Debug, Clone, PartialEq)]
pub enum CollapsingDecision {
    /// Queue the incoming task at the tail
    AppendNew,
    /// Drop every pending task for the path and queue this one in place of the earliest
    ReplaceAll(SyncTask),
    /// Discard the incoming task and remove the listed pending tasks
    DropIncoming { cancel: Vec<TaskId> },
}

/// Decides how `incoming` combines with the pending tasks for its path
///
/// `existing` must hold only tasks for `incoming.relative_path`, in enqueue order.
pub fn decide(existing: &[SyncTask], incoming: &SyncTask) -> CollapsingDecision {
    if existing.is_empty() {
        return CollapsingDecision::AppendNew;
    }

    match &incoming.payload {
        TaskPayload::Delete | TaskPayload::ShallowDelete => {
            CollapsingDecision::ReplaceAll(incoming.clone())
        }
        TaskPayload::DeleteBookmark(bookmark) => {
            let cancel: Vec<TaskId> = existing
                .iter()
                .filter(|task| {
                    matches!(&task.payload, TaskPayload::SetBookmark(set) if same_time(set.time, bookmark.time))
                })
                .map(|task| task.id.clone())
                .collect();

            if cancel.is_empty() {
                CollapsingDecision::AppendNew
            } else {
                CollapsingDecision::DropIncoming { cancel }
            }
        }
        TaskPayload::Update(_) => match merge_metadata(existing, incoming) {
            Some(payload) => CollapsingDecision::ReplaceAll(SyncTask::restore(
                incoming.id.clone(),
                incoming.relative_path.clone(),
                payload,
                incoming.created_at,
            )),
            None => CollapsingDecision::AppendNew,
        },
        _ => CollapsingDecision::AppendNew,
    }
}

/// Folds pending uploads/updates and the incoming update into one payload
///
/// Returns `None` when any other job type is pending for the path.
fn merge_metadata(existing: &[SyncTask], incoming: &SyncTask) -> Option<TaskPayload> {
    let mut merged: Option<TaskPayload> = None;

    for task in existing.iter().chain(std::iter::once(incoming)) {
        merged = Some(match (merged, &task.payload) {
            (_, TaskPayload::Upload(snapshot)) => TaskPayload::Upload(snapshot.clone()),
            (Some(TaskPayload::Upload(mut snapshot)), TaskPayload::Update(update)) => {
                snapshot.apply(update);
                TaskPayload::Upload(snapshot)
            }
            (Some(TaskPayload::Update(earlier)), TaskPayload::Update(update)) => {
                TaskPayload::Update(earlier.merged_with(update))
            }
            (None, TaskPayload::Update(update)) => TaskPayload::Update(update.clone()),
            _ => return None,
        });
    }

    merged
}
