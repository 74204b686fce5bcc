// crates/sync-engine/src/conflict.rs
//! Last-played conflict resolution

use crate::types::ConflictOutcome;
use bookplayer_core::{ItemMetadata, MetadataUpdate, SyncTask, TaskPayload, Timestamp};

/// Outcome of a last-played comparison
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// What the caller should do locally
    pub outcome: ConflictOutcome,
    /// Update to queue so the remote follows the local session
    pub local_update: Option<SyncTask>,
}

impl Resolution {
    fn outcome(outcome: ConflictOutcome) -> Self {
        Self {
            outcome,
            local_update: None,
        }
    }
}

/// Compares the local last-played item with the remote's record after a listing sync
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Decides how to reconcile `local` and `remote` last-played items
    ///
    /// While something is playing the local session is authoritative: a
    /// remote pointer to another item yields `NoConflict` plus an update
    /// task re-asserting the local item, stamped with `now`.
    pub fn resolve(
        &self,
        local: Option<&ItemMetadata>,
        remote: Option<&ItemMetadata>,
        is_playing: bool,
        now: Timestamp,
    ) -> Resolution {
        let Some(remote) = remote else {
            return Resolution::outcome(ConflictOutcome::NoConflict);
        };

        match local {
            Some(local) if local.relative_path == remote.relative_path => {
                if remote.progress_differs(local) {
                    Resolution::outcome(ConflictOutcome::ReloadLastBook(
                        remote.relative_path.clone(),
                    ))
                } else {
                    Resolution::outcome(ConflictOutcome::NoConflict)
                }
            }
            _ if !is_playing => Resolution::outcome(ConflictOutcome::DifferentLastBook(
                remote.relative_path.clone(),
            )),
            Some(local) => {
                log::debug!(
                    "Remote last played {} differs while {} is playing, re-asserting local",
                    remote.relative_path,
                    local.relative_path
                );
                let update = MetadataUpdate {
                    last_play_date: Some(now),
                    ..local.progress_update()
                };
                Resolution {
                    outcome: ConflictOutcome::NoConflict,
                    local_update: Some(SyncTask::new(
                        local.relative_path.clone(),
                        TaskPayload::Update(update),
                    )),
                }
            }
            None => Resolution::outcome(ConflictOutcome::NoConflict),
        }
    }
}
