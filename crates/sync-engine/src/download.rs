//! Download manager
//!
//! Owns the tri-state download status of every remote-backed item. State
//! lives in one map guarded by a single lock; every transition (progress,
//! completion, cancellation) re-checks the item's active transfer under that
//! lock, so a cancelled transfer can never publish progress or completion.

use crate::collaborators::LibraryStore;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::types::{DownloadCompleted, DownloadState};
use bookplayer_core::RelativePath;
use bookplayer_network::{
    FileDownloader, NetworkError, NetworkResult, ProgressTracker, RemoteApi, RemoteFile,
};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Smallest progress change worth publishing
const PROGRESS_STEP: f64 = 0.01;

struct ActiveTransfer {
    cancel: CancellationToken,
}

#[derive(Default)]
struct Downloads {
    states: HashMap<RelativePath, DownloadState>,
    /// One entry per running attempt; a cancelled entry stays until its attempt unwinds
    active: HashMap<RelativePath, ActiveTransfer>,
    watchers: HashMap<RelativePath, watch::Sender<DownloadState>>,
}

impl Downloads {
    fn set(&mut self, path: &RelativePath, state: DownloadState) {
        self.states.insert(path.clone(), state);
        if let Some(watcher) = self.watchers.get(path) {
            watcher.send_replace(state);
        }
    }

    fn is_live(&self, path: &RelativePath) -> bool {
        self.active
            .get(path)
            .is_some_and(|transfer| !transfer.cancel.is_cancelled())
    }
}

/// Result of moving one item's files
struct Transfer {
    files: Vec<RelativePath>,
    /// Final paths written during this attempt
    fetched: Vec<PathBuf>,
    error: Option<SyncError>,
}

impl Transfer {
    fn failed(error: SyncError) -> Self {
        Self {
            files: Vec::new(),
            fetched: Vec::new(),
            error: Some(error),
        }
    }
}

/// Fetches remote item bytes into the local library and tracks their state
pub struct DownloadManager {
    api: Arc<dyn RemoteApi>,
    downloader: Arc<dyn FileDownloader>,
    library: Arc<dyn LibraryStore>,
    events: EventBus,
    root: PathBuf,
    parallel_transfers: usize,
    inner: Mutex<Downloads>,
}

impl DownloadManager {
    /// Creates a manager storing files under `root`
    pub fn new(
        api: Arc<dyn RemoteApi>,
        downloader: Arc<dyn FileDownloader>,
        library: Arc<dyn LibraryStore>,
        events: EventBus,
        root: PathBuf,
        parallel_transfers: usize,
    ) -> Self {
        Self {
            api,
            downloader,
            library,
            events,
            root,
            parallel_transfers: parallel_transfers.max(1),
            inner: Mutex::new(Downloads::default()),
        }
    }

    /// Local library root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `path`'s bytes live on disk
    pub fn local_path(&self, path: &RelativePath) -> PathBuf {
        path.segments().fold(self.root.clone(), |dir, segment| dir.join(segment))
    }

    fn lock(&self) -> SyncResult<MutexGuard<'_, Downloads>> {
        self.inner
            .lock()
            .map_err(|_| SyncError::lock_poisoned("download states"))
    }

    /// Current state of `path`
    ///
    /// Items never seen in this session are judged by filesystem presence.
    pub fn download_state(&self, path: &RelativePath) -> DownloadState {
        let known = match self.inner.lock() {
            Ok(downloads) => downloads.states.get(path).copied(),
            Err(_) => {
                log::error!("Download state lock poisoned, reading {} from disk", path);
                None
            }
        };
        known.unwrap_or_else(|| self.disk_state(path))
    }

    fn disk_state(&self, path: &RelativePath) -> DownloadState {
        let local = self.local_path(path);
        match std::fs::metadata(&local) {
            Ok(meta) if meta.is_file() => DownloadState::Downloaded,
            Ok(meta) if meta.is_dir() => {
                let has_content = std::fs::read_dir(&local)
                    .map(|entries| {
                        entries
                            .filter_map(|entry| entry.ok())
                            .any(|entry| !is_partial(&entry.path()))
                    })
                    .unwrap_or(false);
                if has_content {
                    DownloadState::Downloaded
                } else {
                    DownloadState::NotDownloaded
                }
            }
            _ => DownloadState::NotDownloaded,
        }
    }

    /// Watches `path`'s state; the receiver starts at the current state
    pub fn subscribe(&self, path: &RelativePath) -> SyncResult<watch::Receiver<DownloadState>> {
        let current = self.download_state(path);
        let mut downloads = self.lock()?;
        Ok(downloads
            .watchers
            .entry(path.clone())
            .or_insert_with(|| watch::channel(current).0)
            .subscribe())
    }

    /// Recomputes states from the filesystem, skipping items with a transfer in flight
    pub fn refresh_from_disk(&self, paths: &[RelativePath]) -> SyncResult<()> {
        let states: Vec<(RelativePath, DownloadState)> = paths
            .iter()
            .map(|path| (path.clone(), self.disk_state(path)))
            .collect();

        let mut downloads = self.lock()?;
        for (path, state) in states {
            if !downloads.active.contains_key(&path) {
                downloads.set(&path, state);
            }
        }
        log::debug!("Refreshed download state of {} item(s)", paths.len());
        Ok(())
    }

    /// Paths with a transfer that has not been cancelled
    pub fn active_downloads(&self) -> SyncResult<Vec<RelativePath>> {
        let downloads = self.lock()?;
        Ok(downloads
            .active
            .iter()
            .filter(|(_, transfer)| !transfer.cancel.is_cancelled())
            .map(|(path, _)| path.clone())
            .collect())
    }

    /// Downloads every remote file of `path` (one for a book, all children for a container)
    ///
    /// On success the item, each transferred file, and any ancestor whose
    /// children are now all local become `Downloaded`. On failure or
    /// cancellation files fetched by this attempt are removed and the item
    /// returns to `NotDownloaded`.
    pub async fn download_remote_files(&self, path: &RelativePath) -> SyncResult<()> {
        let cancel = self.begin(path)?;
        log::info!("Downloading {}", path);

        let transfer = self.transfer(path, &cancel).await;
        self.finish(path, transfer).await
    }

    fn begin(&self, path: &RelativePath) -> SyncResult<CancellationToken> {
        let mut downloads = self.lock()?;
        if downloads.active.keys().any(|active| active.overlaps(path)) {
            return Err(SyncError::DownloadInProgress(path.clone()));
        }

        let cancel = CancellationToken::new();
        downloads.active.insert(
            path.clone(),
            ActiveTransfer {
                cancel: cancel.clone(),
            },
        );
        downloads.set(path, DownloadState::Downloading { progress: 0.0 });
        Ok(cancel)
    }

    async fn transfer(&self, path: &RelativePath, cancel: &CancellationToken) -> Transfer {
        let files = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Transfer::failed(SyncError::Cancelled),
            listed = self.api.remote_files(path) => match listed {
                Ok(files) => files,
                Err(e) => return Transfer::failed(e.into()),
            },
        };

        let sizes: Vec<Option<u64>> = files.iter().map(|file| file.size).collect();
        let progress = ProgressTracker::new(&sizes);
        let abort = cancel.child_token();

        let results: Vec<(PathBuf, NetworkResult<u64>)> = stream::iter(0..files.len())
            .map(|index| {
                let file = &files[index];
                let progress = &progress;
                let abort = &abort;
                async move {
                    let destination = self.local_path(&file.relative_path);
                    let result = self
                        .fetch_file(path, index, file, &destination, progress, abort)
                        .await;
                    if result.is_err() {
                        // Stop the siblings; the attempt has failed
                        abort.cancel();
                    }
                    (destination, result)
                }
            })
            .buffer_unordered(self.parallel_transfers)
            .collect()
            .await;

        let mut fetched = Vec::new();
        let mut error = None;
        for (destination, result) in results {
            match result {
                Ok(_) => fetched.push(destination),
                Err(NetworkError::Cancelled) => {
                    error.get_or_insert(SyncError::Cancelled);
                }
                Err(e) => {
                    if matches!(error, None | Some(SyncError::Cancelled)) {
                        error = Some(e.into());
                    }
                }
            }
        }
        if cancel.is_cancelled() {
            error = Some(SyncError::Cancelled);
        }

        Transfer {
            files: files.into_iter().map(|file| file.relative_path).collect(),
            fetched,
            error,
        }
    }

    async fn fetch_file(
        &self,
        path: &RelativePath,
        index: usize,
        file: &RemoteFile,
        destination: &Path,
        progress: &ProgressTracker,
        abort: &CancellationToken,
    ) -> NetworkResult<u64> {
        if let Some(dir) = destination.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let report = |received: u64| {
            let fraction = progress.update(index, received);
            self.publish_progress(path, fraction);
        };
        let bytes = self
            .downloader
            .fetch(&file.url, destination, abort, &report)
            .await?;

        let fraction = progress.complete(index, bytes);
        self.publish_progress(path, fraction);
        log::debug!("Fetched {} ({} bytes)", file.relative_path, bytes);
        Ok(bytes)
    }

    fn publish_progress(&self, path: &RelativePath, fraction: f64) {
        let Ok(mut downloads) = self.inner.lock() else {
            return;
        };
        if !downloads.is_live(path) {
            return;
        }

        let fraction = fraction.clamp(0.0, 1.0);
        let previous = downloads
            .states
            .get(path)
            .map(|state| state.progress())
            .unwrap_or(0.0);
        if fraction <= previous || (fraction < 1.0 && fraction - previous < PROGRESS_STEP) {
            return;
        }

        downloads.set(path, DownloadState::Downloading { progress: fraction });
        self.events.emit(SyncEvent::DownloadProgress {
            relative_path: path.clone(),
            progress: fraction,
        });
    }

    async fn finish(&self, path: &RelativePath, transfer: Transfer) -> SyncResult<()> {
        let live = {
            let mut downloads = self.lock()?;
            let live = downloads.is_live(path);
            downloads.active.remove(path);

            if live && transfer.error.is_none() {
                for file in &transfer.files {
                    downloads.set(file, DownloadState::Downloaded);
                }
                downloads.set(path, DownloadState::Downloaded);
            } else if live {
                downloads.set(path, DownloadState::NotDownloaded);
            }
            live
        };

        if !live || transfer.error.is_some() {
            remove_files(&transfer.fetched).await;
        }

        if !live {
            log::info!("Download of {} cancelled", path);
            return Err(SyncError::Cancelled);
        }

        if let Some(error) = transfer.error {
            log::warn!("Download of {} failed: {}", path, error);
            self.events.emit(SyncEvent::DownloadFailed {
                relative_path: path.clone(),
                message: error.to_string(),
            });
            return Err(error);
        }

        if let Err(e) = self.library.mark_downloaded(path, true).await {
            log::warn!("Could not mark {} as downloaded: {}", path, e);
        }

        let completed: Vec<RelativePath> = if transfer.files.is_empty() {
            vec![path.clone()]
        } else {
            transfer.files
        };
        for file in completed {
            self.events.emit(SyncEvent::DownloadCompleted(DownloadCompleted {
                parent_path: file.parent(),
                relative_path: file,
                initiating_path: path.clone(),
            }));
        }

        if let Err(e) = self.promote_ancestors(path).await {
            log::warn!("Could not update containers of {}: {}", path, e);
        }

        log::info!("Downloaded {}", path);
        Ok(())
    }

    /// Marks containers downloaded once all their children are
    async fn promote_ancestors(&self, path: &RelativePath) -> SyncResult<()> {
        let mut current = path.clone();

        while let Some(parent) = current.parent() {
            let children = self.library.child_paths(&parent).await?;
            let complete = !children.is_empty()
                && children
                    .iter()
                    .all(|child| self.download_state(child).is_downloaded());
            if !complete {
                break;
            }

            {
                let mut downloads = self.lock()?;
                if downloads.active.contains_key(&parent) {
                    break;
                }
                downloads.set(&parent, DownloadState::Downloaded);
            }
            self.library.mark_downloaded(&parent, true).await?;
            log::debug!("All items of {} are downloaded", parent);

            current = parent;
        }

        Ok(())
    }

    /// Aborts `path`'s transfer; returns false if none was running
    ///
    /// The state is `NotDownloaded` when this returns, whatever the
    /// transfer reports afterwards.
    pub fn cancel_download(&self, path: &RelativePath) -> SyncResult<bool> {
        let mut downloads = self.lock()?;
        let cancel = match downloads.active.get(path) {
            Some(transfer) if !transfer.cancel.is_cancelled() => transfer.cancel.clone(),
            _ => return Ok(false),
        };

        cancel.cancel();
        downloads.set(path, DownloadState::NotDownloaded);
        self.events.emit(SyncEvent::DownloadCancelled {
            relative_path: path.clone(),
        });
        Ok(true)
    }

    /// Aborts every running transfer
    pub fn cancel_all(&self) -> SyncResult<usize> {
        let paths = self.active_downloads()?;
        let mut cancelled = 0;
        for path in paths {
            if self.cancel_download(&path)? {
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    /// Deletes local bytes of a downloaded item, keeping folders as empty placeholders
    ///
    /// The remote record is untouched.
    pub async fn offload_item(&self, path: &RelativePath) -> SyncResult<()> {
        {
            let downloads = self.lock()?;
            if downloads.active.keys().any(|active| active.overlaps(path)) {
                return Err(SyncError::DownloadInProgress(path.clone()));
            }
        }

        let local = self.local_path(path);
        match tokio::fs::metadata(&local).await {
            Ok(meta) if meta.is_dir() => {
                tokio::fs::remove_dir_all(&local).await?;
                tokio::fs::create_dir_all(&local).await?;
            }
            Ok(_) => tokio::fs::remove_file(&local).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let demoted_ancestors = {
            let mut downloads = self.lock()?;
            let descendants: Vec<RelativePath> = downloads
                .states
                .keys()
                .filter(|known| path.is_ancestor_of(known))
                .cloned()
                .collect();
            for descendant in &descendants {
                downloads.set(descendant, DownloadState::NotDownloaded);
            }
            downloads.set(path, DownloadState::NotDownloaded);

            let mut demoted = Vec::new();
            let mut current = path.parent();
            while let Some(ancestor) = current {
                if downloads.states.get(&ancestor).is_some_and(|s| s.is_downloaded()) {
                    demoted.push(ancestor.clone());
                }
                downloads.set(&ancestor, DownloadState::NotDownloaded);
                current = ancestor.parent();
            }
            demoted
        };

        self.library.mark_downloaded(path, false).await?;
        for ancestor in &demoted_ancestors {
            self.library.mark_downloaded(ancestor, false).await?;
        }

        log::info!("Offloaded {}", path);
        self.events.emit(SyncEvent::ItemOffloaded {
            relative_path: path.clone(),
        });
        Ok(())
    }
}

fn is_partial(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "part")
}

async fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("Could not remove {}: {}", path.display(), e);
            }
        }
    }
}
