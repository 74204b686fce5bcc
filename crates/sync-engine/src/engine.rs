// crates/sync-engine/src/engine.rs
//! Main sync engine

use crate::collaborators::{LibraryStore, Player};
use crate::conflict::ConflictResolver;
use crate::download::DownloadManager;
use crate::error::{SyncError, SyncResult};
use crate::events::{EventBus, SyncEvent};
use crate::executor::{ExecutorConfig, SyncExecutor};
use crate::queue::{ScheduleOutcome, SyncQueue};
use crate::scheduler::SyncScheduler;
use crate::tracker::StatusTracker;
use crate::types::{ConflictOutcome, DrainReport, ErrorRecord, SyncState};
use bookplayer_config::{Config, SyncConfig};
use bookplayer_core::{
    ArtworkParams, BookmarkParams, BookmarkRef, ItemMetadata, JobType, MetadataUpdate, MoveParams,
    RelativePath, RenameParams, SyncTask, TaskPayload, TaskStore, Timestamp,
};
use bookplayer_network::{
    Client, ClientConfig, FileDownloader, HttpFileDownloader, HttpRemoteApi, NetworkError,
    RemoteApi,
};
use bookplayer_resilience::{with_timeout, RetryPolicy};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Runtime settings of the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub executor: ExecutorConfig,
    /// Background drain period
    pub drain_interval: Duration,
    /// Minimum time between listing syncs of one level; zero disables the throttle
    pub list_sync_interval: Duration,
    /// Error records kept
    pub error_history: usize,
    /// Local library root
    pub downloads_dir: PathBuf,
    /// Files of one item transferred concurrently
    pub parallel_transfers: usize,
}

impl EngineConfig {
    /// Derives engine settings from the configuration file
    pub fn from_config(config: &Config) -> Self {
        let sync = &config.sync;
        Self {
            executor: ExecutorConfig {
                batch_size: sync.batch_size,
                max_parallel_paths: sync.max_parallel_paths,
                request_timeout: Duration::from_secs(sync.request_timeout_secs),
            },
            drain_interval: Duration::from_secs(sync.drain_interval_secs),
            list_sync_interval: Duration::from_secs(sync.list_sync_interval_secs),
            error_history: sync.error_history,
            downloads_dir: config.downloads.downloads_dir.clone(),
            parallel_transfers: config.downloads.parallel_transfers,
        }
    }

    /// HTTP client settings for the remote API
    pub fn client_config(sync: &SyncConfig) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(sync.request_timeout_secs),
            retry_policy: Some(
                RetryPolicy::new(sync.max_request_attempts)
                    .with_initial_delay(Duration::from_millis(200)),
            ),
            auth_token: sync.auth_token.clone(),
            ..ClientConfig::default()
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of a listing sync
#[derive(Debug, Clone, PartialEq)]
pub struct ListingSync {
    /// Remote items, minus those with a pending local delete or move
    pub items: Vec<ItemMetadata>,
    /// Remote's last played item
    pub last_played: Option<ItemMetadata>,
    pub outcome: ConflictOutcome,
}

/// Main synchronization engine
///
/// Local mutations go in through the `schedule_*` methods; `drain` (or a
/// [`SyncScheduler`]) replays them; `sync_list_contents` pulls a library
/// level and reconciles the last played item; `downloads` tracks item bytes.
pub struct SyncEngine {
    config: EngineConfig,
    queue: Arc<SyncQueue>,
    executor: SyncExecutor,
    downloads: DownloadManager,
    api: Arc<dyn RemoteApi>,
    library: Arc<dyn LibraryStore>,
    player: Arc<dyn Player>,
    resolver: ConflictResolver,
    events: EventBus,
    tracker: StatusTracker,
    drain_cancel: Mutex<CancellationToken>,
    list_syncs: Mutex<HashMap<Option<RelativePath>, Instant>>,
    deferred_reload: Mutex<Option<ItemMetadata>>,
}

impl SyncEngine {
    /// Creates an engine over the given collaborators
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn TaskStore>,
        api: Arc<dyn RemoteApi>,
        downloader: Arc<dyn FileDownloader>,
        library: Arc<dyn LibraryStore>,
        player: Arc<dyn Player>,
    ) -> Self {
        let events = EventBus::default();
        let tracker = StatusTracker::new(config.error_history);
        let queue = Arc::new(SyncQueue::new(store));

        let executor = SyncExecutor::new(
            Arc::clone(&queue),
            Arc::clone(&api),
            Arc::clone(&library),
            events.clone(),
            tracker.clone(),
            config.executor.clone(),
        );
        let downloads = DownloadManager::new(
            Arc::clone(&api),
            downloader,
            Arc::clone(&library),
            events.clone(),
            config.downloads_dir.clone(),
            config.parallel_transfers,
        );

        Self {
            config,
            queue,
            executor,
            downloads,
            api,
            library,
            player,
            resolver: ConflictResolver::new(),
            events,
            tracker,
            drain_cancel: Mutex::new(CancellationToken::new()),
            list_syncs: Mutex::new(HashMap::new()),
            deferred_reload: Mutex::new(None),
        }
    }

    /// Creates an engine talking HTTP to the configured remote
    pub fn connect(
        config: &Config,
        store: Arc<dyn TaskStore>,
        library: Arc<dyn LibraryStore>,
        player: Arc<dyn Player>,
    ) -> SyncResult<Self> {
        let client = Client::with_config(EngineConfig::client_config(&config.sync))?;
        let api = HttpRemoteApi::new(client.clone(), &config.sync.api_base_url)?;
        let downloader = HttpFileDownloader::new(client);

        Ok(Self::new(
            EngineConfig::from_config(config),
            store,
            Arc::new(api),
            Arc::new(downloader),
            library,
            player,
        ))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Records a local mutation for remote replay
    pub async fn schedule(&self, task: SyncTask) -> SyncResult<ScheduleOutcome> {
        let job_type = task.job_type();
        let relative_path = task.relative_path.clone();
        let outcome = self.queue.schedule(task).await?;

        match &outcome {
            ScheduleOutcome::Appended(id) | ScheduleOutcome::Replaced(id) => {
                log::debug!("Queued {} for {}", job_type, relative_path);
                self.events.emit(SyncEvent::TaskEnqueued {
                    task_id: id.clone(),
                    relative_path,
                    job_type,
                });
            }
            ScheduleOutcome::Dropped { .. } => {}
        }

        self.tracker.set_pending(self.queue.pending_count().await?);
        Ok(outcome)
    }

    /// Creates the remote record of a new item
    pub async fn schedule_upload(&self, item: ItemMetadata) -> SyncResult<ScheduleOutcome> {
        let path = item.relative_path.clone();
        self.schedule(SyncTask::new(path, TaskPayload::Upload(item))).await
    }

    pub async fn schedule_update(
        &self,
        path: RelativePath,
        update: MetadataUpdate,
    ) -> SyncResult<ScheduleOutcome> {
        self.schedule(SyncTask::new(path, TaskPayload::Update(update)))
            .await
    }

    pub async fn schedule_move(
        &self,
        origin: RelativePath,
        destination: RelativePath,
    ) -> SyncResult<ScheduleOutcome> {
        let task = SyncTask::new(
            origin.clone(),
            TaskPayload::Move(MoveParams {
                origin,
                destination,
            }),
        );
        self.schedule(task).await
    }

    pub async fn schedule_rename_folder(
        &self,
        path: RelativePath,
        name: impl Into<String>,
    ) -> SyncResult<ScheduleOutcome> {
        let task = SyncTask::new(path, TaskPayload::RenameFolder(RenameParams { name: name.into() }));
        self.schedule(task).await
    }

    /// Removes the remote item; `shallow` keeps its descendants' remote files
    pub async fn schedule_delete(
        &self,
        path: RelativePath,
        shallow: bool,
    ) -> SyncResult<ScheduleOutcome> {
        let payload = if shallow {
            TaskPayload::ShallowDelete
        } else {
            TaskPayload::Delete
        };
        self.schedule(SyncTask::new(path, payload)).await
    }

    pub async fn schedule_set_bookmark(
        &self,
        path: RelativePath,
        time: f64,
        note: Option<String>,
    ) -> SyncResult<ScheduleOutcome> {
        let task = SyncTask::new(path, TaskPayload::SetBookmark(BookmarkParams { time, note }));
        self.schedule(task).await
    }

    pub async fn schedule_delete_bookmark(
        &self,
        path: RelativePath,
        time: f64,
    ) -> SyncResult<ScheduleOutcome> {
        let task = SyncTask::new(path, TaskPayload::DeleteBookmark(BookmarkRef { time }));
        self.schedule(task).await
    }

    /// Uploads the image at `image_path` as the item's artwork
    pub async fn schedule_upload_artwork(
        &self,
        path: RelativePath,
        image_path: PathBuf,
    ) -> SyncResult<ScheduleOutcome> {
        let task = SyncTask::new(path, TaskPayload::UploadArtwork(ArtworkParams { image_path }));
        self.schedule(task).await
    }

    /// Replays pending tasks now
    pub async fn drain(&self) -> SyncResult<DrainReport> {
        let cancel = self.drain_token()?;
        self.drain_with(&cancel).await
    }

    pub(crate) async fn drain_with(&self, cancel: &CancellationToken) -> SyncResult<DrainReport> {
        self.executor.run(cancel).await
    }

    pub(crate) fn drain_token(&self) -> SyncResult<CancellationToken> {
        self.drain_cancel
            .lock()
            .map(|token| token.clone())
            .map_err(|_| SyncError::lock_poisoned("drain token"))
    }

    /// Starts background draining every `drain_interval`
    pub fn start_scheduler(self: &Arc<Self>) -> SyncScheduler {
        SyncScheduler::start(Arc::clone(self), self.config.drain_interval)
    }

    /// Stops running drains after their current task and aborts every download
    ///
    /// Queued tasks stay queued.
    pub fn cancel_all(&self) -> SyncResult<()> {
        {
            let mut token = self
                .drain_cancel
                .lock()
                .map_err(|_| SyncError::lock_poisoned("drain token"))?;
            token.cancel();
            *token = CancellationToken::new();
        }

        let downloads = self.downloads.cancel_all()?;
        log::info!("Cancelled sync activity ({} download(s))", downloads);
        Ok(())
    }

    /// Drops every pending task without replaying it
    pub async fn cancel_all_jobs(&self) -> SyncResult<()> {
        self.queue.clear().await?;
        self.tracker.set_pending(0);
        log::info!("Cleared the sync queue");
        Ok(())
    }

    pub async fn pending_tasks(&self) -> SyncResult<Vec<SyncTask>> {
        self.queue.all_tasks().await
    }

    pub async fn pending_count(&self) -> SyncResult<usize> {
        self.queue.pending_count().await
    }

    /// Publishes the stored queue length; call once after opening a persisted store
    pub async fn refresh_state(&self) -> SyncResult<SyncState> {
        self.tracker.set_pending(self.queue.pending_count().await?);
        Ok(self.tracker.state())
    }

    pub fn state(&self) -> SyncState {
        self.tracker.state()
    }

    /// Stream of `(pending tasks, last error, ...)` snapshots
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.tracker.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn recent_errors(&self) -> SyncResult<Vec<ErrorRecord>> {
        self.tracker.recent_errors()
    }

    pub fn downloads(&self) -> &DownloadManager {
        &self.downloads
    }

    /// Whether a listing sync of `path` (root when `None`) is due
    pub fn can_sync_list_contents(
        &self,
        path: Option<&RelativePath>,
        ignore_last_timestamp: bool,
    ) -> bool {
        if ignore_last_timestamp || self.config.list_sync_interval.is_zero() {
            return true;
        }

        match self.list_syncs.lock() {
            Ok(syncs) => syncs
                .get(&path.cloned())
                .is_none_or(|last| last.elapsed() >= self.config.list_sync_interval),
            Err(_) => true,
        }
    }

    /// Pulls the remote listing of a level and reconciles the last played item
    pub async fn sync_list_contents(&self, path: Option<&RelativePath>) -> SyncResult<ListingSync> {
        let listing = with_timeout(
            self.config.executor.request_timeout,
            self.api.list_contents(path),
        )
        .await
        .map_err(NetworkError::from)??;

        if let Ok(mut syncs) = self.list_syncs.lock() {
            syncs.insert(path.cloned(), Instant::now());
        }

        let pending = self.queue.all_tasks().await?;
        let items: Vec<ItemMetadata> = listing
            .items
            .into_iter()
            .filter(|item| !pending.iter().any(|task| hides(task, &item.relative_path)))
            .collect();

        let outcome = self.reconcile_last_played(listing.last_played.as_ref()).await?;

        Ok(ListingSync {
            items,
            last_played: listing.last_played,
            outcome,
        })
    }

    async fn reconcile_last_played(
        &self,
        remote: Option<&ItemMetadata>,
    ) -> SyncResult<ConflictOutcome> {
        let is_playing = self.player.is_playing();
        // The item on the player wins over the library's pointer while playing
        let local_path = match self.player.current_item_path().filter(|_| is_playing) {
            Some(path) => Some(path),
            None => self.library.last_played_path().await?,
        };
        let local = match local_path {
            Some(path) => self.library.get_item(&path).await?,
            None => None,
        };

        let resolution = self
            .resolver
            .resolve(local.as_ref(), remote, is_playing, Timestamp::now());

        if let Some(task) = resolution.local_update {
            self.schedule(task).await?;
        }

        let outcome = match resolution.outcome {
            ConflictOutcome::ReloadLastBook(path) if is_playing => {
                log::info!("Remote progress for {} differs, reload deferred until playback stops", path);
                self.set_deferred_reload(remote.cloned())?;
                ConflictOutcome::NoConflict
            }
            outcome => {
                if !is_playing {
                    self.set_deferred_reload(None)?;
                }
                outcome
            }
        };

        if outcome.is_conflict() {
            log::info!("Last played conflict: {:?}", outcome);
            self.events.emit(SyncEvent::ConflictDetected(outcome.clone()));
        }
        Ok(outcome)
    }

    fn set_deferred_reload(&self, item: Option<ItemMetadata>) -> SyncResult<()> {
        let mut deferred = self
            .deferred_reload
            .lock()
            .map_err(|_| SyncError::lock_poisoned("deferred reload"))?;
        *deferred = item;
        Ok(())
    }

    /// Hands over a reload parked while playing, once playback has stopped
    ///
    /// Returns the remote snapshot to reload the last played item from.
    pub fn take_deferred_reload(&self) -> SyncResult<Option<ItemMetadata>> {
        if self.player.is_playing() {
            return Ok(None);
        }

        let item = self
            .deferred_reload
            .lock()
            .map_err(|_| SyncError::lock_poisoned("deferred reload"))?
            .take();

        if let Some(item) = &item {
            self.events.emit(SyncEvent::ConflictDetected(
                ConflictOutcome::ReloadLastBook(item.relative_path.clone()),
            ));
        }
        Ok(item)
    }
}

/// Whether a pending task means the remote copy of `path` is about to go away
fn hides(task: &SyncTask, path: &RelativePath) -> bool {
    match task.job_type() {
        JobType::ShallowDelete => &task.relative_path == path,
        JobType::Delete | JobType::Move | JobType::RenameFolder => {
            &task.relative_path == path || task.relative_path.is_ancestor_of(path)
        }
        _ => false,
    }
}
