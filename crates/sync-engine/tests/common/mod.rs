// crates/sync-engine/tests/common/mod.rs
//! In-process collaborators for engine tests
#![allow(dead_code)]

use async_trait::async_trait;
use bookplayer_core::{
    BookmarkParams, ItemMetadata, ItemType, MetadataUpdate, RelativePath, TaskStore,
};
use bookplayer_network::{
    ByteProgress, CancellationToken, ContentListing, FileDownloader, NetworkError,
    NetworkResult, RemoteApi, RemoteFile,
};
use bookplayer_sync_engine::{
    EngineConfig, LibraryStore, Player, RemoteUpdate, SyncEngine, SyncEvent,
};
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub fn path(s: &str) -> RelativePath {
    RelativePath::new(s).unwrap()
}

pub fn book(s: &str, current_time: f64) -> ItemMetadata {
    let mut item = ItemMetadata::new(path(s), s, ItemType::Book);
    item.current_time = current_time;
    item.duration = 100.0;
    item
}

pub fn progress(current_time: f64) -> MetadataUpdate {
    MetadataUpdate {
        current_time: Some(current_time),
        ..Default::default()
    }
}

fn not_found() -> NetworkError {
    NetworkError::Status {
        status: 404,
        message: "not found".to_string(),
    }
}

/// Remote API recording every call, with scripted failures and latency
#[derive(Default)]
pub struct StubApi {
    calls: Mutex<Vec<String>>,
    updates: Mutex<Vec<(RelativePath, MetadataUpdate)>>,
    failures: Mutex<HashMap<String, VecDeque<u16>>>,
    listing: Mutex<ContentListing>,
    files: Mutex<HashMap<RelativePath, Vec<RemoteFile>>>,
    in_flight: Mutex<HashSet<RelativePath>>,
    overlapped: AtomicBool,
    delay: Mutex<Duration>,
}

impl StubApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the next `op` call for `path` fail with `status`
    pub fn fail_next(&self, op: &str, path: &str, status: u16) {
        self.failures
            .lock()
            .unwrap()
            .entry(format!("{} {}", op, path))
            .or_default()
            .push_back(status);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn set_listing(&self, listing: ContentListing) {
        *self.listing.lock().unwrap() = listing;
    }

    /// Serves `files` for `item`, each file's content being its own url
    pub fn set_files(&self, item: &str, files: &[&str]) {
        let files = files
            .iter()
            .map(|file| RemoteFile {
                relative_path: path(file),
                url: format!("stub://{}", file),
                size: Some(format!("stub://{}", file).len() as u64),
            })
            .collect();
        self.files.lock().unwrap().insert(path(item), files);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn updates(&self) -> Vec<(RelativePath, MetadataUpdate)> {
        self.updates.lock().unwrap().clone()
    }

    /// True if two calls for one path were ever in flight together
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    async fn call(&self, op: &str, path: &RelativePath) -> NetworkResult<()> {
        if !self.in_flight.lock().unwrap().insert(path.clone()) {
            self.overlapped.store(true, Ordering::SeqCst);
        }

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.lock().unwrap().remove(path);
        self.calls.lock().unwrap().push(format!("{} {}", op, path));

        let scripted = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&format!("{} {}", op, path))
            .and_then(|statuses| statuses.pop_front());
        match scripted {
            Some(status) => Err(NetworkError::Status {
                status,
                message: format!("scripted {}", status),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteApi for StubApi {
    async fn list_contents(&self, _path: Option<&RelativePath>) -> NetworkResult<ContentListing> {
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn upload_item(&self, item: &ItemMetadata) -> NetworkResult<()> {
        self.call("upload", &item.relative_path).await
    }

    async fn update_item(&self, path: &RelativePath, update: &MetadataUpdate) -> NetworkResult<()> {
        self.call("update", path).await?;
        self.updates
            .lock()
            .unwrap()
            .push((path.clone(), update.clone()));
        Ok(())
    }

    async fn move_item(
        &self,
        origin: &RelativePath,
        destination: &RelativePath,
    ) -> NetworkResult<()> {
        self.call(&format!("move->{}", destination), origin).await
    }

    async fn delete_item(&self, path: &RelativePath, shallow: bool) -> NetworkResult<()> {
        let op = if shallow { "shallowDelete" } else { "delete" };
        self.call(op, path).await
    }

    async fn set_bookmark(
        &self,
        path: &RelativePath,
        bookmark: &BookmarkParams,
    ) -> NetworkResult<()> {
        self.call(&format!("setBookmark@{}", bookmark.time), path).await
    }

    async fn delete_bookmark(&self, path: &RelativePath, time: f64) -> NetworkResult<()> {
        self.call(&format!("deleteBookmark@{}", time), path).await
    }

    async fn upload_artwork(&self, path: &RelativePath, image: Bytes) -> NetworkResult<String> {
        self.call("uploadArtwork", path).await?;
        Ok(format!("https://cdn.example.com/{}/{}", path, image.len()))
    }

    async fn remote_files(&self, path: &RelativePath) -> NetworkResult<Vec<RemoteFile>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(not_found)
    }
}

/// Downloader writing each url as the file's content
#[derive(Default)]
pub struct StubDownloader {
    delay: Mutex<Duration>,
    failing: Mutex<HashSet<String>>,
    ignore_cancel: AtomicBool,
}

impl StubDownloader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Finishes every transfer even after its token fired, as a slow transport would
    pub fn ignore_cancel(&self) {
        self.ignore_cancel.store(true, Ordering::SeqCst);
    }

    /// Makes transfers of `file` fail with a server error
    pub fn fail(&self, file: &str) {
        self.failing
            .lock()
            .unwrap()
            .insert(format!("stub://{}", file));
    }
}

#[async_trait]
impl FileDownloader for StubDownloader {
    async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        cancel: &CancellationToken,
        progress: ByteProgress<'_>,
    ) -> NetworkResult<u64> {
        let delay = *self.delay.lock().unwrap();
        if self.ignore_cancel.load(Ordering::SeqCst) {
            tokio::time::sleep(delay).await;
        } else {
            tokio::select! {
                _ = cancel.cancelled() => return Err(NetworkError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        if self.failing.lock().unwrap().contains(url) {
            return Err(NetworkError::Status {
                status: 500,
                message: "scripted".to_string(),
            });
        }

        let body = url.as_bytes();
        progress(body.len() as u64 / 2);
        tokio::fs::write(destination, body).await?;
        progress(body.len() as u64);
        Ok(body.len() as u64)
    }
}

/// Library keeping items and every remote-confirmed change in memory
#[derive(Default)]
pub struct StubLibrary {
    items: Mutex<HashMap<RelativePath, ItemMetadata>>,
    applied: Mutex<Vec<(RelativePath, RemoteUpdate)>>,
    downloaded: Mutex<HashMap<RelativePath, bool>>,
    last_played: Mutex<Option<RelativePath>>,
    children: Mutex<HashMap<RelativePath, Vec<RelativePath>>>,
}

impl StubLibrary {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, item: ItemMetadata) {
        self.items
            .lock()
            .unwrap()
            .insert(item.relative_path.clone(), item);
    }

    pub fn set_last_played(&self, item: ItemMetadata) {
        *self.last_played.lock().unwrap() = Some(item.relative_path.clone());
        self.insert(item);
    }

    pub fn set_children(&self, container: &str, children: &[&str]) {
        self.children
            .lock()
            .unwrap()
            .insert(path(container), children.iter().map(|c| path(c)).collect());
    }

    pub fn applied(&self) -> Vec<(RelativePath, RemoteUpdate)> {
        self.applied.lock().unwrap().clone()
    }

    pub fn is_downloaded(&self, item: &str) -> Option<bool> {
        self.downloaded.lock().unwrap().get(&path(item)).copied()
    }
}

#[async_trait]
impl LibraryStore for StubLibrary {
    async fn get_item(&self, path: &RelativePath) -> bookplayer_core::Result<Option<ItemMetadata>> {
        Ok(self.items.lock().unwrap().get(path).cloned())
    }

    async fn apply_remote_update(
        &self,
        path: &RelativePath,
        update: RemoteUpdate,
    ) -> bookplayer_core::Result<()> {
        self.applied.lock().unwrap().push((path.clone(), update));
        Ok(())
    }

    async fn mark_downloaded(
        &self,
        path: &RelativePath,
        downloaded: bool,
    ) -> bookplayer_core::Result<()> {
        self.downloaded
            .lock()
            .unwrap()
            .insert(path.clone(), downloaded);
        Ok(())
    }

    async fn last_played_path(&self) -> bookplayer_core::Result<Option<RelativePath>> {
        Ok(self.last_played.lock().unwrap().clone())
    }

    async fn child_paths(&self, path: &RelativePath) -> bookplayer_core::Result<Vec<RelativePath>> {
        Ok(self
            .children
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct StubPlayer {
    playing: AtomicBool,
    current: Mutex<Option<RelativePath>>,
}

impl StubPlayer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }

    /// Loads `item` into the player without touching the library's pointer
    pub fn set_current(&self, item: Option<&str>) {
        *self.current.lock().unwrap() = item.map(path);
    }
}

impl Player for StubPlayer {
    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn current_item_path(&self) -> Option<RelativePath> {
        self.current.lock().unwrap().clone()
    }
}

/// Engine over stubs plus handles to inspect them
pub struct Harness {
    pub engine: Arc<SyncEngine>,
    pub api: Arc<StubApi>,
    pub downloader: Arc<StubDownloader>,
    pub library: Arc<StubLibrary>,
    pub player: Arc<StubPlayer>,
}

impl Harness {
    pub fn new(store: Arc<dyn TaskStore>, root: PathBuf) -> Self {
        Self::with_config(store, config(root))
    }

    pub fn with_config(store: Arc<dyn TaskStore>, config: EngineConfig) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let api = StubApi::new();
        let downloader = StubDownloader::new();
        let library = StubLibrary::new();
        let player = StubPlayer::new();
        let engine = SyncEngine::new(
            config,
            store,
            api.clone(),
            downloader.clone(),
            library.clone(),
            player.clone(),
        );

        Self {
            engine: Arc::new(engine),
            api,
            downloader,
            library,
            player,
        }
    }

    /// A second engine over `store` sharing this harness's stubs, as after an app restart
    pub fn restart(&self, store: Arc<dyn TaskStore>) -> Arc<SyncEngine> {
        Arc::new(SyncEngine::new(
            self.engine.config().clone(),
            store,
            self.api.clone(),
            self.downloader.clone(),
            self.library.clone(),
            self.player.clone(),
        ))
    }
}

pub fn config(root: PathBuf) -> EngineConfig {
    EngineConfig {
        downloads_dir: root,
        ..EngineConfig::default()
    }
}

/// Events received so far
pub fn drain_events(events: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    received
}

/// Polls `check` until it holds or a second passes
pub async fn eventually<F>(mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
