// crates/sync-engine/examples/sync_demo.rs
//! Demonstration of sync engine capabilities
//!
//! Runs against an in-process remote; set `RUST_LOG=debug` to watch the engine.
//! Settings come from a `config.toml` written into a scratch config directory,
//! so `BOOKPLAYER_*` environment overrides apply as they would in the app.

use async_trait::async_trait;
use bookplayer_config::ConfigManager;
use bookplayer_core::{
    BookmarkParams, ItemMetadata, ItemType, MemoryTaskStore, MetadataUpdate, RelativePath, Result,
};
use bookplayer_network::{
    ByteProgress, CancellationToken, ContentListing, FileDownloader, NetworkResult, RemoteApi,
    RemoteFile,
};
use bookplayer_sync_engine::{
    EngineConfig, LibraryStore, Player, RemoteUpdate, SyncEngine, SyncEvent,
};
use bytes::Bytes;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Remote that prints every request it receives
#[derive(Default)]
struct ConsoleRemote {
    last_played: Mutex<Option<ItemMetadata>>,
}

impl ConsoleRemote {
    fn log(&self, request: String) -> NetworkResult<()> {
        println!("  → remote: {}", request);
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for ConsoleRemote {
    async fn list_contents(&self, _path: Option<&RelativePath>) -> NetworkResult<ContentListing> {
        let last_played = self.last_played.lock().ok().and_then(|item| item.clone());
        Ok(ContentListing {
            items: last_played.iter().cloned().collect(),
            last_played,
        })
    }

    async fn upload_item(&self, item: &ItemMetadata) -> NetworkResult<()> {
        self.log(format!("upload {}", item.relative_path))
    }

    async fn update_item(&self, path: &RelativePath, update: &MetadataUpdate) -> NetworkResult<()> {
        self.log(format!("update {} at {:?}s", path, update.current_time))
    }

    async fn move_item(&self, origin: &RelativePath, destination: &RelativePath) -> NetworkResult<()> {
        self.log(format!("move {} to {}", origin, destination))
    }

    async fn delete_item(&self, path: &RelativePath, shallow: bool) -> NetworkResult<()> {
        self.log(format!("delete {} (shallow: {})", path, shallow))
    }

    async fn set_bookmark(&self, path: &RelativePath, bookmark: &BookmarkParams) -> NetworkResult<()> {
        self.log(format!("bookmark {} at {}s", path, bookmark.time))
    }

    async fn delete_bookmark(&self, path: &RelativePath, time: f64) -> NetworkResult<()> {
        self.log(format!("remove bookmark {} at {}s", path, time))
    }

    async fn upload_artwork(&self, path: &RelativePath, image: Bytes) -> NetworkResult<String> {
        self.log(format!("artwork for {} ({} bytes)", path, image.len()))?;
        Ok(format!("https://cdn.example.com/{}", path))
    }

    async fn remote_files(&self, path: &RelativePath) -> NetworkResult<Vec<RemoteFile>> {
        Ok(vec![RemoteFile {
            relative_path: path.clone(),
            url: format!("memory://{}", path),
            size: Some(1024),
        }])
    }
}

struct MemoryDownloader;

#[async_trait]
impl FileDownloader for MemoryDownloader {
    async fn fetch(
        &self,
        _url: &str,
        destination: &Path,
        _cancel: &CancellationToken,
        progress: ByteProgress<'_>,
    ) -> NetworkResult<u64> {
        let body = vec![0u8; 1024];
        for chunk in 1..=4 {
            progress(chunk * 256);
        }
        tokio::fs::write(destination, &body).await?;
        Ok(body.len() as u64)
    }
}

#[derive(Default)]
struct DemoLibrary {
    last_played: Mutex<Option<ItemMetadata>>,
}

#[async_trait]
impl LibraryStore for DemoLibrary {
    async fn get_item(&self, path: &RelativePath) -> Result<Option<ItemMetadata>> {
        Ok(self
            .last_played
            .lock()
            .ok()
            .and_then(|item| item.clone())
            .filter(|item| &item.relative_path == path))
    }

    async fn apply_remote_update(&self, path: &RelativePath, update: RemoteUpdate) -> Result<()> {
        println!("  ← library: {} now {:?}", path, update);
        Ok(())
    }

    async fn mark_downloaded(&self, path: &RelativePath, downloaded: bool) -> Result<()> {
        println!("  ← library: {} downloaded = {}", path, downloaded);
        Ok(())
    }

    async fn last_played_path(&self) -> Result<Option<RelativePath>> {
        Ok(self
            .last_played
            .lock()
            .ok()
            .and_then(|item| item.as_ref().map(|item| item.relative_path.clone())))
    }

    async fn child_paths(&self, _path: &RelativePath) -> Result<Vec<RelativePath>> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct DemoPlayer {
    playing: AtomicBool,
}

impl Player for DemoPlayer {
    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn current_item_path(&self) -> Option<RelativePath> {
        None
    }
}

fn book(path: &str, current_time: f64) -> std::result::Result<ItemMetadata, Box<dyn std::error::Error>> {
    let mut item = ItemMetadata::new(RelativePath::new(path)?, path, ItemType::Book);
    item.current_time = current_time;
    item.duration = 3600.0;
    Ok(item)
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("BookPlayer Sync Engine Demo");
    println!("===========================\n");

    let config_dir = tempfile::tempdir()?;
    let manager = ConfigManager::with_directory(config_dir.path().to_path_buf())?;
    manager.initialize()?;
    let config = manager.load_for_engine();
    println!("Config: {}", manager.config_path().display());
    println!("Library root: {}\n", config.downloads.downloads_dir.display());

    let remote = Arc::new(ConsoleRemote::default());
    let library = Arc::new(DemoLibrary::default());
    let player = Arc::new(DemoPlayer::default());

    let engine = SyncEngine::new(
        EngineConfig::from_config(&config),
        Arc::new(MemoryTaskStore::new()),
        remote.clone(),
        Arc::new(MemoryDownloader),
        library.clone(),
        player.clone(),
    );
    let mut events = engine.subscribe_events();

    println!("1. Offline edits");
    println!("----------------");
    let moby = RelativePath::new("Classics/Moby Dick.m4b")?;
    engine.schedule_upload(book("Classics/Moby Dick.m4b", 0.0)?).await?;
    for minute in 1..=5 {
        let update = MetadataUpdate {
            current_time: Some(f64::from(minute) * 60.0),
            ..Default::default()
        };
        engine.schedule_update(moby.clone(), update).await?;
    }
    engine.schedule_set_bookmark(moby.clone(), 120.0, Some("Call me Ishmael".to_string())).await?;
    engine.schedule_set_bookmark(moby.clone(), 240.0, None).await?;
    engine.schedule_delete_bookmark(moby.clone(), 240.0).await?;
    println!("  ✓ 9 edits recorded, {} task(s) queued", engine.pending_count().await?);

    println!("\n2. Replay");
    println!("---------");
    let report = engine.drain().await?;
    println!(
        "  ✓ {} committed, {} pending",
        report.committed,
        engine.pending_count().await?
    );
    println!("  State: {}", serde_json::to_string(&engine.state())?);

    println!("\n3. Last played conflict");
    println!("-----------------------");
    if let Ok(mut local) = library.last_played.lock() {
        *local = Some(book("Classics/Moby Dick.m4b", 300.0)?);
    }
    if let Ok(mut remote_played) = remote.last_played.lock() {
        *remote_played = Some(book("Classics/Moby Dick.m4b", 1800.0)?);
    }
    player.playing.store(true, Ordering::SeqCst);
    let listing = engine.sync_list_contents(None).await?;
    println!("  While playing: {:?}", listing.outcome);
    player.playing.store(false, Ordering::SeqCst);
    if let Some(remote_item) = engine.take_deferred_reload()? {
        println!("  ✓ Playback stopped, reload at {}s", remote_item.current_time);
    }

    println!("\n4. Downloads");
    println!("------------");
    engine.downloads().download_remote_files(&moby).await?;
    println!("  ✓ {:?}", engine.downloads().download_state(&moby));
    engine.downloads().offload_item(&moby).await?;
    println!("  ✓ Offloaded, now {:?}", engine.downloads().download_state(&moby));

    println!("\nEvents:");
    while let Ok(event) = events.try_recv() {
        match event {
            SyncEvent::DownloadProgress { .. } => {}
            event => println!("  • {:?}", event),
        }
    }

    Ok(())
}
