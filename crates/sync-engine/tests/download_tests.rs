// crates/sync-engine/tests/download_tests.rs
//! Integration tests for the download manager

mod common;

use bookplayer_core::MemoryTaskStore;
use bookplayer_sync_engine::{DownloadState, SyncError, SyncEvent};
use common::{drain_events, eventually, path, Harness};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn harness() -> (Harness, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let harness = Harness::new(Arc::new(MemoryTaskStore::new()), dir.path().to_path_buf());
    (harness, dir)
}

#[tokio::test]
async fn test_folder_download_completes_every_file() {
    let (harness, dir) = harness();
    harness
        .api
        .set_files("folder", &["folder/01.mp3", "folder/02.mp3"]);
    let downloads = harness.engine.downloads();
    let mut events = harness.engine.subscribe_events();

    assert_eq!(
        downloads.download_state(&path("folder")),
        DownloadState::NotDownloaded
    );
    downloads.download_remote_files(&path("folder")).await.unwrap();

    assert!(downloads.download_state(&path("folder")).is_downloaded());
    assert!(downloads
        .download_state(&path("folder/01.mp3"))
        .is_downloaded());
    let content = std::fs::read_to_string(dir.path().join("folder").join("02.mp3")).unwrap();
    assert_eq!(content, "stub://folder/02.mp3");
    assert_eq!(harness.library.is_downloaded("folder"), Some(true));

    let events = drain_events(&mut events);
    let completed: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            SyncEvent::DownloadCompleted(done) => Some(done),
            _ => None,
        })
        .collect();
    assert_eq!(completed.len(), 2);
    assert!(completed.iter().all(|done| done.initiating_path == path("folder")
        && done.parent_path == Some(path("folder"))));

    let progress: Vec<f64> = events
        .iter()
        .filter_map(|event| match event {
            SyncEvent::DownloadProgress { progress, .. } => Some(*progress),
            _ => None,
        })
        .collect();
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|pair| pair[0] < pair[1]));
    assert!(progress.iter().all(|p| *p <= 1.0));
}

#[tokio::test]
async fn test_single_book_download() {
    let (harness, dir) = harness();
    harness.api.set_files("book.m4b", &["book.m4b"]);
    let downloads = harness.engine.downloads();

    let mut state = downloads.subscribe(&path("book.m4b")).unwrap();
    assert_eq!(*state.borrow(), DownloadState::NotDownloaded);

    downloads
        .download_remote_files(&path("book.m4b"))
        .await
        .unwrap();
    assert!(dir.path().join("book.m4b").is_file());
    assert!(state.borrow_and_update().is_downloaded());
}

#[tokio::test]
async fn test_container_promoted_when_all_children_local() {
    let (harness, dir) = harness();
    std::fs::create_dir_all(dir.path().join("shelf")).unwrap();
    std::fs::write(dir.path().join("shelf").join("a.mp3"), b"a").unwrap();
    harness
        .library
        .set_children("shelf", &["shelf/a.mp3", "shelf/b.mp3"]);
    harness.api.set_files("shelf/b.mp3", &["shelf/b.mp3"]);

    let downloads = harness.engine.downloads();
    downloads
        .download_remote_files(&path("shelf/b.mp3"))
        .await
        .unwrap();

    assert!(downloads.download_state(&path("shelf")).is_downloaded());
    assert_eq!(harness.library.is_downloaded("shelf"), Some(true));
}

#[tokio::test]
async fn test_container_not_promoted_with_missing_child() {
    let (harness, _dir) = harness();
    harness
        .library
        .set_children("shelf", &["shelf/a.mp3", "shelf/b.mp3"]);
    harness.api.set_files("shelf/b.mp3", &["shelf/b.mp3"]);

    let downloads = harness.engine.downloads();
    downloads
        .download_remote_files(&path("shelf/b.mp3"))
        .await
        .unwrap();

    assert!(downloads.download_state(&path("shelf/b.mp3")).is_downloaded());
    assert_eq!(harness.library.is_downloaded("shelf"), None);
}

#[tokio::test]
async fn test_cancellation_wins_over_completion() {
    let (harness, dir) = harness();
    harness.api.set_files("slow", &["slow/01.mp3", "slow/02.mp3"]);
    harness.downloader.set_delay(Duration::from_millis(200));
    let mut events = harness.engine.subscribe_events();

    let engine = harness.engine.clone();
    let transfer =
        tokio::spawn(async move { engine.downloads().download_remote_files(&path("slow")).await });

    let downloads = harness.engine.downloads();
    assert!(eventually(|| downloads.download_state(&path("slow")).is_downloading()).await);
    assert!(downloads.cancel_download(&path("slow")).unwrap());
    assert_eq!(
        downloads.download_state(&path("slow")),
        DownloadState::NotDownloaded
    );

    let result = transfer.await.unwrap();
    assert!(matches!(result, Err(SyncError::Cancelled)));
    assert_eq!(
        downloads.download_state(&path("slow")),
        DownloadState::NotDownloaded
    );
    assert!(!dir.path().join("slow").join("01.mp3").exists());

    let events = drain_events(&mut events);
    assert!(events
        .iter()
        .any(|event| matches!(event, SyncEvent::DownloadCancelled { .. })));
    assert!(!events
        .iter()
        .any(|event| matches!(event, SyncEvent::DownloadCompleted(_))));

    // Nothing to cancel any more
    assert!(!downloads.cancel_download(&path("slow")).unwrap());
}

#[tokio::test]
async fn test_late_progress_after_cancel_is_discarded() {
    let (harness, dir) = harness();
    harness.api.set_files("slow", &["slow/01.mp3"]);
    harness.downloader.set_delay(Duration::from_millis(150));
    harness.downloader.ignore_cancel();

    let engine = harness.engine.clone();
    let transfer =
        tokio::spawn(async move { engine.downloads().download_remote_files(&path("slow")).await });

    let downloads = harness.engine.downloads();
    assert!(eventually(|| downloads.download_state(&path("slow")).is_downloading()).await);
    let mut events = harness.engine.subscribe_events();
    assert!(downloads.cancel_download(&path("slow")).unwrap());

    // The transfer reports progress and writes its file after the cancel
    let result = transfer.await.unwrap();
    assert!(matches!(result, Err(SyncError::Cancelled)));
    assert_eq!(
        downloads.download_state(&path("slow")),
        DownloadState::NotDownloaded
    );
    assert!(!dir.path().join("slow").join("01.mp3").exists());
    assert_eq!(harness.library.is_downloaded("slow"), None);

    let events = drain_events(&mut events);
    assert!(events
        .iter()
        .any(|event| matches!(event, SyncEvent::DownloadCancelled { .. })));
    assert!(!events.iter().any(|event| matches!(
        event,
        SyncEvent::DownloadProgress { .. } | SyncEvent::DownloadCompleted(_)
    )));
}

#[tokio::test]
async fn test_cancel_all_through_engine() {
    let (harness, _dir) = harness();
    harness.api.set_files("a", &["a/1.mp3"]);
    harness.api.set_files("b", &["b/1.mp3"]);
    harness.downloader.set_delay(Duration::from_millis(200));

    let mut transfers = Vec::new();
    for item in ["a", "b"] {
        let engine = harness.engine.clone();
        transfers.push(tokio::spawn(async move {
            engine.downloads().download_remote_files(&path(item)).await
        }));
    }

    let downloads = harness.engine.downloads();
    assert!(eventually(|| downloads.active_downloads().unwrap().len() == 2).await);
    harness.engine.cancel_all().unwrap();

    for transfer in transfers {
        assert!(matches!(transfer.await.unwrap(), Err(SyncError::Cancelled)));
    }
    assert!(downloads.active_downloads().unwrap().is_empty());
}

#[tokio::test]
async fn test_overlapping_download_is_rejected() {
    let (harness, _dir) = harness();
    harness.api.set_files("folder", &["folder/01.mp3"]);
    harness.downloader.set_delay(Duration::from_millis(100));

    let engine = harness.engine.clone();
    let transfer =
        tokio::spawn(async move { engine.downloads().download_remote_files(&path("folder")).await });

    let downloads = harness.engine.downloads();
    assert!(eventually(|| downloads.download_state(&path("folder")).is_downloading()).await);
    let second = downloads.download_remote_files(&path("folder/01.mp3")).await;
    assert!(matches!(second, Err(SyncError::DownloadInProgress(_))));

    transfer.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_failed_file_fails_the_item() {
    let (harness, dir) = harness();
    harness
        .api
        .set_files("folder", &["folder/good.mp3", "folder/bad.mp3"]);
    harness.downloader.fail("folder/bad.mp3");
    let mut events = harness.engine.subscribe_events();

    let downloads = harness.engine.downloads();
    let result = downloads.download_remote_files(&path("folder")).await;
    assert!(matches!(result, Err(SyncError::Network(_))));

    assert_eq!(
        downloads.download_state(&path("folder")),
        DownloadState::NotDownloaded
    );
    assert!(!dir.path().join("folder").join("good.mp3").exists());
    assert!(drain_events(&mut events)
        .iter()
        .any(|event| matches!(event, SyncEvent::DownloadFailed { .. })));
    assert_eq!(harness.library.is_downloaded("folder"), None);
}

#[tokio::test]
async fn test_unknown_remote_item_fails() {
    let (harness, _dir) = harness();
    let downloads = harness.engine.downloads();

    let result = downloads.download_remote_files(&path("nowhere")).await;
    assert!(result.unwrap_err().is_not_found());
    assert_eq!(
        downloads.download_state(&path("nowhere")),
        DownloadState::NotDownloaded
    );
}

#[tokio::test]
async fn test_offload_folder_keeps_placeholder() {
    let (harness, dir) = harness();
    harness.library.set_children("shelf", &["shelf/folder"]);
    harness
        .api
        .set_files("shelf/folder", &["shelf/folder/01.mp3", "shelf/folder/02.mp3"]);
    let downloads = harness.engine.downloads();
    downloads
        .download_remote_files(&path("shelf/folder"))
        .await
        .unwrap();
    assert!(downloads.download_state(&path("shelf")).is_downloaded());

    let mut events = harness.engine.subscribe_events();
    downloads.offload_item(&path("shelf/folder")).await.unwrap();

    let folder = dir.path().join("shelf").join("folder");
    assert!(folder.is_dir());
    assert_eq!(std::fs::read_dir(&folder).unwrap().count(), 0);
    for item in ["shelf", "shelf/folder", "shelf/folder/01.mp3"] {
        assert_eq!(
            downloads.download_state(&path(item)),
            DownloadState::NotDownloaded,
            "{} should be offloaded",
            item
        );
    }
    assert_eq!(harness.library.is_downloaded("shelf/folder"), Some(false));
    assert_eq!(harness.library.is_downloaded("shelf"), Some(false));
    assert!(drain_events(&mut events)
        .iter()
        .any(|event| matches!(event, SyncEvent::ItemOffloaded { .. })));
}

#[tokio::test]
async fn test_offload_book_removes_file() {
    let (harness, dir) = harness();
    harness.api.set_files("book.mp3", &["book.mp3"]);
    let downloads = harness.engine.downloads();
    downloads
        .download_remote_files(&path("book.mp3"))
        .await
        .unwrap();

    downloads.offload_item(&path("book.mp3")).await.unwrap();
    assert!(!dir.path().join("book.mp3").exists());
    assert_eq!(harness.library.is_downloaded("book.mp3"), Some(false));
}

#[tokio::test]
async fn test_state_refreshed_from_disk() {
    let (harness, dir) = harness();
    let downloads = harness.engine.downloads();
    let items = [path("present.mp3"), path("partial"), path("absent.mp3")];

    downloads.refresh_from_disk(&items).unwrap();
    assert!(items
        .iter()
        .all(|item| downloads.download_state(item) == DownloadState::NotDownloaded));

    std::fs::write(dir.path().join("present.mp3"), b"bytes").unwrap();
    std::fs::create_dir_all(dir.path().join("partial")).unwrap();
    std::fs::write(dir.path().join("partial").join("01.mp3.part"), b"by").unwrap();

    downloads.refresh_from_disk(&items).unwrap();
    assert!(downloads.download_state(&items[0]).is_downloaded());
    assert_eq!(downloads.download_state(&items[1]), DownloadState::NotDownloaded);
    assert_eq!(downloads.download_state(&items[2]), DownloadState::NotDownloaded);
}
