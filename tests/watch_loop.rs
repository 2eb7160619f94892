//! Integration tests for the processing loop and watcher service
//!
//! These run the loop against real temporary folders with a short
//! quiescence window and stop it through its cancellation token.

use loghopper::archive::{ArchiveConfig, ArchiveDestination, ArchiveMode, Archiver};
use loghopper::config::AppConfig;
use loghopper::ingest::{IngestPipeline, ReadPolicy};
use loghopper::parser::ParseOptions;
use loghopper::store::{MemoryStore, RecordStore};
use loghopper::versioning::VersionResolver;
use loghopper::watcher::{
    LoopSettings, ProcessingLoop, RunStats, StabilityTracker, WatcherService, WorkQueue,
};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const FAST: LoopSettings = LoopSettings {
    quiescence: Duration::from_millis(150),
    poll_interval: Duration::from_millis(10),
    error_backoff: Duration::from_millis(10),
    max_concurrent: 2,
};

fn pipeline(store: Arc<MemoryStore>, inbox: &Path, done: &Path, stats: Arc<RunStats>) -> IngestPipeline {
    let archive = ArchiveConfig {
        success: ArchiveDestination {
            root: Some(done.to_path_buf()),
            mode: ArchiveMode::Move,
            preserve_structure: false,
        },
        ..ArchiveConfig::default()
    };
    IngestPipeline::new(
        ParseOptions::default(),
        VersionResolver::new(store),
        Archiver::new(archive, inbox),
        ReadPolicy::default(),
        stats,
    )
}

fn fixture_bytes(name: &str) -> Vec<u8> {
    std::fs::read(PathBuf::from("testdata").join(name)).unwrap()
}

async fn wait_for_processed(stats: &RunStats, expected: u64) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while stats.snapshot().processed() < expected {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("timed out waiting for ingestions");
}

#[tokio::test]
async fn test_loop_ingests_queued_files() {
    let dir = TempDir::new().unwrap();
    let inbox = dir.path().join("in");
    let done = dir.path().join("done");
    std::fs::create_dir_all(&inbox).unwrap();

    let a = inbox.join("a.txt");
    let b = inbox.join("b.txt");
    std::fs::write(&a, fixture_bytes("SN123_pass.txt")).unwrap();
    std::fs::write(&b, fixture_bytes("SN777_pass.txt")).unwrap();

    let store = Arc::new(MemoryStore::new());
    let stats = Arc::new(RunStats::new());
    let processing = ProcessingLoop::new(
        WorkQueue::new(),
        Arc::new(StabilityTracker::new()),
        Arc::new(pipeline(Arc::clone(&store), &inbox, &done, Arc::clone(&stats))),
        FAST,
    );

    let queue = processing.queue_handle();
    queue.enqueue(a.clone());
    queue.enqueue(b.clone());
    // Redundant entries are harmless
    queue.enqueue(a.clone());
    // Paths that never existed are dropped
    queue.enqueue(inbox.join("ghost.txt"));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(processing.run(cancel.clone()));

    wait_for_processed(&stats, 2).await;
    cancel.cancel();
    let summary = handle.await.unwrap();

    assert_eq!(summary.inserted, 2);
    assert_eq!(summary.failed(), 0);
    assert_eq!(store.len().await, 2);
    assert!(done.join("a.txt").exists());
    assert!(done.join("b.txt").exists());
}

#[tokio::test]
async fn test_growing_file_waits_for_quiescence() {
    let dir = TempDir::new().unwrap();
    let inbox = dir.path().join("in");
    let done = dir.path().join("done");
    std::fs::create_dir_all(&inbox).unwrap();

    let content = fixture_bytes("SN123_pass.txt");
    let (head, tail) = content.split_at(content.len() / 2);
    let path = inbox.join("slow.txt");
    std::fs::write(&path, head).unwrap();

    let store = Arc::new(MemoryStore::new());
    let stats = Arc::new(RunStats::new());
    let processing = ProcessingLoop::new(
        WorkQueue::new(),
        Arc::new(StabilityTracker::new()),
        Arc::new(pipeline(Arc::clone(&store), &inbox, &done, Arc::clone(&stats))),
        LoopSettings {
            quiescence: Duration::from_millis(400),
            ..FAST
        },
    );
    processing.queue_handle().enqueue(path.clone());

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(processing.run(cancel.clone()));

    // Keep writing inside the window; a torn half-file must never be parsed.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(stats.snapshot().processed(), 0);
    {
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(tail).unwrap();
        file.flush().unwrap();
    }

    wait_for_processed(&stats, 1).await;
    cancel.cancel();
    let summary = handle.await.unwrap();

    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.format_errors, 0);
    let stored = store.load("SN123-20240315-140509").await.unwrap().unwrap();
    assert_eq!(stored.record.raw_text.as_bytes(), content.as_slice());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_key_files_never_both_insert() {
    let dir = TempDir::new().unwrap();
    let inbox = dir.path().join("in");
    let done = dir.path().join("done");
    std::fs::create_dir_all(&inbox).unwrap();

    let first = inbox.join("first.txt");
    let second = inbox.join("second.txt");
    std::fs::write(&first, fixture_bytes("SN123_pass.txt")).unwrap();
    std::fs::write(&second, fixture_bytes("SN123_retest.txt")).unwrap();

    let store = Arc::new(MemoryStore::new());
    let stats = Arc::new(RunStats::new());
    let processing = ProcessingLoop::new(
        WorkQueue::new(),
        Arc::new(StabilityTracker::new()),
        Arc::new(pipeline(Arc::clone(&store), &inbox, &done, Arc::clone(&stats))),
        FAST,
    );
    let queue = processing.queue_handle();
    queue.enqueue(first);
    queue.enqueue(second);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(processing.run(cancel.clone()));
    wait_for_processed(&stats, 2).await;
    cancel.cancel();
    let summary = handle.await.unwrap();

    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.updated, 1);
    let stored = store.load("SN123-20240315-140509").await.unwrap().unwrap();
    assert_eq!(stored.record.version, 2);
    assert_eq!(stored.record.superseded.len(), 1);
}

#[tokio::test]
async fn test_cancel_with_empty_queue_returns_promptly() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let stats = Arc::new(RunStats::new());
    let processing = ProcessingLoop::new(
        WorkQueue::new(),
        Arc::new(StabilityTracker::new()),
        Arc::new(pipeline(store, dir.path(), &dir.path().join("done"), stats)),
        LoopSettings {
            poll_interval: Duration::from_secs(60),
            ..FAST
        },
    );

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(processing.run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let summary = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("loop should stop without waiting out the poll interval")
        .unwrap();
    assert_eq!(summary.processed(), 0);
}

#[tokio::test]
async fn test_service_picks_up_existing_and_new_files() {
    let dir = TempDir::new().unwrap();
    let inbox = dir.path().join("in");
    let done = dir.path().join("done");
    let failed = dir.path().join("failed");
    std::fs::create_dir_all(&inbox).unwrap();

    // Present before start: found by the initial scan
    std::fs::write(inbox.join("a.txt"), fixture_bytes("SN123_pass.txt")).unwrap();
    std::fs::write(inbox.join("ignored.csv"), fixture_bytes("SN777_pass.txt")).unwrap();

    let mut config = AppConfig::default();
    config.watch.root = inbox.clone();
    config.watch.quiescence_ms = 150;
    config.watch.poll_interval_ms = 10;
    config.archive.success.root = Some(done.clone());
    config.archive.error.root = Some(failed.clone());

    let store = Arc::new(MemoryStore::new());
    let cancel = CancellationToken::new();
    let service = WatcherService::new(config, Arc::clone(&store) as Arc<dyn RecordStore>);
    let handle = tokio::spawn(service.run(cancel.clone()));

    // Created after start: delivered by the filesystem watcher
    tokio::time::sleep(Duration::from_millis(300)).await;
    std::fs::write(inbox.join("b.txt"), fixture_bytes("missing_serial.txt")).unwrap();

    tokio::time::timeout(Duration::from_secs(10), async {
        while !(done.join("a.txt").exists() && failed.join("b.txt").exists()) {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("timed out waiting for both files to be archived");

    cancel.cancel();
    let summary = handle.await.unwrap().unwrap();

    assert_eq!(summary.inserted, 1);
    assert_eq!(summary.format_errors, 1);
    assert_eq!(store.len().await, 1);
    assert!(inbox.join("ignored.csv").exists());
}

#[tokio::test]
async fn test_service_rejects_invalid_config() {
    let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
    let result = WatcherService::new(AppConfig::default(), store)
        .run(CancellationToken::new())
        .await;
    assert!(result.is_err(), "an empty watch root must be rejected");
}
