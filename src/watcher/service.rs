//! Processing loop and watcher service.
//!
//! The loop is a small state machine driven one cycle at a time:
//!
//! ```text
//! Idle ──queue non-empty──> CheckFile ──stable──> Dispatch ──> Idle
//!   ^                          │ unstable: re-queue, pause      │
//!   │                          v                                │ failure
//!   └──────────────────── ErrorBackoff <────────────────────────┘
//! ```
//!
//! Ingestions run in a `JoinSet`, bounded by a semaphore. On cancellation the
//! loop stops dequeuing and waits for in-flight ingestions before returning.

use super::events::{RunStats, RunSummary};
use super::queue::{QueueHandle, WorkQueue};
use super::source::{DirectorySource, PathFilter};
use super::stability::{Observation, StabilityTracker};
use crate::config::AppConfig;
use crate::error::{IngestError, Result};
use crate::ingest::{IngestPipeline, IngestReport};
use crate::store::RecordStore;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Pacing and limits for [`ProcessingLoop`].
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub quiescence: Duration,
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    pub max_concurrent: usize,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            quiescence: Duration::from_millis(2_000),
            poll_interval: Duration::from_millis(250),
            error_backoff: Duration::from_millis(1_000),
            max_concurrent: 2,
        }
    }
}

#[derive(Debug)]
enum LoopState {
    Idle,
    CheckFile,
    Dispatch { path: PathBuf, size: u64 },
    ErrorBackoff,
}

/// Paths currently being ingested.
#[derive(Debug, Default)]
struct InFlight(Mutex<HashSet<PathBuf>>);

impl InFlight {
    fn set(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn contains(&self, path: &Path) -> bool {
        self.set().contains(path)
    }
}

/// Releases an in-flight path and its tracking state, even if the
/// ingestion task panics.
struct DispatchGuard {
    path: PathBuf,
    in_flight: Arc<InFlight>,
    tracker: Arc<StabilityTracker>,
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        self.in_flight.set().remove(&self.path);
        self.tracker.forget(&self.path);
    }
}

pub struct ProcessingLoop {
    queue: WorkQueue,
    tracker: Arc<StabilityTracker>,
    pipeline: Arc<IngestPipeline>,
    settings: LoopSettings,
    limit: Arc<Semaphore>,
    in_flight: Arc<InFlight>,
    tasks: JoinSet<()>,
}

impl ProcessingLoop {
    pub fn new(
        queue: WorkQueue,
        tracker: Arc<StabilityTracker>,
        pipeline: Arc<IngestPipeline>,
        settings: LoopSettings,
    ) -> Self {
        let permits = settings.max_concurrent.max(1);
        Self {
            queue,
            tracker,
            pipeline,
            settings,
            limit: Arc::new(Semaphore::new(permits)),
            in_flight: Arc::new(InFlight::default()),
            tasks: JoinSet::new(),
        }
    }

    /// Producer handle for sources feeding this loop.
    pub fn queue_handle(&self) -> QueueHandle {
        self.queue.handle()
    }

    /// Run until `cancel` fires, then drain in-flight ingestions.
    pub async fn run(mut self, cancel: CancellationToken) -> RunSummary {
        tracing::info!(
            max_concurrent = self.settings.max_concurrent,
            quiescence_ms = self.settings.quiescence.as_millis() as u64,
            "Processing loop started"
        );

        let mut state = LoopState::Idle;
        while !cancel.is_cancelled() {
            self.reap_finished();
            state = match state {
                LoopState::Idle => {
                    if self.queue.is_empty() {
                        self.pause(self.settings.poll_interval, &cancel).await;
                        LoopState::Idle
                    } else {
                        LoopState::CheckFile
                    }
                }
                LoopState::CheckFile => self.check_next(&cancel).await,
                LoopState::Dispatch { path, size } => {
                    match self.dispatch(path, size, &cancel).await {
                        Ok(()) => LoopState::Idle,
                        Err(e) => {
                            tracing::error!(error = %e, "Dispatch failed");
                            LoopState::ErrorBackoff
                        }
                    }
                }
                LoopState::ErrorBackoff => {
                    self.pause(self.settings.error_backoff, &cancel).await;
                    LoopState::Idle
                }
            };
        }

        let pending = self.tasks.len();
        if pending > 0 {
            tracing::info!(pending, "Cancellation requested, waiting for in-flight ingestions");
        }
        while let Some(joined) = self.tasks.join_next().await {
            log_join_error(joined);
        }

        let summary = self.pipeline.stats().snapshot();
        tracing::info!(%summary, "Processing loop stopped");
        summary
    }

    async fn check_next(&mut self, cancel: &CancellationToken) -> LoopState {
        let Some(path) = self.queue.try_dequeue() else {
            return LoopState::Idle;
        };

        if self.in_flight.contains(&path) {
            tracing::trace!(path = %path.display(), "Already ingesting, dropping redundant entry");
            return LoopState::Idle;
        }

        let observation = self.tracker.observe(&path);
        self.route(path, observation, cancel).await
    }

    /// Next state for a dequeued path after one stability observation.
    async fn route(
        &mut self,
        path: PathBuf,
        observation: Observation,
        cancel: &CancellationToken,
    ) -> LoopState {
        match observation {
            Observation::Gone => {
                tracing::debug!(path = %path.display(), "File gone, no longer tracked");
                return LoopState::Idle;
            }
            Observation::Dropped => return LoopState::Idle,
            Observation::Changed | Observation::Unchanged | Observation::Unreadable => {}
        }

        if self.tracker.is_stable(&path, self.settings.quiescence)
            && let Some(size) = self.tracker.tracked_size(&path)
        {
            return LoopState::Dispatch { path, size };
        }

        self.queue.enqueue(path);
        self.pause(self.settings.poll_interval, cancel).await;
        LoopState::Idle
    }

    async fn dispatch(
        &mut self,
        path: PathBuf,
        size: u64,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let permit = tokio::select! {
            permit = Arc::clone(&self.limit).acquire_owned() => permit
                .map_err(|e| IngestError::Other(format!("concurrency limiter closed: {e}")))?,
            () = cancel.cancelled() => {
                tracing::debug!(path = %path.display(), "Cancelled before dispatch");
                return Ok(());
            }
        };

        self.in_flight.set().insert(path.clone());
        let guard = DispatchGuard {
            path: path.clone(),
            in_flight: Arc::clone(&self.in_flight),
            tracker: Arc::clone(&self.tracker),
        };
        let pipeline = Arc::clone(&self.pipeline);
        let requeue = self.queue.handle();

        tracing::debug!(path = %path.display(), size, "Dispatching stable file");
        self.tasks.spawn(async move {
            let _permit = permit;
            let report = pipeline.ingest(&path, Some(size)).await;
            drop(guard);
            if let IngestReport::Changed { .. } = report {
                requeue.enqueue(path);
            }
        });
        Ok(())
    }

    fn reap_finished(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            log_join_error(joined);
        }
    }

    async fn pause(&self, duration: Duration, cancel: &CancellationToken) {
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            () = cancel.cancelled() => {}
        }
    }
}

fn log_join_error(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Ingestion task aborted");
    }
}

/// Wires the directory source, the processing loop and the ingestion
/// pipeline together from an [`AppConfig`].
pub struct WatcherService {
    config: AppConfig,
    store: Arc<dyn RecordStore>,
}

impl WatcherService {
    pub fn new(config: AppConfig, store: Arc<dyn RecordStore>) -> Self {
        Self { config, store }
    }

    /// Watch until `cancel` fires and return the run's counters.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration or when the watch root cannot be
    /// watched or scanned. Per-file failures never end the run.
    pub async fn run(self, cancel: CancellationToken) -> Result<RunSummary> {
        self.config.validate()?;
        let watch = &self.config.watch;

        let stats = Arc::new(RunStats::new());
        let pipeline = IngestPipeline::from_config(&self.config, Arc::clone(&self.store), stats);
        let settings = LoopSettings {
            quiescence: watch.quiescence(),
            poll_interval: watch.poll_interval(),
            error_backoff: watch.error_backoff(),
            max_concurrent: watch.max_concurrent,
        };

        let processing = ProcessingLoop::new(
            WorkQueue::new(),
            Arc::new(StabilityTracker::new()),
            Arc::new(pipeline),
            settings,
        );

        let filter = PathFilter::new(&watch.pattern)?;
        let source = DirectorySource::start(
            &watch.root,
            watch.recursive,
            filter,
            processing.queue_handle(),
        )?;

        let summary = processing.run(cancel).await;
        drop(source);
        Ok(summary)
    }
}
