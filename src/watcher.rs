//! Drop-folder watcher
//!
//! Watches a folder for test logs, waits until each file stops growing and
//! ingests it.
//!
//! ## Architecture
//!
//! ```text
//! DirectorySource (notify events + initial scan)
//!   │  "path observed"
//!   v
//! WorkQueue ──> ProcessingLoop ──> StabilityTracker
//!                    │ stable
//!                    v
//!               IngestPipeline (bounded, JoinSet)
//!                    │
//!                    └─> IngestEvent + RunStats
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use loghopper::config::AppConfig;
//! use loghopper::store::JsonFileStore;
//! use loghopper::watcher::WatcherService;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(config: AppConfig) -> loghopper::error::Result<()> {
//! let store = Arc::new(JsonFileStore::open(&config.store.path)?);
//! let cancel = CancellationToken::new();
//! let summary = WatcherService::new(config, store).run(cancel).await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! The `watch` section of the app config:
//! ```json
//! {
//!   "root": "/srv/testlogs/incoming",
//!   "pattern": "*.txt",
//!   "recursive": false,
//!   "quiescence_ms": 2000,
//!   "max_concurrent": 2
//! }
//! ```

pub mod config;
pub mod events;
pub mod queue;
pub mod service;
pub mod source;
pub mod stability;

pub use config::WatchConfig;
pub use events::{IngestEvent, RunStats, RunSummary};
pub use queue::{QueueHandle, WorkQueue};
pub use service::{LoopSettings, ProcessingLoop, WatcherService};
pub use source::{DirectorySource, PathFilter, initial_scan};
pub use stability::{Observation, PendingFile, StabilityTracker};
