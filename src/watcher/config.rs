//! Watcher configuration
//!
//! Controls which folder is watched, which files are picked up and how the
//! processing loop paces itself.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Watcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Folder to watch
    pub root: PathBuf,
    /// Glob matched against the file name
    pub pattern: String,
    /// Also watch and scan subdirectories
    pub recursive: bool,
    /// How long a file's size must stay unchanged before it is read
    pub quiescence_ms: u64,
    /// Pause between loop cycles when idle or after an unstable check
    pub poll_interval_ms: u64,
    /// Upper bound on concurrently running ingestions
    pub max_concurrent: usize,
    /// Extra read attempts for a temporarily unreadable file
    pub read_retries: u32,
    pub read_retry_backoff_ms: u64,
    /// Pause after an unexpected failure inside a loop cycle
    pub error_backoff_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            pattern: "*.txt".to_owned(),
            recursive: false,
            quiescence_ms: 2_000,
            poll_interval_ms: 250,
            max_concurrent: 2,
            read_retries: 3,
            read_retry_backoff_ms: 200,
            error_backoff_ms: 1_000,
        }
    }
}

impl WatchConfig {
    pub fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn read_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.read_retry_backoff_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}
