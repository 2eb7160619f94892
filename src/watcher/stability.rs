//! File size stability detection.
//!
//! A path is stable once its size has not changed for the quiescence
//! window. Every observed size change restarts the window.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Tracking state for one candidate file.
#[derive(Debug, Clone)]
pub struct PendingFile {
    pub path: PathBuf,
    /// Size at the last observed change.
    pub size: u64,
    pub first_observed_at: Instant,
    /// Restarted on every size change.
    pub last_changed_at: Instant,
}

/// What a single `observe` call found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// First sighting or size changed; the window restarted.
    Changed,
    /// Same size as last time.
    Unchanged,
    /// File is gone; tracking dropped.
    Gone,
    /// Metadata could not be read right now; treated as not yet stable.
    Unreadable,
    /// Permission denied; tracking dropped until the path is seen again.
    Dropped,
}

#[derive(Debug, Default)]
pub struct StabilityTracker {
    files: Mutex<HashMap<PathBuf, PendingFile>>,
}

impl StabilityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, PendingFile>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the current size of `path`.
    pub fn observe(&self, path: &Path) -> Observation {
        let size = std::fs::metadata(path).and_then(|meta| {
            if meta.is_file() {
                Ok(meta.len())
            } else {
                Err(std::io::Error::from(ErrorKind::NotFound))
            }
        });
        self.record(path, size)
    }

    fn record(&self, path: &Path, size: std::io::Result<u64>) -> Observation {
        let size = match size {
            Ok(size) => size,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.forget(path);
                return Observation::Gone;
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                tracing::warn!(path = %path.display(), error = %e, "Permission denied, dropping file from tracking");
                self.forget(path);
                return Observation::Dropped;
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "File metadata unavailable, will retry");
                return Observation::Unreadable;
            }
        };

        let now = Instant::now();
        let mut files = self.files();
        match files.get_mut(path) {
            Some(tracked) if tracked.size == size => Observation::Unchanged,
            Some(tracked) => {
                tracing::debug!(
                    path = %path.display(),
                    old_size = tracked.size,
                    new_size = size,
                    "File size changed, resetting stability window"
                );
                tracked.size = size;
                tracked.last_changed_at = now;
                Observation::Changed
            }
            None => {
                files.insert(
                    path.to_path_buf(),
                    PendingFile {
                        path: path.to_path_buf(),
                        size,
                        first_observed_at: now,
                        last_changed_at: now,
                    },
                );
                Observation::Changed
            }
        }
    }

    /// True when the current size equals the tracked size and the window
    /// has fully elapsed since the last change.
    pub fn is_stable(&self, path: &Path, quiescence: Duration) -> bool {
        let Ok(meta) = std::fs::metadata(path) else {
            return false;
        };
        self.files()
            .get(path)
            .is_some_and(|t| t.size == meta.len() && t.last_changed_at.elapsed() >= quiescence)
    }

    pub fn forget(&self, path: &Path) {
        self.files().remove(path);
    }

    /// Size recorded at the last change, if tracked.
    pub fn tracked_size(&self, path: &Path) -> Option<u64> {
        self.files().get(path).map(|t| t.size)
    }

    pub fn pending(&self, path: &Path) -> Option<PendingFile> {
        self.files().get(path).cloned()
    }

    pub fn tracked_count(&self) -> usize {
        self.files().len()
    }
}
