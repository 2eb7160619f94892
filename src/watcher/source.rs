//! Directory source: initial scan plus live filesystem notifications.
//!
//! Both feed the same signal, "this path needs checking", into the work
//! queue. The processing loop never knows which one produced a path.

use super::queue::QueueHandle;
use crate::error::{IngestError, Result};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// File-name glob filter.
#[derive(Debug, Clone)]
pub struct PathFilter {
    pattern: glob::Pattern,
}

impl PathFilter {
    /// # Errors
    ///
    /// Returns `IngestError::Config` for an invalid glob.
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = glob::Pattern::new(pattern)
            .map_err(|e| IngestError::Config(format!("invalid file pattern {pattern:?}: {e}")))?;
        Ok(Self { pattern })
    }

    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.pattern.matches(name))
    }
}

/// Enumerate matching files already present under `root`.
///
/// # Errors
///
/// Returns `IngestError::Io` if `root` cannot be read.
pub fn initial_scan(root: &Path, recursive: bool, filter: &PathFilter) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();

    if recursive {
        for entry in WalkDir::new(root).follow_links(false) {
            match entry {
                Ok(entry) if entry.file_type().is_file() && filter.matches(entry.path()) => {
                    found.push(entry.into_path());
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Skipping unreadable entry during scan"),
            }
        }
    } else {
        for entry in std::fs::read_dir(root)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_file() && filter.matches(&path) {
                found.push(path);
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Whether a notify event means "look at these paths again".
fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Any)
    )
}

/// Live source. Dropping it stops the notifications.
pub struct DirectorySource {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl std::fmt::Debug for DirectorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySource")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl DirectorySource {
    /// Start watching `root` and queue every file that already matches.
    ///
    /// The watcher is registered before the scan so a file created in
    /// between is seen by at least one of the two.
    ///
    /// # Errors
    ///
    /// Fails if the watcher cannot be created or the root cannot be scanned.
    pub fn start(
        root: &Path,
        recursive: bool,
        filter: PathFilter,
        queue: QueueHandle,
    ) -> Result<Self> {
        let event_filter = filter.clone();
        let event_queue = queue.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_relevant(&event.kind) => {
                for path in event.paths {
                    if event_filter.matches(&path) {
                        tracing::trace!(path = %path.display(), kind = ?event.kind, "Path observed");
                        event_queue.enqueue(path);
                    }
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Filesystem watcher error"),
        })
        .map_err(|e| IngestError::Other(format!("Failed to create watcher: {e}")))?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(root, mode)
            .map_err(|e| IngestError::Other(format!("Failed to watch {}: {e}", root.display())))?;

        let existing = initial_scan(root, recursive, &filter)?;
        tracing::info!(
            root = %root.display(),
            recursive,
            existing = existing.len(),
            "Started watching"
        );
        for path in existing {
            queue.enqueue(path);
        }

        Ok(Self {
            _watcher: watcher,
            root: root.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_filter_matches_file_name_only() {
        let filter = PathFilter::new("*.txt").unwrap();
        assert!(filter.matches(Path::new("/drop/SN1.txt")));
        assert!(!filter.matches(Path::new("/drop.txt/SN1.csv")));
        assert!(PathFilter::new("[").is_err());
    }

    #[test]
    fn test_initial_scan_non_recursive() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::write(dir.path().join("c.csv"), "").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("d.txt"), "").unwrap();

        let filter = PathFilter::new("*.txt").unwrap();
        let found = initial_scan(dir.path(), false, &filter).unwrap();
        assert_eq!(found, vec![dir.path().join("a.txt"), dir.path().join("b.txt")]);

        let found = initial_scan(dir.path(), true, &filter).unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.contains(&dir.path().join("sub").join("d.txt")));
    }

    #[test]
    fn test_event_kind_relevance() {
        use notify::event::{CreateKind, DataChange, RemoveKind, RenameMode};
        assert!(is_relevant(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Data(DataChange::Size))));
        assert!(is_relevant(&EventKind::Modify(ModifyKind::Name(RenameMode::To))));
        assert!(!is_relevant(&EventKind::Remove(RemoveKind::File)));
    }
}
