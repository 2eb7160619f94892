//! Archival of processed source files.
//!
//! After an ingestion finishes, the source file is moved (or copied) to the
//! success or error destination. Archiving is housekeeping: a failure here
//! is logged by the caller and never changes the ingestion outcome.

use crate::error::{IngestError, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Default suffix format appended on name conflicts.
pub const DEFAULT_CONFLICT_FORMAT: &str = "%Y%m%d%H%M%S%3f";

/// Which destination a file is archived to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveMode {
    #[default]
    Move,
    Copy,
}

/// One archive destination. No root disables archival for that outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveDestination {
    pub root: Option<PathBuf>,
    pub mode: ArchiveMode,
    /// Keep the path relative to the watch root instead of flattening.
    pub preserve_structure: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub success: ArchiveDestination,
    pub error: ArchiveDestination,
    /// `chrono` format string for the disambiguating suffix.
    pub conflict_suffix_format: String,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            success: ArchiveDestination::default(),
            error: ArchiveDestination::default(),
            conflict_suffix_format: DEFAULT_CONFLICT_FORMAT.to_owned(),
        }
    }
}

impl ArchiveConfig {
    pub fn destination(&self, outcome: Outcome) -> &ArchiveDestination {
        match outcome {
            Outcome::Success => &self.success,
            Outcome::Error => &self.error,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Archiver {
    config: ArchiveConfig,
    watch_root: PathBuf,
}

impl Archiver {
    pub fn new(config: ArchiveConfig, watch_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            watch_root: watch_root.into(),
        }
    }

    /// Archive `source` for `outcome`.
    ///
    /// Returns the final location, or `None` when that outcome has no
    /// destination configured.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::Archive` if the directory cannot be created or
    /// the move/copy fails.
    pub async fn archive(&self, source: &Path, outcome: Outcome) -> Result<Option<PathBuf>> {
        let destination = self.config.destination(outcome);
        let Some(root) = destination.root.as_deref() else {
            return Ok(None);
        };

        let target = self.target_path(source, root, destination.preserve_structure);
        let archive_err = |source_err| IngestError::Archive {
            path: source.to_path_buf(),
            source: source_err,
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(archive_err)?;
        }

        let target = self.claim_target(target).await.map_err(archive_err)?;
        if let Err(e) = transfer(source, &target, destination.mode).await {
            let _ = tokio::fs::remove_file(&target).await;
            return Err(archive_err(e));
        }

        tracing::debug!(
            source = %source.display(),
            target = %target.display(),
            ?outcome,
            mode = ?destination.mode,
            "Archived source file"
        );
        Ok(Some(target))
    }

    /// Target path before conflict handling: flattened to the file name, or
    /// relative to the watch root when `preserve_structure` is set.
    pub fn target_path(&self, source: &Path, root: &Path, preserve_structure: bool) -> PathBuf {
        let relative = if preserve_structure {
            source.strip_prefix(&self.watch_root).ok()
        } else {
            None
        };

        match relative {
            Some(rel) => root.join(rel),
            None => root.join(source.file_name().unwrap_or(source.as_os_str())),
        }
    }

    /// Create an empty file at the first free name: `target` itself, then
    /// with a timestamp suffix (and a counter if still taken) before the
    /// extension. Creation fails on an existing name, so two archivers never
    /// claim the same file.
    async fn claim_target(&self, target: PathBuf) -> std::io::Result<PathBuf> {
        let mut stamp: Option<String> = None;
        let mut counter = 0u32;
        loop {
            let candidate = match &stamp {
                Some(stamp) => with_suffix(&target, stamp, counter),
                None => target.clone(),
            };
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(_) => return Ok(candidate),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if stamp.is_none() {
                        stamp = Some(
                            Local::now()
                                .format(&self.config.conflict_suffix_format)
                                .to_string(),
                        );
                    }
                    counter += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Move or copy `source` onto the claimed `target`.
async fn transfer(source: &Path, target: &Path, mode: ArchiveMode) -> std::io::Result<()> {
    match mode {
        ArchiveMode::Copy => {
            tokio::fs::copy(source, target).await?;
        }
        ArchiveMode::Move => match tokio::fs::rename(source, target).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::CrossesDevices => {
                tokio::fs::copy(source, target).await?;
                tokio::fs::remove_file(source).await?;
            }
            Err(e) => return Err(e),
        },
    }
    Ok(())
}

/// `dir/name.ext` -> `dir/name_<stamp>.ext` (`_<stamp>_<n>` for n > 1).
fn with_suffix(path: &Path, stamp: &str, counter: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = if counter > 1 {
        format!("{stamp}_{counter}")
    } else {
        stamp.to_owned()
    };
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{suffix}"),
    };
    path.with_file_name(name)
}
