//! Application configuration
//!
//! One JSON document with a section per concern. Missing sections and
//! fields fall back to their defaults, so a partial file is valid.
//!
//! ## Usage
//!
//! ```no_run
//! use loghopper::config::AppConfig;
//!
//! # fn example() -> loghopper::error::Result<()> {
//! let path = AppConfig::default_path()?;
//! let mut config = AppConfig::load_from(&path)?;
//! config.watch.root = "/srv/drop".into();
//! config.validate()?;
//! config.save_to(&path)?;
//! # Ok(())
//! # }
//! ```

use crate::archive::ArchiveConfig;
use crate::error::{IngestError, Result, ResultExt as _};
use crate::logging::LoggingConfig;
use crate::parser::ParseOptions;
use crate::versioning::DEFAULT_MAX_ATTEMPTS;
use crate::watcher::WatchConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "loghopper";

/// Where and how records are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory of the JSON document store
    pub path: PathBuf,
    /// Whole-resolve retries after a conflicting concurrent write
    pub resolve_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let path = dirs::data_local_dir()
            .map(|dir| dir.join(APP_DIR).join("records"))
            .unwrap_or_else(|| PathBuf::from("records"));
        Self {
            path,
            resolve_retries: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub watch: WatchConfig,
    pub parser: ParseOptions,
    pub archive: ArchiveConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// `<config dir>/loghopper/config.json`
    ///
    /// # Errors
    ///
    /// Fails when the platform has no configuration directory.
    pub fn default_path() -> Result<PathBuf> {
        let base = dirs::config_dir()
            .ok_or_else(|| IngestError::Config("could not determine config directory".to_owned()))?;
        Ok(base.join(APP_DIR).join("config.json"))
    }

    /// Load from `path`, or defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or is not valid JSON.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .map_err(|e| IngestError::Config(format!("invalid config {}: {e}", path.display())))
    }

    /// Write as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Fails when the directory or file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Check the settings needed to run the watcher.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::Config` naming the first offending setting.
    pub fn validate(&self) -> Result<()> {
        let watch = &self.watch;
        if watch.root.as_os_str().is_empty() {
            return Err(config_error("watch.root must be set"));
        }
        if watch.max_concurrent == 0 {
            return Err(config_error("watch.max_concurrent must be at least 1"));
        }
        if watch.quiescence_ms == 0 && watch.poll_interval_ms == 0 {
            return Err(config_error(
                "watch.quiescence_ms and watch.poll_interval_ms cannot both be 0",
            ));
        }
        glob::Pattern::new(&watch.pattern).map_err(|e| {
            IngestError::Config(format!("watch.pattern {:?} is not a valid glob: {e}", watch.pattern))
        })?;

        for (name, destination) in [
            ("archive.success", &self.archive.success),
            ("archive.error", &self.archive.error),
        ] {
            let Some(root) = destination.root.as_deref() else {
                continue;
            };
            let nested = if watch.recursive {
                root.starts_with(&watch.root)
            } else {
                root == watch.root
            };
            if nested {
                return Err(IngestError::Config(format!(
                    "{name}.root {} would be watched again; move it outside {}",
                    root.display(),
                    watch.root.display()
                )));
            }
        }

        if self.store.resolve_retries == 0 {
            return Err(config_error("store.resolve_retries must be at least 1"));
        }

        Ok(())
    }
}

fn config_error(msg: &str) -> IngestError {
    IngestError::Config(msg.to_owned())
}
