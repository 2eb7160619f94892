//! Logging infrastructure for loghopper
//!
//! Structured `tracing` output to the console and, optionally, to rolling
//! files in the app data directory.
//!
//! ## Features
//!
//! - **File Rotation**: Daily files with 10 retained
//! - **Error Tracking**: Separate `error.*.log` with warnings and errors only
//! - **Override**: `RUST_LOG` wins over the configured level
//!
//! ## Usage
//!
//! ```no_run
//! use loghopper::logging::{self, LoggingConfig};
//!
//! # fn example() -> anyhow::Result<()> {
//! let _guards = logging::init(&LoggingConfig::default())?;
//! tracing::info!("Watcher started");
//! # Ok(())
//! # }
//! ```

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const MAX_LOG_FILES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, e.g. `info` or `loghopper=debug`
    pub level: String,
    /// Log file directory; platform default when unset
    pub directory: Option<PathBuf>,
    pub file_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            directory: None,
            file_output: false,
        }
    }
}

/// Gets the log directory path based on platform conventions
///
/// Returns:
/// - Windows: `%APPDATA%/loghopper/logs`
/// - macOS: `~/Library/Application Support/loghopper/logs`
/// - Linux: `~/.local/share/loghopper/logs`
pub fn default_log_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().context("Failed to determine data directory")?;
    Ok(base_dir.join("loghopper").join("logs"))
}

/// Keeps the non-blocking file writers alive; drop on shutdown to flush.
#[derive(Debug, Default)]
pub struct LogGuards(Vec<WorkerGuard>);

/// Initializes the global subscriber.
///
/// With `file_output`, two daily-rolling files are written:
/// - `loghopper.<date>.log`: everything that passes the filter
/// - `error.<date>.log`: warnings and errors
///
/// # Errors
///
/// Returns error if the filter is invalid, the log directory cannot be
/// created, or a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<LogGuards> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level: {}", config.level))?;

    let stdout_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr);

    if !config.file_output {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stdout_layer)
            .try_init()
            .context("Failed to install tracing subscriber")?;
        return Ok(LogGuards::default());
    }

    let log_dir = match &config.directory {
        Some(dir) => dir.clone(),
        None => default_log_dir()?,
    };
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let all_logs_appender = rolling_appender(&log_dir, "loghopper")?;
    let error_logs_appender = rolling_appender(&log_dir, "error")?;
    let (all_writer, all_guard) = tracing_appender::non_blocking(all_logs_appender);
    let (error_writer, error_guard) = tracing_appender::non_blocking(error_logs_appender);

    let all_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(all_writer);

    let error_logs_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(error_writer)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(all_logs_layer)
        .with(error_logs_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(log_dir = %log_dir.display(), "Logging initialized");

    Ok(LogGuards(vec![all_guard, error_guard]))
}

fn rolling_appender(log_dir: &std::path::Path, prefix: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(log_dir)
        .with_context(|| format!("Failed to create {prefix} file appender"))
}

/// Gets the path to today's main log file. The daily appender rolls over
/// at UTC midnight, so "today" is the UTC date.
pub fn current_log_path(config: &LoggingConfig) -> Result<PathBuf> {
    let log_dir = match &config.directory {
        Some(dir) => dir.clone(),
        None => default_log_dir()?,
    };
    Ok(log_dir.join(log_file_name(chrono::Utc::now().date_naive())))
}

fn log_file_name(date: chrono::NaiveDate) -> String {
    format!("loghopper.{}.log", date.format("%Y-%m-%d"))
}
