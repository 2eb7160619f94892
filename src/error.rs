//! Centralized error handling for loghopper.
//!
//! Every failure an ingestion can hit maps to one [`IngestError`] variant.
//! The variants fall into the four kinds the processing loop cares about
//! (see [`ErrorKind`]):
//!
//! - **format**: the parser could not build a record ([`FormatError`])
//! - **`io_transient`**: the file could not be read right now (locked, torn)
//! - **store**: the record store rejected the operation
//! - **archive**: moving/copying the source file afterwards failed
//!
//! ## Context Extension Trait
//!
//! The [`ResultExt`] trait adds `.context()` to any `Result` whose error
//! converts into [`IngestError`]:
//!
//! ```no_run
//! use loghopper::error::ResultExt as _;
//! use std::fs;
//!
//! fn load_text() -> loghopper::error::Result<String> {
//!     let text = fs::read_to_string("drop/log.txt").context("Failed to load test log")?;
//!     Ok(text)
//! }
//! ```

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Parser failure: a structurally required field is missing or unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// A required field could not be located anywhere in the input.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A required field was found but its value failed to convert.
    #[error("invalid value {value:?} for field `{field}`: {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },
}

impl FormatError {
    pub(crate) fn invalid(
        field: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidField {
            field,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Name of the field this error is about.
    pub fn field(&self) -> &'static str {
        match self {
            Self::MissingField(field) | Self::InvalidField { field, .. } => *field,
        }
    }
}

/// Main error type for loghopper operations.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The test log could not be parsed into a record.
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// The file could not be read right now; eligible for retry.
    #[error("file temporarily unreadable: {}: {source}", .path.display())]
    IoTransient {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The record store rejected the operation.
    #[error("store error: {0}")]
    Store(String),

    /// Optimistic write lost against a concurrent writer of the same key.
    #[error("store conflict on key {key}")]
    StoreConflict { key: String },

    /// Moving or copying the source file to its archive destination failed.
    #[error("archive error: {}: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`IngestError`], used for events and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Format,
    IoTransient,
    Store,
    Archive,
    Other,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Format => "format",
            Self::IoTransient => "io_transient",
            Self::Store => "store",
            Self::Archive => "archive",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Format(_) => ErrorKind::Format,
            Self::IoTransient { .. } => ErrorKind::IoTransient,
            Self::Store(_) | Self::StoreConflict { .. } | Self::Json(_) => ErrorKind::Store,
            Self::Archive { .. } => ErrorKind::Archive,
            Self::Io(_) | Self::Config(_) | Self::Other(_) => ErrorKind::Other,
        }
    }
}

impl From<anyhow::Error> for IngestError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }
}

/// Result type alias for loghopper operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<IngestError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err: IngestError = e.into();
            IngestError::Other(format!("{}: {}", msg.into(), err))
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err: IngestError = e.into();
            IngestError::Other(format!("{}: {}", f(), err))
        })
    }
}
