//! Ingestion events and run counters.
//!
//! Every terminal outcome of an ingestion becomes one [`IngestEvent`],
//! emitted as structured JSON on the `loghopper::events` tracing target and
//! counted in [`RunStats`].

use crate::error::ErrorKind;
use crate::versioning::Resolution;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Terminal outcome of one ingestion.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IngestEvent {
    Inserted {
        path: String,
        key: String,
        version: u32,
        fingerprint: String,
    },
    Updated {
        path: String,
        key: String,
        version: u32,
        fingerprint: String,
    },
    Duplicate {
        path: String,
        key: String,
        version: u32,
    },
    Failed {
        path: String,
        kind: ErrorKind,
        error: String,
    },
}

impl IngestEvent {
    pub fn resolved(path: String, resolution: &Resolution, fingerprint: String) -> Self {
        match resolution {
            Resolution::Inserted { key, version } => Self::Inserted {
                path,
                key: key.clone(),
                version: *version,
                fingerprint,
            },
            Resolution::Updated { key, version } => Self::Updated {
                path,
                key: key.clone(),
                version: *version,
                fingerprint,
            },
            Resolution::Duplicate { key, version } => Self::Duplicate {
                path,
                key: key.clone(),
                version: *version,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Inserted { .. } => "inserted",
            Self::Updated { .. } => "updated",
            Self::Duplicate { .. } => "duplicate",
            Self::Failed { .. } => "failed",
        }
    }

    /// Log the event as JSON.
    pub fn emit(&self) {
        let payload = serde_json::to_string(self).unwrap_or_else(|_| self.name().to_owned());
        match self {
            Self::Failed { .. } => {
                tracing::warn!(target: "loghopper::events", event = self.name(), %payload);
            }
            _ => tracing::info!(target: "loghopper::events", event = self.name(), %payload),
        }
    }
}

/// Running totals, shared by all ingestions of one run.
#[derive(Debug, Default)]
pub struct RunStats {
    inserted: AtomicU64,
    updated: AtomicU64,
    duplicates: AtomicU64,
    format_errors: AtomicU64,
    io_errors: AtomicU64,
    store_errors: AtomicU64,
    other_errors: AtomicU64,
    archive_failures: AtomicU64,
    requeued: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: &IngestEvent) {
        let counter = match event {
            IngestEvent::Inserted { .. } => &self.inserted,
            IngestEvent::Updated { .. } => &self.updated,
            IngestEvent::Duplicate { .. } => &self.duplicates,
            IngestEvent::Failed { kind, .. } => match kind {
                ErrorKind::Format => &self.format_errors,
                ErrorKind::IoTransient => &self.io_errors,
                ErrorKind::Store => &self.store_errors,
                ErrorKind::Archive | ErrorKind::Other => &self.other_errors,
            },
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Archival failed after an already decided outcome.
    pub fn record_archive_failure(&self) {
        self.archive_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A stable file changed again before it was read.
    pub fn record_requeue(&self) {
        self.requeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunSummary {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RunSummary {
            inserted: get(&self.inserted),
            updated: get(&self.updated),
            duplicates: get(&self.duplicates),
            format_errors: get(&self.format_errors),
            io_errors: get(&self.io_errors),
            store_errors: get(&self.store_errors),
            other_errors: get(&self.other_errors),
            archive_failures: get(&self.archive_failures),
            requeued: get(&self.requeued),
        }
    }
}

/// Point-in-time copy of [`RunStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub inserted: u64,
    pub updated: u64,
    pub duplicates: u64,
    pub format_errors: u64,
    pub io_errors: u64,
    pub store_errors: u64,
    pub other_errors: u64,
    pub archive_failures: u64,
    pub requeued: u64,
}

impl RunSummary {
    pub fn failed(&self) -> u64 {
        self.format_errors + self.io_errors + self.store_errors + self.other_errors
    }

    /// Files that reached a terminal outcome.
    pub fn processed(&self) -> u64 {
        self.inserted + self.updated + self.duplicates + self.failed()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "processed {}: {} inserted, {} updated, {} duplicate, {} failed \
             (format {}, io {}, store {}, other {}); {} re-queued, {} archive failures",
            self.processed(),
            self.inserted,
            self.updated,
            self.duplicates,
            self.failed(),
            self.format_errors,
            self.io_errors,
            self.store_errors,
            self.other_errors,
            self.requeued,
            self.archive_failures,
        )
    }
}
