//! Insert / update / duplicate decision against the record store.
//!
//! ```text
//! load(key) ──> none ─────────────────────> version 1, store(expected = none)  => Inserted
//!          └──> same fingerprint ─────────> nothing written                    => Duplicate
//!          └──> different fingerprint ────> version n+1, superseded += old,
//!                                           store(expected = old revision)     => Updated
//! ```
//!
//! The write is a compare-and-swap. If another ingestion of the same key
//! wins the race, the whole decision is re-run against the fresh state, up
//! to a bounded number of attempts.

use crate::error::{IngestError, Result};
use crate::record::{ParsedRecord, SupersededVersion};
use crate::store::RecordStore;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

/// Default number of resolve attempts before a conflict is surfaced.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Outcome of resolving one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Inserted { key: String, version: u32 },
    Updated { key: String, version: u32 },
    Duplicate { key: String, version: u32 },
}

impl Resolution {
    pub fn key(&self) -> &str {
        match self {
            Self::Inserted { key, .. } | Self::Updated { key, .. } | Self::Duplicate { key, .. } => {
                key
            }
        }
    }

    /// Version now current under the key.
    pub fn version(&self) -> u32 {
        match self {
            Self::Inserted { version, .. }
            | Self::Updated { version, .. }
            | Self::Duplicate { version, .. } => *version,
        }
    }
}

pub struct VersionResolver {
    store: Arc<dyn RecordStore>,
    max_attempts: u32,
}

impl VersionResolver {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Decide and persist `record`.
    ///
    /// # Errors
    ///
    /// Store failures are returned as-is; losing the compare-and-swap more
    /// than `max_attempts` times becomes `IngestError::Store`.
    pub async fn resolve(&self, mut record: ParsedRecord) -> Result<Resolution> {
        let key = record.key.clone();

        for attempt in 1..=self.max_attempts {
            let existing = self.store.load(&key).await?;

            let expected = match existing {
                None => {
                    record.version = 1;
                    record.superseded.clear();
                    None
                }
                Some(current) if current.record.fingerprint == record.fingerprint => {
                    tracing::debug!(%key, version = current.record.version, "Identical content already stored");
                    return Ok(Resolution::Duplicate {
                        key,
                        version: current.record.version,
                    });
                }
                Some(current) => {
                    let previous = current.record;
                    record.version = previous.version + 1;
                    record.superseded = previous.superseded;
                    record.superseded.push(SupersededVersion {
                        version: previous.version,
                        fingerprint: previous.fingerprint,
                        superseded_at: Utc::now(),
                    });
                    Some(current.revision)
                }
            };

            match self.store.store(&key, &record, expected).await {
                Ok(revision) => {
                    tracing::debug!(%key, version = record.version, %revision, attempt, "Record stored");
                    return Ok(if expected.is_none() {
                        Resolution::Inserted {
                            key,
                            version: record.version,
                        }
                    } else {
                        Resolution::Updated {
                            key,
                            version: record.version,
                        }
                    });
                }
                Err(IngestError::StoreConflict { .. }) => {
                    tracing::debug!(%key, attempt, "Concurrent write on key, re-resolving");
                }
                Err(e) => return Err(e),
            }
        }

        Err(IngestError::Store(format!(
            "gave up on key {key} after {} conflicting writes",
            self.max_attempts
        )))
    }
}
