//! Record store
//!
//! The core only needs "load by key" and "store by key". To keep the
//! versioning read-then-write atomic per key, writes are compare-and-swap:
//! the caller passes the [`Revision`] it read (or `None` when it saw no
//! record) and the store rejects the write with
//! [`IngestError::StoreConflict`] if the key has moved on since.
//!
//! Two backends:
//!
//! - [`MemoryStore`]: process-local map, used by tests and dry runs
//! - [`JsonFileStore`]: one JSON document per key in a directory
//!
//! [`IngestError::StoreConflict`]: crate::error::IngestError::StoreConflict

mod json_file;
mod memory;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::record::ParsedRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque per-key write counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Revision(pub u64);

impl Revision {
    pub const FIRST: Self = Self(1);

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// A record as currently held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub revision: Revision,
    pub record: ParsedRecord,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Current record under `key`, if any.
    async fn load(&self, key: &str) -> Result<Option<StoredRecord>>;

    /// Write `record` under `key` if the stored revision still equals
    /// `expected` (`None`: the key must not exist yet).
    ///
    /// Returns the new revision, or `IngestError::StoreConflict` when
    /// another writer got there first.
    async fn store(
        &self,
        key: &str,
        record: &ParsedRecord,
        expected: Option<Revision>,
    ) -> Result<Revision>;
}

/// Shared compare-and-swap rule for both backends.
pub(crate) fn check_expected(
    key: &str,
    current: Option<Revision>,
    expected: Option<Revision>,
) -> Result<Revision> {
    if current != expected {
        return Err(crate::error::IngestError::StoreConflict {
            key: key.to_owned(),
        });
    }
    Ok(current.map_or(Revision::FIRST, Revision::next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IngestError;

    #[test]
    fn test_check_expected_new_key() {
        assert_eq!(check_expected("k", None, None).unwrap(), Revision::FIRST);
    }

    #[test]
    fn test_check_expected_advances() {
        assert_eq!(
            check_expected("k", Some(Revision(3)), Some(Revision(3))).unwrap(),
            Revision(4)
        );
    }

    #[test]
    fn test_check_expected_conflicts() {
        let err = check_expected("k", Some(Revision(2)), Some(Revision(1))).unwrap_err();
        assert!(matches!(err, IngestError::StoreConflict { ref key } if key == "k"));

        let err = check_expected("k", Some(Revision(1)), None).unwrap_err();
        assert!(matches!(err, IngestError::StoreConflict { .. }));
    }
}
