//! In-memory record store.

use super::{RecordStore, Revision, StoredRecord, check_expected};
use crate::error::Result;
use crate::record::ParsedRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, StoredRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<StoredRecord>> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn store(
        &self,
        key: &str,
        record: &ParsedRecord,
        expected: Option<Revision>,
    ) -> Result<Revision> {
        // Holding the write lock across check + insert makes the swap atomic.
        let mut records = self.records.write().await;
        let current = records.get(key).map(|r| r.revision);
        let revision = check_expected(key, current, expected)?;
        records.insert(
            key.to_owned(),
            StoredRecord {
                revision,
                record: record.clone(),
            },
        );
        Ok(revision)
    }
}
