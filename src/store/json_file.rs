//! JSON document store: one pretty-printed file per record key.
//!
//! ```text
//! <base>/
//!   SN123-20240315-140509.json   { "revision": 2, "record": { ... } }
//! ```
//!
//! Writes go to a temp file in the same directory and are renamed over the
//! target, so a reader never sees a half-written document. The
//! compare-and-swap is serialized per key with an async mutex held only for
//! the duration of one write; the mutex is dropped from the map once no
//! other writer is waiting on it.
//!
//! File names are the key with every byte outside `[A-Za-z0-9.-]`
//! percent-encoded (`_` and `%` included), so distinct keys never share a
//! document.

use super::{RecordStore, Revision, StoredRecord, check_expected};
use crate::error::{IngestError, Result};
use crate::record::ParsedRecord;
use async_trait::async_trait;
use dashmap::DashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct JsonFileStore {
    base_path: PathBuf,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `base_path`.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::Store` if the directory cannot be created.
    pub fn open(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path).map_err(|e| {
            IngestError::Store(format!(
                "Failed to create record store directory {}: {e}",
                base_path.display()
            ))
        })?;
        Ok(Self {
            base_path,
            key_locks: DashMap::new(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path of the document for an encoded key.
    fn document_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{name}.json"))
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        Arc::clone(
            self.key_locks
                .entry(name.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Drop the map entry when only the map and `lock` still hold it.
    fn release_lock(&self, name: &str, lock: &Arc<Mutex<()>>) {
        self.key_locks
            .remove_if(name, |_, held| Arc::ptr_eq(held, lock) && Arc::strong_count(held) == 2);
    }

    async fn read_document(&self, key: &str) -> Result<Option<StoredRecord>> {
        let path = self.document_path(&encode_key(key));
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(IngestError::Store(format!(
                    "Failed to read record {}: {e}",
                    path.display()
                )));
            }
        };

        let stored: StoredRecord = serde_json::from_str(&json).map_err(|e| {
            IngestError::Store(format!("Corrupt record document {}: {e}", path.display()))
        })?;
        if stored.record.key != key {
            return Err(IngestError::Store(format!(
                "Record document {} holds key {}, expected {key}",
                path.display(),
                stored.record.key
            )));
        }
        Ok(Some(stored))
    }

    async fn write_document(
        &self,
        key: &str,
        name: &str,
        record: &ParsedRecord,
        expected: Option<Revision>,
    ) -> Result<Revision> {
        let current = self.read_document(key).await?.map(|s| s.revision);
        let revision = check_expected(key, current, expected)?;

        let document = StoredRecord {
            revision,
            record: record.clone(),
        };
        let json = serde_json::to_string_pretty(&document)?;

        let path = self.document_path(name);
        let tmp_path = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp_path, json).await.map_err(|e| {
            IngestError::Store(format!("Failed to write {}: {e}", tmp_path.display()))
        })?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(IngestError::Store(format!(
                "Failed to commit record {}: {e}",
                path.display()
            )));
        }

        tracing::debug!(key, %revision, path = %path.display(), "Stored record document");
        Ok(revision)
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn load(&self, key: &str) -> Result<Option<StoredRecord>> {
        self.read_document(key).await
    }

    async fn store(
        &self,
        key: &str,
        record: &ParsedRecord,
        expected: Option<Revision>,
    ) -> Result<Revision> {
        let name = encode_key(key);
        let lock = self.lock_for(&name);
        let result = {
            let _guard = lock.lock().await;
            self.write_document(key, &name, record, expected).await
        };
        self.release_lock(&name, &lock);
        result
    }
}

/// Percent-encode every byte outside `[A-Za-z0-9.-]`.
fn encode_key(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.') {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("%{byte:02X}"));
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::versioning::{Resolution, VersionResolver};
    use tempfile::TempDir;

    const LOG: &str = "Device Serial Number: SN9\nDate: 2024-01-02\nTime: 03:04:05\n\
Test duration: 1 Result: PASS\n\
Measured current: 0,1 LimitLow: 0,0 LimitHigh: 0,2 Unit: A Pass/Fail: PASS\n";

    fn log_for(serial: &str) -> String {
        LOG.replace("SN9", serial)
    }

    #[test]
    fn test_encode_key() {
        assert_eq!(encode_key("SN123-20240315-140509"), "SN123-20240315-140509");
        assert_eq!(encode_key("SN/1 2-20240101-000000"), "SN%2F1%202-20240101-000000");
        assert_eq!(encode_key("SN_1"), "SN%5F1");
        assert_ne!(encode_key("SN/1"), encode_key("SN_1"));
        assert_ne!(encode_key("SN%2F1"), encode_key("SN/1"));
    }

    #[tokio::test]
    async fn test_similar_serials_keep_separate_documents() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn RecordStore> = Arc::new(JsonFileStore::open(dir.path()).unwrap());
        let resolver = VersionResolver::new(Arc::clone(&store));

        let slash = parser::parse(&log_for("SN/1"), "a.txt").unwrap();
        let underscore = parser::parse(&log_for("SN_1"), "b.txt").unwrap();
        assert_ne!(slash.key, underscore.key);

        let first = resolver.resolve(slash.clone()).await.unwrap();
        let second = resolver.resolve(underscore.clone()).await.unwrap();
        assert!(matches!(first, Resolution::Inserted { version: 1, .. }));
        assert!(matches!(second, Resolution::Inserted { version: 1, .. }));

        let loaded = store.load(&slash.key).await.unwrap().unwrap();
        assert_eq!(loaded.record.identity.device_serial, "SN/1");
        let loaded = store.load(&underscore.key).await.unwrap().unwrap();
        assert_eq!(loaded.record.identity.device_serial, "SN_1");
    }

    #[tokio::test]
    async fn test_document_under_wrong_key_is_store_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let record = parser::parse(LOG, "a.txt").unwrap();
        store.store(&record.key, &record, None).await.unwrap();

        std::fs::copy(
            dir.path().join("SN9-20240102-030405.json"),
            dir.path().join("other.json"),
        )
        .unwrap();
        let err = store.load("other").await.unwrap_err();
        assert!(matches!(err, IngestError::Store(ref msg) if msg.contains("holds key")));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_key_locks_are_released() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::open(dir.path()).unwrap());
        let record = parser::parse(LOG, "a.txt").unwrap();

        let mut writers = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let record = record.clone();
            writers.push(tokio::spawn(async move {
                let _ = store.store(&record.key, &record, None).await;
            }));
        }
        for writer in writers {
            writer.await.unwrap();
        }

        assert_eq!(store.load(&record.key).await.unwrap().unwrap().revision, Revision::FIRST);
        assert!(store.key_locks.is_empty(), "lock map should not keep idle keys");
    }

    #[tokio::test]
    async fn test_store_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("records")).unwrap();
        let record = parser::parse(LOG, "a.txt").unwrap();

        assert!(store.load(&record.key).await.unwrap().is_none());
        let rev = store.store(&record.key, &record, None).await.unwrap();
        assert_eq!(rev, Revision::FIRST);

        let loaded = store.load(&record.key).await.unwrap().unwrap();
        assert_eq!(loaded.revision, Revision::FIRST);
        assert_eq!(loaded.record.fingerprint, record.fingerprint);
        assert!(store.base_path().join("SN9-20240102-030405.json").exists());
    }

    #[tokio::test]
    async fn test_stale_revision_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        let record = parser::parse(LOG, "a.txt").unwrap();

        store.store(&record.key, &record, None).await.unwrap();
        let err = store.store(&record.key, &record, None).await.unwrap_err();
        assert!(matches!(err, IngestError::StoreConflict { .. }));

        let rev = store
            .store(&record.key, &record, Some(Revision::FIRST))
            .await
            .unwrap();
        assert_eq!(rev, Revision(2));
    }

    #[tokio::test]
    async fn test_corrupt_document_is_store_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        std::fs::write(dir.path().join("bad.json"), "{not json").unwrap();

        let err = store.load("bad").await.unwrap_err();
        assert!(matches!(err, IngestError::Store(_)));
    }
}
