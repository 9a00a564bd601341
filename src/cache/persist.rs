//! Durable Mirror Module
//!
//! Host-provided key-value storage for evicted pages, and the record layout
//! written to it. Records are re-validated against wall-clock time on load.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::cache::PageMetadata;

// == Store Error ==
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// == Durable Store ==
/// String key-value storage that survives restarts.
pub trait DurableStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, key: &str, value: String) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

// == Persisted Record ==
/// One mirrored page: its payload, original creation time and lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub fingerprint: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    pub ttl_ms: u64,
    pub metadata: PageMetadata,
}

impl PersistedRecord {
    /// True once `created_at + ttl_ms` has passed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        let ttl = ChronoDuration::milliseconds(self.ttl_ms.min(i64::MAX as u64) as i64);
        self.created_at
            .checked_add_signed(ttl)
            .is_some_and(|expiry| now >= expiry)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn created_at_ms(&self) -> u64 {
        self.created_at.timestamp_millis().max(0) as u64
    }

    pub fn encode(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Converts a Unix millisecond timestamp into a chrono time.
pub fn timestamp_from_ms(ms: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms.min(i64::MAX as u64) as i64).unwrap_or_default()
}

// == Memory Store ==
/// In-process store. Nothing survives the process, but the contract holds.
#[derive(Debug, Default)]
pub struct MemoryDurableStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl DurableStore for MemoryDurableStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.records.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.records.lock().remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.records.lock().keys().cloned().collect())
    }
}

// == File Store ==
/// On-disk envelope; the key is kept because file names are hashes.
#[derive(Debug, Serialize, Deserialize)]
struct FileEnvelope {
    key: String,
    value: String,
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileDurableStore {
    dir: PathBuf,
}

impl FileDurableStore {
    /// Opens the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.dir.join(format!("{:x}.json", hasher.finalize()))
    }

    fn read_envelope(path: &Path) -> Result<Option<FileEnvelope>, StoreError> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl DurableStore for FileDurableStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(Self::read_envelope(&self.path_for(key))?
            .filter(|envelope| envelope.key == key)
            .map(|envelope| envelope.value))
    }

    fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        let envelope = FileEnvelope {
            key: key.to_string(),
            value,
        };
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&envelope)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_envelope(&path) {
                Ok(Some(envelope)) => keys.push(envelope.key),
                Ok(None) => {}
                Err(e) => debug!("Skipping unreadable record {}: {}", path.display(), e),
            }
        }
        Ok(keys)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(created_at: DateTime<Utc>, ttl_ms: u64) -> PersistedRecord {
        PersistedRecord {
            fingerprint: "invoices|p=1".to_string(),
            payload: json!([{"id": 1}]),
            created_at,
            ttl_ms,
            metadata: PageMetadata {
                resource: "invoices".to_string(),
                page_number: 1,
                page_size: 20,
                total_count: Some(1),
                filter_fingerprint: None,
            },
        }
    }

    #[test]
    fn test_record_expiry_uses_wall_clock() {
        let now = Utc::now();
        let fresh = record(now, 60_000);
        let stale = record(now - ChronoDuration::minutes(5), 60_000);

        assert!(!fresh.is_expired_at(now));
        assert!(stale.is_expired_at(now));
    }

    #[test]
    fn test_record_encoding() {
        let original = record(Utc::now(), 1_000);
        let decoded = PersistedRecord::decode(&original.encode().unwrap()).unwrap();

        assert_eq!(decoded.fingerprint, original.fingerprint);
        assert_eq!(decoded.created_at_ms(), original.created_at_ms());
        assert!(PersistedRecord::decode("not json").is_err());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryDurableStore::new();
        store.put("a", "1".to_string()).unwrap();
        store.put("b", "2".to_string()).unwrap();
        store.remove("a").unwrap();

        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("b").unwrap(), Some("2".to_string()));
        assert_eq!(store.keys().unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let key = "invoices|p=1|n=20|s=-|f={\"status\":\"paid\"}|q=";

        {
            let store = FileDurableStore::open(dir.path()).unwrap();
            store.put(key, "payload".to_string()).unwrap();
        }

        let store = FileDurableStore::open(dir.path()).unwrap();
        assert_eq!(store.get(key).unwrap(), Some("payload".to_string()));
        assert_eq!(store.keys().unwrap(), vec![key.to_string()]);

        store.remove(key).unwrap();
        assert_eq!(store.get(key).unwrap(), None);
        // Removing twice is fine
        store.remove(key).unwrap();
    }

    #[test]
    fn test_file_names_are_sha256_digests() {
        let dir = TempDir::new().unwrap();
        let store = FileDurableStore::open(dir.path()).unwrap();

        let empty = store.path_for("");
        assert_eq!(
            empty.file_name().unwrap().to_str().unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855.json"
        );

        let a = store.path_for("invoices|p=1");
        let b = store.path_for("invoices|p=2");
        assert_ne!(a, b);
        assert_eq!(a.file_stem().unwrap().len(), 64);
        assert_eq!(a, store.path_for("invoices|p=1"));
    }
}
