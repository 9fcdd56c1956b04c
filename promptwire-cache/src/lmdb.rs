//! LMDB-backed shared cache store.
//!
//! Uses the heed crate (Rust bindings for LMDB) as the adapter over an
//! external shared cache: the memory-mapped environment is shared by every
//! process on the host that opens the same path, so cached prompts survive
//! restarts and are visible across workers.
//!
//! # Atomicity
//!
//! LMDB serializes write transactions, which is exactly the primitive the
//! lock layer needs: `put_if_absent` reads and writes inside one write
//! transaction, so at most one contender observes the marker as absent.
//!
//! # Value framing
//!
//! `[fresh_until ms: 8 LE bytes][stale_until ms: 8 LE bytes][payload]`

use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use promptwire_core::{CacheError, PromptwireError, PromptwireResult};

use crate::entry::CacheEntry;
use crate::store::{AtomicStore, CacheStats, CacheStore};

const HEADER_LEN: usize = 16;

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored bytes did not decode as an entry.
    #[error("Corrupt entry under key {key}")]
    CorruptEntry { key: String },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for PromptwireError {
    fn from(e: LmdbStoreError) -> Self {
        PromptwireError::Cache(CacheError::Backend {
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
}

/// LMDB-backed store shared between processes on one host.
pub struct LmdbStore {
    env: Env,
    db: Database<Str, Bytes>,
    counters: RwLock<Counters>,
}

impl LmdbStore {
    /// Open (or create) the store at `path`.
    ///
    /// `max_size_mb` caps the memory map; LMDB refuses writes past it
    /// rather than evicting, so size it generously.
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let db: Database<Str, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            counters: RwLock::new(Counters::default()),
        })
    }

    fn record_hit(&self) {
        if let Ok(mut counters) = self.counters.write() {
            counters.hits += 1;
        }
    }

    fn record_miss(&self) {
        if let Ok(mut counters) = self.counters.write() {
            counters.misses += 1;
        }
    }

    fn encode(entry: &CacheEntry) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(HEADER_LEN + entry.payload.len());
        bytes.extend_from_slice(&entry.fresh_until.timestamp_millis().to_le_bytes());
        bytes.extend_from_slice(&entry.stale_until.timestamp_millis().to_le_bytes());
        bytes.extend_from_slice(&entry.payload);
        bytes
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<CacheEntry, LmdbStoreError> {
        if bytes.len() < HEADER_LEN {
            return Err(LmdbStoreError::CorruptEntry {
                key: key.to_string(),
            });
        }
        let fresh_millis = i64::from_le_bytes(bytes[0..8].try_into().expect("8-byte slice"));
        let stale_millis = i64::from_le_bytes(bytes[8..16].try_into().expect("8-byte slice"));
        let corrupt = || LmdbStoreError::CorruptEntry {
            key: key.to_string(),
        };
        Ok(CacheEntry {
            payload: bytes[HEADER_LEN..].to_vec(),
            fresh_until: DateTime::from_timestamp_millis(fresh_millis).ok_or_else(corrupt)?,
            stale_until: DateTime::from_timestamp_millis(stale_millis).ok_or_else(corrupt)?,
        })
    }

    /// Delete `key` if the stored entry is (still) expired.
    ///
    /// Re-checks inside the write transaction: another writer may have
    /// replaced the entry since the expired read, and a live replacement
    /// must not be thrown away.
    fn remove_if_expired(&self, key: &str, now: DateTime<Utc>) -> Result<(), LmdbStoreError> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let still_expired = match self
            .db
            .get(&wtxn, key)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?
        {
            Some(bytes) => match Self::decode(key, bytes) {
                Ok(entry) => entry.is_expired(now),
                // Undecodable bytes are dead weight either way.
                Err(_) => true,
            },
            None => false,
        };

        if still_expired {
            self.db
                .delete(&mut wtxn, key)
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
            wtxn.commit()
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for LmdbStore {
    async fn get(&self, key: &str) -> PromptwireResult<Option<CacheEntry>> {
        let now = Utc::now();
        let found = {
            let rtxn = self
                .env
                .read_txn()
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

            match self
                .db
                .get(&rtxn, key)
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?
            {
                Some(bytes) => Some(Self::decode(key, bytes)?),
                None => None,
            }
        };

        match found {
            Some(entry) if entry.is_expired(now) => {
                self.remove_if_expired(key, now)?;
                self.record_miss();
                Ok(None)
            }
            Some(entry) => {
                self.record_hit();
                Ok(Some(entry))
            }
            None => {
                self.record_miss();
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> PromptwireResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, key, &Self::encode(&entry))
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> PromptwireResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        self.db
            .delete(&mut wtxn, key)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(())
    }

    async fn clear(&self) -> PromptwireResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        self.db
            .clear(&mut wtxn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(())
    }

    async fn len(&self) -> PromptwireResult<usize> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let len = self
            .db
            .len(&rtxn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(len as usize)
    }

    async fn cleanup_expired(&self) -> PromptwireResult<usize> {
        let now = Utc::now();

        let expired_keys: Vec<String> = {
            let rtxn = self
                .env
                .read_txn()
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

            let iter = self
                .db
                .iter(&rtxn)
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

            let mut keys = Vec::new();
            for result in iter {
                let (key, bytes) =
                    result.map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
                let dead = match Self::decode(key, bytes) {
                    Ok(entry) => entry.is_expired(now),
                    Err(_) => true,
                };
                if dead {
                    keys.push(key.to_string());
                }
            }
            keys
        };

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let mut removed = 0usize;
        for key in &expired_keys {
            if self
                .db
                .delete(&mut wtxn, key)
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?
            {
                removed += 1;
            }
        }

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(removed)
    }

    async fn stats(&self) -> PromptwireResult<CacheStats> {
        let (hits, misses) = match self.counters.read() {
            Ok(counters) => (counters.hits, counters.misses),
            Err(_) => (0, 0),
        };
        Ok(CacheStats {
            hits,
            misses,
            entry_count: self.len().await? as u64,
            evictions: 0, // LMDB never evicts; it only grows to map_size
        })
    }

    fn as_atomic(&self) -> Option<&dyn AtomicStore> {
        Some(self)
    }
}

#[async_trait]
impl AtomicStore for LmdbStore {
    async fn put_if_absent(&self, key: &str, ttl: Duration) -> PromptwireResult<bool> {
        let now = Utc::now();

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let held = match self
            .db
            .get(&wtxn, key)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?
        {
            Some(bytes) => match Self::decode(key, bytes) {
                Ok(entry) => !entry.is_expired(now),
                Err(_) => false,
            },
            None => false,
        };

        if held {
            // Abort the transaction; nothing was written.
            return Ok(false);
        }

        self.db
            .put(&mut wtxn, key, &Self::encode(&CacheEntry::marker(ttl)))
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbStore::new(temp_dir.path(), 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    fn live_entry(payload: &[u8]) -> CacheEntry {
        CacheEntry::new(
            payload.to_vec(),
            Duration::from_secs(60),
            Duration::from_secs(60),
        )
    }

    fn expired_entry() -> CacheEntry {
        CacheEntry::with_start(
            b"old".to_vec(),
            Utc::now() - ChronoDuration::seconds(300),
            Duration::from_secs(10),
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn test_set_and_get_round_trip() {
        let (store, _temp_dir) = create_test_store();
        let entry = live_entry(b"{\"template\":\"Hello {name}\"}");

        store.set("greeting:v1", entry.clone()).await.unwrap();
        let fetched = store.get("greeting:v1").await.unwrap().unwrap();

        assert_eq!(fetched.payload, entry.payload);
        // Millisecond framing keeps the window within 1ms of the original.
        assert!((fetched.fresh_until - entry.fresh_until).num_milliseconds().abs() <= 1);
        assert!((fetched.stale_until - entry.stale_until).num_milliseconds().abs() <= 1);
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_expired_removes_entry() {
        let (store, _temp_dir) = create_test_store();
        store.set("dead", expired_entry()).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);

        assert!(store.get("dead").await.unwrap().is_none());
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (store, _temp_dir) = create_test_store();
        store.set("a", live_entry(b"1")).await.unwrap();
        store.set("b", live_entry(b"2")).await.unwrap();

        store.remove("a").await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert_eq!(store.len().await.unwrap(), 1);

        store.clear().await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let (store, _temp_dir) = create_test_store();
        store.set("live", live_entry(b"x")).await.unwrap();
        store.set("dead1", expired_entry()).await.unwrap();
        store.set("dead2", expired_entry()).await.unwrap();

        let removed = store.cleanup_expired().await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_if_absent() {
        let (store, _temp_dir) = create_test_store();
        let ttl = Duration::from_secs(10);

        assert!(store.put_if_absent("k:lock", ttl).await.unwrap());
        assert!(!store.put_if_absent("k:lock", ttl).await.unwrap());

        store.remove("k:lock").await.unwrap();
        assert!(store.put_if_absent("k:lock", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_put_if_absent_reclaims_expired_marker() {
        let (store, _temp_dir) = create_test_store();
        store.set("k:lock", expired_entry()).await.unwrap();

        assert!(store
            .put_if_absent("k:lock", Duration::from_secs(10))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();

        {
            let store = LmdbStore::new(temp_dir.path(), 10).unwrap();
            store.set("greeting", live_entry(b"hello")).await.unwrap();
        }

        let reopened = LmdbStore::new(temp_dir.path(), 10).unwrap();
        let entry = reopened.get("greeting").await.unwrap().unwrap();
        assert_eq!(entry.payload, b"hello");
    }

    #[tokio::test]
    async fn test_stats() {
        let (store, _temp_dir) = create_test_store();
        store.set("a", live_entry(b"1")).await.unwrap();

        let _ = store.get("a").await.unwrap(); // hit
        let _ = store.get("a").await.unwrap(); // hit
        let _ = store.get("missing").await.unwrap(); // miss

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_capability_probe_reports_atomic() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.as_atomic().is_some());
    }
}
