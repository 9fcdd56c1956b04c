//! Bounded in-process cache store.
//!
//! A capped map from key to [`CacheEntry`] with insertion-order (FIFO)
//! eviction: when a write overflows `max_size`, the earliest-inserted key
//! is dropped, not the least recently used one. That policy is deliberate
//! and cheap to reason about; see DESIGN.md before "fixing" it to LRU.
//!
//! Holds no state across restarts. Lock markers live in the same map under
//! their namespaced keys and count toward capacity.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use promptwire_core::{CacheError, PromptwireResult};

use crate::entry::CacheEntry;
use crate::store::{AtomicStore, CacheStats, CacheStore};

#[derive(Debug, Default)]
struct StoreInner {
    entries: HashMap<String, CacheEntry>,
    /// Keys in insertion order; the front is next to evict.
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl StoreInner {
    fn remove_key(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    fn insert(&mut self, key: &str, entry: CacheEntry, max_size: usize) {
        if self.entries.insert(key.to_string(), entry).is_none() {
            self.order.push_back(key.to_string());
        }
        while self.entries.len() > max_size {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            self.evictions += 1;
        }
    }
}

/// Bounded in-process store with FIFO eviction.
pub struct InMemoryStore {
    max_size: usize,
    inner: Mutex<StoreInner>,
}

impl InMemoryStore {
    /// Create a store capped at `max_size` entries.
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// The configured capacity.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn locked(&self) -> PromptwireResult<MutexGuard<'_, StoreInner>> {
        self.inner
            .lock()
            .map_err(|_| CacheError::LockPoisoned.into())
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn get(&self, key: &str) -> PromptwireResult<Option<CacheEntry>> {
        let mut inner = self.locked()?;
        let now = Utc::now();

        let expired = matches!(inner.entries.get(key), Some(entry) if entry.is_expired(now));
        if expired {
            inner.remove_key(key);
            inner.misses += 1;
            return Ok(None);
        }

        match inner.entries.get(key).cloned() {
            Some(entry) => {
                inner.hits += 1;
                Ok(Some(entry))
            }
            None => {
                inner.misses += 1;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> PromptwireResult<()> {
        let mut inner = self.locked()?;
        inner.insert(key, entry, self.max_size);
        Ok(())
    }

    async fn remove(&self, key: &str) -> PromptwireResult<()> {
        let mut inner = self.locked()?;
        inner.remove_key(key);
        Ok(())
    }

    async fn clear(&self) -> PromptwireResult<()> {
        let mut inner = self.locked()?;
        inner.entries.clear();
        inner.order.clear();
        Ok(())
    }

    async fn len(&self) -> PromptwireResult<usize> {
        Ok(self.locked()?.entries.len())
    }

    async fn cleanup_expired(&self) -> PromptwireResult<usize> {
        let mut inner = self.locked()?;
        let now = Utc::now();

        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            inner.remove_key(key);
        }
        Ok(expired.len())
    }

    async fn stats(&self) -> PromptwireResult<CacheStats> {
        let inner = self.locked()?;
        Ok(CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entry_count: inner.entries.len() as u64,
            evictions: inner.evictions,
        })
    }

    fn as_atomic(&self) -> Option<&dyn AtomicStore> {
        Some(self)
    }
}

#[async_trait]
impl AtomicStore for InMemoryStore {
    async fn put_if_absent(&self, key: &str, ttl: Duration) -> PromptwireResult<bool> {
        let mut inner = self.locked()?;
        let now = Utc::now();

        if let Some(existing) = inner.entries.get(key) {
            if !existing.is_expired(now) {
                return Ok(false);
            }
        }
        inner.insert(key, CacheEntry::marker(ttl), self.max_size);
        Ok(true)
    }
}
