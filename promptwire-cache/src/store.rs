//! Cache backend traits and capability probing.
//!
//! A backend is a capability set, not a class hierarchy. Every store
//! implements [`CacheStore`]; stores that can additionally perform an
//! atomic "write-if-absent with TTL" advertise it through
//! [`CacheStore::as_atomic`]. The orchestrator probes that capability once
//! and degrades gracefully when it is absent, so a minimal store can later
//! be upgraded to one with stampede protection without touching callers.

use async_trait::async_trait;
use promptwire_core::PromptwireResult;
use std::time::Duration;

use crate::entry::CacheEntry;

/// Base storage operations every backend supports.
///
/// # Expiry
///
/// `get` never returns an entry past its `stale_until`; implementations
/// remove such entries lazily on read. Entries inside the stale window are
/// returned — classifying stale vs fresh is the orchestrator's job.
///
/// # Errors
///
/// Backend I/O failures propagate to the caller unchanged as
/// [`promptwire_core::CacheError`] variants; the cache never masks them.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a non-expired entry, removing it lazily if it has expired.
    async fn get(&self, key: &str) -> PromptwireResult<Option<CacheEntry>>;

    /// Write an entry, overwriting any previous entry under the key.
    async fn set(&self, key: &str, entry: CacheEntry) -> PromptwireResult<()>;

    /// Remove an entry (or lock marker) if present.
    async fn remove(&self, key: &str) -> PromptwireResult<()>;

    /// Remove every entry.
    async fn clear(&self) -> PromptwireResult<()>;

    /// Number of entries currently held, expired or not.
    async fn len(&self) -> PromptwireResult<usize>;

    /// Sweep out entries past their `stale_until`.
    ///
    /// Returns the number of entries removed.
    async fn cleanup_expired(&self) -> PromptwireResult<usize>;

    /// Hit/miss/eviction counters for this store.
    async fn stats(&self) -> PromptwireResult<CacheStats>;

    /// Probe for the atomic write-if-absent capability.
    ///
    /// Stores without it get plain cache-then-fetch behavior from the
    /// orchestrator; stores with it additionally get stampede protection
    /// and stale-while-revalidate.
    fn as_atomic(&self) -> Option<&dyn AtomicStore> {
        None
    }
}

/// Atomic "write-if-absent with TTL" capability.
///
/// This single primitive derives both lock kinds the cache needs: the
/// stampede-protection lock and the refresh-deduplication lock. Markers are
/// plain entries, so releasing a lock is the base [`CacheStore::remove`].
#[async_trait]
pub trait AtomicStore: CacheStore {
    /// Atomically create a lock marker under `key` unless a live one exists.
    ///
    /// Returns `true` when this caller created the marker (acquired the
    /// lock). An expired marker counts as absent.
    async fn put_if_absent(&self, key: &str, ttl: Duration) -> PromptwireResult<bool>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in the store.
    pub entry_count: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
