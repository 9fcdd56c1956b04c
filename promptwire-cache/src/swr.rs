//! Stale-while-revalidate orchestration.
//!
//! [`SwrCache`] is the decision procedure in front of a backend: it probes
//! the backend's capabilities once at construction and fixes a
//! [`FetchStrategy`], then drives every lookup through that strategy. A
//! caller supplies a key and a fetch closure that calls the origin; the
//! orchestrator decides whether the closure runs at all, runs under a
//! stampede lock, or runs in the background while stale data is served.
//!
//! Origin errors pass through unmodified on every synchronous path; a
//! background refresh that fails is logged and leaves the stale entry in
//! place for the next read to retry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use promptwire_core::{CacheConfig, CacheError, PromptwireResult};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::entry::{CacheEntry, EntryState};
use crate::lock;
use crate::refresh::{RefreshJob, RefreshPool};
use crate::store::{CacheStats, CacheStore};

/// Backoff schedule while waiting out another caller's fetch lock.
/// Total budget: 350 ms, after which the caller fetches directly.
const POLL_DELAYS: [Duration; 3] = [
    Duration::from_millis(50),
    Duration::from_millis(100),
    Duration::from_millis(200),
];

/// Bounded wait for in-flight refreshes during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The fetch strategy selected from backend capabilities and config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    /// Caching disabled (`ttl == 0`): the closure runs on every call.
    Bypass,
    /// Cache-then-fetch with no stampede protection. Acceptable only for
    /// low-contention call sites; selected when the backend lacks the
    /// atomic write-if-absent capability.
    Plain,
    /// Stampede-protected synchronous fetch.
    Locked,
    /// Full stale-while-revalidate with background refresh.
    StaleWhileRevalidate,
}

/// SWR cache orchestrator over a capability-probed backend.
pub struct SwrCache {
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
    strategy: FetchStrategy,
    pool: Option<Arc<RefreshPool>>,
}

impl SwrCache {
    /// Build an orchestrator over `store`.
    ///
    /// Validates the config, probes the backend once, and fixes the
    /// strategy for the cache's lifetime. The refresh pool is only
    /// created when the strategy is SWR.
    pub fn new(store: Arc<dyn CacheStore>, config: CacheConfig) -> PromptwireResult<Self> {
        config.validate()?;

        let atomic = store.as_atomic().is_some();
        let strategy = if config.caching_disabled() {
            FetchStrategy::Bypass
        } else if config.swr_enabled() && atomic {
            FetchStrategy::StaleWhileRevalidate
        } else if atomic {
            FetchStrategy::Locked
        } else {
            FetchStrategy::Plain
        };

        let pool = (strategy == FetchStrategy::StaleWhileRevalidate)
            .then(|| Arc::new(RefreshPool::new(config.refresh_threads)));

        Ok(Self {
            store,
            config,
            strategy,
            pool,
        })
    }

    /// The strategy fixed at construction.
    pub fn strategy(&self) -> FetchStrategy {
        self.strategy
    }

    /// The cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Resolve `key`, calling `fetcher` against the origin as the strategy
    /// demands.
    ///
    /// The returned value is exactly what the closure produced (or what an
    /// earlier closure produced, served from cache); origin errors
    /// propagate unwrapped.
    pub async fn fetch<T, F, Fut>(&self, key: &str, fetcher: F) -> PromptwireResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = PromptwireResult<T>> + Send + 'static,
    {
        match self.strategy {
            FetchStrategy::Bypass => fetcher().await,
            FetchStrategy::Plain => self.plain_fetch(key, fetcher).await,
            FetchStrategy::Locked => self.locked_fetch(key, fetcher).await,
            FetchStrategy::StaleWhileRevalidate => self.swr_fetch(key, fetcher).await,
        }
    }

    /// Drop a single cached entry.
    pub async fn invalidate(&self, key: &str) -> PromptwireResult<()> {
        self.store.remove(key).await
    }

    /// Drop every cached entry.
    pub async fn clear(&self) -> PromptwireResult<()> {
        self.store.clear().await
    }

    /// Sweep entries past their stale window.
    pub async fn cleanup_expired(&self) -> PromptwireResult<usize> {
        self.store.cleanup_expired().await
    }

    /// Backend hit/miss counters.
    pub async fn stats(&self) -> PromptwireResult<CacheStats> {
        self.store.stats().await
    }

    /// Stop the refresh pool, waiting (bounded) for in-flight refreshes.
    ///
    /// Idempotent, and a no-op when SWR never created a pool.
    pub async fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            pool.shutdown(SHUTDOWN_GRACE).await;
        }
    }

    // ------------------------------------------------------------------
    // Strategies
    // ------------------------------------------------------------------

    async fn plain_fetch<T, F, Fut>(&self, key: &str, fetcher: F) -> PromptwireResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = PromptwireResult<T>> + Send + 'static,
    {
        if let Some(entry) = self.store.get(key).await? {
            return decode(key, &entry);
        }
        self.fetch_and_store(key, fetcher).await
    }

    /// Stampede-protected fetch: the closure runs at most roughly once per
    /// stampede (best effort, not exactly once).
    async fn locked_fetch<T, F, Fut>(&self, key: &str, fetcher: F) -> PromptwireResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = PromptwireResult<T>> + Send + 'static,
    {
        if let Some(entry) = self.store.get(key).await? {
            return decode(key, &entry);
        }

        let Some(atomic) = self.store.as_atomic() else {
            // Capability vanished is impossible for our backends, but the
            // plain path is always a safe degradation.
            return self.fetch_and_store(key, fetcher).await;
        };

        let lock_key = lock::fetch_lock_key(key);
        if lock::try_acquire(atomic, &lock_key, self.config.lock_timeout).await? {
            let fetched = fetcher().await;
            let stored = match fetched {
                Ok(value) => self.write_value(key, &value).await.map(|()| value),
                Err(e) => Err(e),
            };
            // The lock is deleted before returning or raising, on every
            // path.
            let released = lock::release(self.store.as_ref(), &lock_key).await;
            let value = stored?;
            released?;
            return Ok(value);
        }

        // Another caller is fetching; poll for its result.
        for delay in POLL_DELAYS {
            tokio::time::sleep(delay).await;
            if let Some(entry) = self.store.get(key).await? {
                return decode(key, &entry);
            }
        }

        // The lock holder stalled or crashed without publishing; fetch
        // directly rather than starving this caller.
        debug!(key, "lock holder never published; fetching without lock");
        self.fetch_and_store(key, fetcher).await
    }

    /// Full SWR lookup: never blocks a reader on a refresh.
    async fn swr_fetch<T, F, Fut>(&self, key: &str, fetcher: F) -> PromptwireResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = PromptwireResult<T>> + Send + 'static,
    {
        match self.store.get(key).await? {
            Some(entry) => match entry.state(Utc::now()) {
                EntryState::Fresh => decode(key, &entry),
                EntryState::Stale => {
                    let value = decode(key, &entry)?;
                    self.schedule_refresh(key, fetcher).await;
                    Ok(value)
                }
                // The store filters expired entries; treat a straggler
                // like a miss.
                EntryState::Expired => self.fetch_and_store(key, fetcher).await,
            },
            None => self.fetch_and_store(key, fetcher).await,
        }
    }

    // ------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------

    /// Synchronous origin fetch; the result is cached, errors are not.
    async fn fetch_and_store<T, F, Fut>(&self, key: &str, fetcher: F) -> PromptwireResult<T>
    where
        T: Serialize + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = PromptwireResult<T>> + Send,
    {
        let value = fetcher().await?;
        self.write_value(key, &value).await?;
        Ok(value)
    }

    async fn write_value<T: Serialize>(&self, key: &str, value: &T) -> PromptwireResult<()> {
        let payload = encode(key, value)?;
        let entry = CacheEntry::new(payload, self.config.ttl, self.config.stale_ttl.normalized());
        self.store.set(key, entry).await
    }

    /// Best-effort refresh scheduling for a stale hit.
    ///
    /// Every failure mode here is silent toward the caller, who already
    /// holds a servable value: a held refresh lock means another refresh
    /// is in flight, a saturated pool drops the job (and releases the
    /// lock so a later read can retry), and backend errors are logged.
    async fn schedule_refresh<T, F, Fut>(&self, key: &str, fetcher: F)
    where
        T: Serialize + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = PromptwireResult<T>> + Send + 'static,
    {
        let Some(pool) = &self.pool else { return };
        let Some(atomic) = self.store.as_atomic() else {
            return;
        };

        // The refresh lock's TTL doubles as a dead-man's switch: a refresh
        // that never completes frees the key once the base TTL elapses.
        let refresh_key = lock::refresh_lock_key(key);
        match lock::try_acquire(atomic, &refresh_key, self.config.ttl).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(key, "refresh already in flight");
                return;
            }
            Err(e) => {
                warn!(key, error = %e, "could not take refresh lock");
                return;
            }
        }

        let store = Arc::clone(&self.store);
        let ttl = self.config.ttl;
        let stale_ttl = self.config.stale_ttl.normalized();
        let key_owned = key.to_string();

        let job: RefreshJob = Box::pin(async move {
            match fetcher().await {
                Ok(value) => match encode(&key_owned, &value) {
                    Ok(payload) => {
                        let entry = CacheEntry::new(payload, ttl, stale_ttl);
                        if let Err(e) = store.set(&key_owned, entry).await {
                            warn!(key = %key_owned, error = %e, "background refresh write failed");
                        }
                    }
                    Err(e) => {
                        warn!(key = %key_owned, error = %e, "background refresh encode failed");
                    }
                },
                Err(e) => {
                    warn!(key = %key_owned, error = %e, "background refresh failed");
                }
            }
            // Guaranteed-cleanup path: runs after success and failure
            // alike.
            if let Err(e) = lock::release(store.as_ref(), &lock::refresh_lock_key(&key_owned)).await
            {
                warn!(key = %key_owned, error = %e, "could not release refresh lock");
            }
        });

        if !pool.try_schedule(job) {
            debug!(key, "refresh pool saturated; dropping refresh");
            if let Err(e) = lock::release(self.store.as_ref(), &refresh_key).await {
                warn!(key, error = %e, "could not release refresh lock after discard");
            }
        }
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> PromptwireResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| {
        CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn decode<T: DeserializeOwned>(key: &str, entry: &CacheEntry) -> PromptwireResult<T> {
    serde_json::from_slice(&entry.payload).map_err(|e| {
        CacheError::Deserialization {
            key: key.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
