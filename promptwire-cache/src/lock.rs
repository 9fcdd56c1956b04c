//! Lock primitive derived from the backend's write-if-absent operation.
//!
//! A lock is a marker entry under a namespaced key with a short TTL: its
//! presence is the lock, its absence (including TTL expiry) means free.
//! Nobody tracks an owner; whoever created the marker releases it, and a
//! holder that dies without releasing is fenced out by the TTL.
//!
//! Two independent namespaces keep the synchronous stampede lock and the
//! background refresh lock from ever contending on the same record.

use std::time::Duration;

use promptwire_core::PromptwireResult;

use crate::store::{AtomicStore, CacheStore};

/// Suffix for the stampede-protection lock on synchronous fetches.
pub const FETCH_LOCK_SUFFIX: &str = ":lock";

/// Suffix for the background-refresh deduplication lock.
pub const REFRESH_LOCK_SUFFIX: &str = ":refreshing";

/// Lock key guarding a synchronous fetch of `key`.
pub fn fetch_lock_key(key: &str) -> String {
    format!("{key}{FETCH_LOCK_SUFFIX}")
}

/// Lock key guarding a background refresh of `key`.
pub fn refresh_lock_key(key: &str) -> String {
    format!("{key}{REFRESH_LOCK_SUFFIX}")
}

/// Try to take the lock at `lock_key`.
///
/// Returns `true` when this caller now holds it. Holding lasts until
/// [`release`] or until `ttl` elapses, whichever comes first.
pub async fn try_acquire(
    store: &dyn AtomicStore,
    lock_key: &str,
    ttl: Duration,
) -> PromptwireResult<bool> {
    store.put_if_absent(lock_key, ttl).await
}

/// Release the lock at `lock_key`.
///
/// Releasing a lock that already expired (or was never held) is a no-op;
/// best-effort lock semantics tolerate double release.
pub async fn release(store: &dyn CacheStore, lock_key: &str) -> PromptwireResult<()> {
    store.remove(lock_key).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryStore;

    #[test]
    fn test_lock_namespaces_are_distinct() {
        let key = "greeting:v2";
        assert_eq!(fetch_lock_key(key), "greeting:v2:lock");
        assert_eq!(refresh_lock_key(key), "greeting:v2:refreshing");
        assert_ne!(fetch_lock_key(key), refresh_lock_key(key));
    }

    #[tokio::test]
    async fn test_acquire_release_cycle() {
        let store = InMemoryStore::new(10);
        let lock_key = fetch_lock_key("greeting");
        let ttl = Duration::from_secs(10);

        assert!(try_acquire(&store, &lock_key, ttl).await.unwrap());
        assert!(!try_acquire(&store, &lock_key, ttl).await.unwrap());

        release(&store, &lock_key).await.unwrap();
        assert!(try_acquire(&store, &lock_key, ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_and_refresh_locks_do_not_contend() {
        let store = InMemoryStore::new(10);
        let ttl = Duration::from_secs(10);

        assert!(try_acquire(&store, &fetch_lock_key("k"), ttl).await.unwrap());
        // A refresh can still take its own lock for the same cache key.
        assert!(try_acquire(&store, &refresh_lock_key("k"), ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_double_release_is_noop() {
        let store = InMemoryStore::new(10);
        let lock_key = refresh_lock_key("k");

        assert!(try_acquire(&store, &lock_key, Duration::from_secs(5))
            .await
            .unwrap());
        release(&store, &lock_key).await.unwrap();
        release(&store, &lock_key).await.unwrap();
    }
}
