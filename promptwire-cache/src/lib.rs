//! Stale-while-revalidate caching for remotely-managed prompts.
//!
//! The crate layers three pieces over a pluggable storage backend:
//!
//! - [`CacheEntry`]: a payload with an explicit freshness window
//!   (`fresh_until`, `stale_until`) stamped at write time.
//! - [`CacheStore`] / [`AtomicStore`]: the backend seam. Every backend
//!   supports get/set/remove; backends that can additionally perform an
//!   atomic write-if-absent advertise it through the
//!   [`CacheStore::as_atomic`] capability probe.
//! - [`SwrCache`]: the orchestrator. It probes the backend once, fixes a
//!   [`FetchStrategy`], and then serves every lookup accordingly: fresh
//!   hits return immediately, stale hits return the old value while a
//!   bounded worker pool refreshes in the background, and misses fetch
//!   synchronously under a stampede lock when the backend can provide one.
//!
//! Two backends ship with the crate: [`InMemoryStore`], a bounded
//! in-process map with FIFO eviction, and [`LmdbStore`], an LMDB-backed
//! store shared by processes on the same host.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use promptwire_cache::{InMemoryStore, SwrCache};
//! use promptwire_core::CacheConfig;
//!
//! # async fn demo() -> promptwire_core::PromptwireResult<()> {
//! let store = Arc::new(InMemoryStore::new(1000));
//! let config = CacheConfig::new()
//!     .with_ttl(Duration::from_secs(60))
//!     .with_stale_ttl(Duration::from_secs(120));
//! let cache = SwrCache::new(store, config)?;
//!
//! let prompt: String = cache
//!     .fetch("greeting:v2", || async {
//!         // call the prompt registry here
//!         Ok("Hello, {name}!".to_string())
//!     })
//!     .await?;
//! # let _ = prompt;
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod lmdb;
pub mod lock;
pub mod memory;
pub mod refresh;
pub mod store;
pub mod swr;

pub use entry::{CacheEntry, EntryState};
pub use lmdb::LmdbStore;
pub use lock::{fetch_lock_key, refresh_lock_key};
pub use memory::InMemoryStore;
pub use refresh::{RefreshJob, RefreshPool};
pub use store::{AtomicStore, CacheStats, CacheStore};
pub use swr::{FetchStrategy, SwrCache};
