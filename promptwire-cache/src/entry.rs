//! Cache entry value object with an explicit freshness window.
//!
//! An entry carries its payload plus two wall-clock instants set at write
//! time: `fresh_until = now + ttl` and `stale_until = now + ttl + stale_ttl`.
//! Entries are immutable; a newer write supersedes rather than mutates.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Freshness state of a cache entry at a point in time.
///
/// States are mutually exclusive and monotonic: an entry moves fresh →
/// stale → expired and never backward. A missing entry is equivalent to
/// `Expired`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// `now < fresh_until`: serve with no revalidation action.
    Fresh,
    /// `fresh_until <= now < stale_until`: serve, refresh in background.
    Stale,
    /// `now >= stale_until`: must not be served.
    Expired,
}

/// A cached value with its freshness window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Opaque serialized payload.
    pub payload: Vec<u8>,
    /// Instant after which the entry is no longer guaranteed fresh.
    pub fresh_until: DateTime<Utc>,
    /// Instant after which the entry must not be served at all.
    pub stale_until: DateTime<Utc>,
}

/// Clamp a std duration into chrono space without panicking on absurd
/// inputs (the indefinite stale window is ~10 years).
fn to_chrono(d: Duration) -> ChronoDuration {
    ChronoDuration::from_std(d).unwrap_or_else(|_| ChronoDuration::MAX)
}

impl CacheEntry {
    /// Create an entry whose window starts now.
    pub fn new(payload: Vec<u8>, ttl: Duration, stale_ttl: Duration) -> Self {
        Self::with_start(payload, Utc::now(), ttl, stale_ttl)
    }

    /// Create an entry whose window starts at an explicit instant.
    pub fn with_start(
        payload: Vec<u8>,
        start: DateTime<Utc>,
        ttl: Duration,
        stale_ttl: Duration,
    ) -> Self {
        let fresh_until = start
            .checked_add_signed(to_chrono(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let stale_until = fresh_until
            .checked_add_signed(to_chrono(stale_ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            payload,
            fresh_until,
            stale_until,
        }
    }

    /// Create a lock marker: empty payload, no stale window.
    ///
    /// Marker presence is the lock; once `ttl` elapses the marker reads as
    /// expired and the lock is free again.
    pub fn marker(ttl: Duration) -> Self {
        Self::new(Vec::new(), ttl, Duration::ZERO)
    }

    /// Classify the entry relative to `now`.
    pub fn state(&self, now: DateTime<Utc>) -> EntryState {
        if now < self.fresh_until {
            EntryState::Fresh
        } else if now < self.stale_until {
            EntryState::Stale
        } else {
            EntryState::Expired
        }
    }

    /// True while the entry needs no revalidation.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == EntryState::Fresh
    }

    /// True while the entry may be served but should be refreshed.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == EntryState::Stale
    }

    /// True once the entry must no longer be served.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == EntryState::Expired
    }
}
