//! Cache configuration and staleness-window normalization.
//!
//! Configuration is an explicit struct handed to the cache at construction.
//! There is no module-level or global cache state; two caches with two
//! configs coexist without interference.

use std::time::Duration;

use crate::error::ConfigError;

/// Normalized value for [`StaleTtl::Indefinite`]: ten years.
///
/// An entry written with an indefinite stale window effectively never
/// leaves the stale window until a synchronous refresh overwrites it.
pub const INDEFINITE_STALE_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Stale window configuration for stale-while-revalidate.
///
/// `Bounded(Duration::ZERO)` disables SWR entirely; the cache then always
/// takes a synchronous fetch path once freshness expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleTtl {
    /// Serve stale data for at most this long past freshness expiry.
    Bounded(Duration),
    /// Serve stale data indefinitely while refreshes are attempted.
    Indefinite,
}

impl StaleTtl {
    /// The stale window as a concrete duration.
    ///
    /// Normalization never mutates the configured value; callers may
    /// normalize repeatedly and always observe the same result.
    pub fn normalized(&self) -> Duration {
        match self {
            StaleTtl::Bounded(d) => *d,
            StaleTtl::Indefinite => INDEFINITE_STALE_TTL,
        }
    }

    /// True when SWR is disabled (zero stale window).
    pub fn is_disabled(&self) -> bool {
        matches!(self, StaleTtl::Bounded(d) if d.is_zero())
    }
}

impl Default for StaleTtl {
    fn default() -> Self {
        StaleTtl::Bounded(Duration::ZERO)
    }
}

impl From<Duration> for StaleTtl {
    fn from(d: Duration) -> Self {
        StaleTtl::Bounded(d)
    }
}

/// Configuration for the prompt cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Freshness window for cached entries. Zero disables caching.
    pub ttl: Duration,
    /// Maximum number of entries the bounded in-process store holds.
    pub max_size: usize,
    /// Stale window past freshness expiry; zero disables SWR.
    pub stale_ttl: StaleTtl,
    /// Worker ceiling for the background refresh pool.
    pub refresh_threads: usize,
    /// TTL on the stampede-protection lock record.
    pub lock_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            max_size: 1000,
            stale_ttl: StaleTtl::default(),
            refresh_threads: 4,
            lock_timeout: Duration::from_secs(10),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the freshness window. Zero disables caching.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the bounded-store capacity.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the stale window.
    pub fn with_stale_ttl(mut self, stale_ttl: impl Into<StaleTtl>) -> Self {
        self.stale_ttl = stale_ttl.into();
        self
    }

    /// Set the refresh worker ceiling.
    pub fn with_refresh_threads(mut self, refresh_threads: usize) -> Self {
        self.refresh_threads = refresh_threads;
        self
    }

    /// Set the stampede-lock TTL.
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// True when caching is disabled entirely.
    pub fn caching_disabled(&self) -> bool {
        self.ttl.is_zero()
    }

    /// True when stale-while-revalidate is enabled.
    pub fn swr_enabled(&self) -> bool {
        !self.caching_disabled() && !self.stale_ttl.is_disabled()
    }

    /// Validate the configuration.
    ///
    /// Values that would only matter on a disabled path (e.g.
    /// `refresh_threads` with SWR off) are not rejected.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.swr_enabled() && self.refresh_threads == 0 {
            return Err(ConfigError::InvalidValue {
                field: "refresh_threads".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1 when stale_ttl is non-zero".to_string(),
            });
        }
        if !self.caching_disabled() && self.lock_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "lock_timeout".to_string(),
                value: "0".to_string(),
                reason: "lock records need a non-zero TTL".to_string(),
            });
        }
        if !self.caching_disabled() && self.max_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_size".to_string(),
                value: "0".to_string(),
                reason: "bounded store needs room for at least one entry".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = CacheConfig::new()
            .with_ttl(Duration::from_secs(300))
            .with_max_size(50)
            .with_stale_ttl(Duration::from_secs(600))
            .with_refresh_threads(2)
            .with_lock_timeout(Duration::from_secs(5));

        assert_eq!(config.ttl, Duration::from_secs(300));
        assert_eq!(config.max_size, 50);
        assert_eq!(config.stale_ttl, StaleTtl::Bounded(Duration::from_secs(600)));
        assert_eq!(config.refresh_threads, 2);
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_stale_ttl_zero_disables_swr() {
        let config = CacheConfig::default();
        assert!(config.stale_ttl.is_disabled());
        assert!(!config.swr_enabled());

        let config = config.with_stale_ttl(Duration::from_secs(120));
        assert!(config.swr_enabled());
    }

    #[test]
    fn test_zero_ttl_disables_caching_and_swr() {
        let config = CacheConfig::new()
            .with_ttl(Duration::ZERO)
            .with_stale_ttl(StaleTtl::Indefinite);
        assert!(config.caching_disabled());
        assert!(!config.swr_enabled());
    }

    #[test]
    fn test_indefinite_normalizes_to_large_constant() {
        let stale_ttl = StaleTtl::Indefinite;
        let normalized = stale_ttl.normalized();

        // Several orders of magnitude larger than any realistic ttl.
        assert!(normalized >= Duration::from_secs(100_000_000));
        assert_eq!(normalized, INDEFINITE_STALE_TTL);
    }

    #[test]
    fn test_normalization_does_not_mutate() {
        let stale_ttl = StaleTtl::Indefinite;
        let first = stale_ttl.normalized();
        let second = stale_ttl.normalized();
        assert_eq!(first, second);
        assert_eq!(stale_ttl, StaleTtl::Indefinite);

        let bounded = StaleTtl::Bounded(Duration::from_secs(120));
        assert_eq!(bounded.normalized(), Duration::from_secs(120));
        assert_eq!(bounded, StaleTtl::Bounded(Duration::from_secs(120)));
    }

    #[test]
    fn test_validate_rejects_zero_refresh_threads_with_swr() {
        let config = CacheConfig::new()
            .with_stale_ttl(Duration::from_secs(60))
            .with_refresh_threads(0);
        assert!(config.validate().is_err());

        // With SWR off the worker count is irrelevant.
        let config = CacheConfig::new().with_refresh_threads(0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_lock_timeout() {
        let config = CacheConfig::new().with_lock_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        // Caching disabled: lock records never get written.
        let config = CacheConfig::new()
            .with_ttl(Duration::ZERO)
            .with_lock_timeout(Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_max_size() {
        let config = CacheConfig::new().with_max_size(0);
        assert!(config.validate().is_err());
    }
}
