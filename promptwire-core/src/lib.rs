//! Promptwire Core - Shared Types
//!
//! Leaf types shared across the promptwire client: the error taxonomy,
//! cache key construction for prompt lookups, and cache configuration.
//! The cache subsystem itself lives in `promptwire-cache`.

pub mod config;
pub mod error;
pub mod key;

pub use config::{CacheConfig, StaleTtl, INDEFINITE_STALE_TTL};
pub use error::{CacheError, ConfigError, OriginError, PromptwireError, PromptwireResult};
pub use key::PromptKey;
