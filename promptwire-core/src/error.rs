//! Error types for promptwire operations

use std::time::Duration;
use thiserror::Error;

/// Cache layer errors.
///
/// These surface backend I/O failures unchanged; the cache never masks a
/// storage failure behind a stale value or a silent miss.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache lock poisoned")]
    LockPoisoned,

    #[error("Backend operation failed: {reason}")]
    Backend { reason: String },

    #[error("Serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Deserialization failed for key {key}: {reason}")]
    Deserialization { key: String, reason: String },
}

/// Origin-fetch errors.
///
/// Raised by the fetch closures that call the remote prompt registry.
/// Synchronous fetch paths propagate these to the caller unmodified;
/// background refresh tasks catch and log them instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OriginError {
    #[error("Request to {endpoint} failed with status {status}: {message}")]
    RequestFailed {
        endpoint: String,
        status: i32,
        message: String,
    },

    #[error("Request to {endpoint} timed out after {elapsed:?}")]
    Timeout { endpoint: String, elapsed: Duration },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("Resource not found: {identifier}")]
    NotFound { identifier: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },
}

/// Master error type for all promptwire errors.
#[derive(Debug, Clone, Error)]
pub enum PromptwireError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Origin error: {0}")]
    Origin(#[from] OriginError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for promptwire operations.
pub type PromptwireResult<T> = Result<T, PromptwireError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_display_backend() {
        let err = CacheError::Backend {
            reason: "mmap failed".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Backend operation failed"));
        assert!(msg.contains("mmap failed"));
    }

    #[test]
    fn test_cache_error_display_deserialization() {
        let err = CacheError::Deserialization {
            key: "greeting:v2".to_string(),
            reason: "unexpected EOF".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("greeting:v2"));
        assert!(msg.contains("unexpected EOF"));
    }

    #[test]
    fn test_origin_error_display_request_failed() {
        let err = OriginError::RequestFailed {
            endpoint: "/prompts/greeting".to_string(),
            status: 503,
            message: "upstream unavailable".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("/prompts/greeting"));
        assert!(msg.contains("503"));
        assert!(msg.contains("upstream unavailable"));
    }

    #[test]
    fn test_origin_error_display_timeout() {
        let err = OriginError::Timeout {
            endpoint: "/scores".to_string(),
            elapsed: Duration::from_secs(30),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("/scores"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "refresh_threads".to_string(),
            value: "0".to_string(),
            reason: "must be at least 1".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("refresh_threads"));
        assert!(msg.contains("must be at least 1"));
    }

    #[test]
    fn test_promptwire_error_from_variants() {
        let cache = PromptwireError::from(CacheError::LockPoisoned);
        assert!(matches!(cache, PromptwireError::Cache(_)));

        let origin = PromptwireError::from(OriginError::NotFound {
            identifier: "greeting".to_string(),
        });
        assert!(matches!(origin, PromptwireError::Origin(_)));

        let config = PromptwireError::from(ConfigError::MissingRequired {
            field: "api_key".to_string(),
        });
        assert!(matches!(config, PromptwireError::Config(_)));
    }
}
