//! Cache key construction for remotely-managed prompts.
//!
//! A prompt is addressed by its identifier plus at most one disambiguator:
//! a pinned version number or a deployment label. Version and label select
//! different remote resources, so callers must not request both for one
//! fetch; the key still encodes both when given both, keeping the mistake
//! visible in logs instead of silently collapsing two lookups into one.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Cache key for a prompt lookup.
///
/// Construction rules:
/// - `greeting` — identifier alone
/// - `greeting:v3` — identifier pinned to version 3
/// - `greeting:prod` — identifier under the `prod` label
/// - `greeting:v3:prod` — both given (caller error, but encoded)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromptKey(String);

impl PromptKey {
    /// Key for the latest version of a prompt.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    /// Key for a prompt pinned to a specific version.
    pub fn with_version(identifier: &str, version: u32) -> Self {
        Self(format!("{identifier}:v{version}"))
    }

    /// Key for a prompt under a deployment label.
    pub fn with_label(identifier: &str, label: &str) -> Self {
        Self(format!("{identifier}:{label}"))
    }

    /// Build a key from an identifier and optional disambiguators.
    ///
    /// Version takes precedence in meaning, but both are encoded when both
    /// are present.
    pub fn build(identifier: &str, version: Option<u32>, label: Option<&str>) -> Self {
        match (version, label) {
            (None, None) => Self::new(identifier),
            (Some(v), None) => Self::with_version(identifier, v),
            (None, Some(l)) => Self::with_label(identifier, l),
            (Some(v), Some(l)) => Self(format!("{identifier}:v{v}:{l}")),
        }
    }

    /// The encoded key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key and return the encoded string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PromptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PromptKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
