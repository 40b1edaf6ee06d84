//! Opaque cache key type.
//!
//! The only way to obtain a [`CacheKey`] is the validating `new()`
//! constructor, so every key flowing through the backend chain is known to be
//! non-empty and NUL-free. Backends treat keys as arbitrary map keys:
//! equality and hashing only, no semantic structure.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CacheError, CacheResult};

/// An opaque, case-sensitive identifier for one cached artifact.
///
/// Globally unique per distinct artifact; two producers that generate the
/// same key are claiming to produce the same bytes, which is exactly the
/// claim the verifying backend checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CacheKey(String);

impl CacheKey {
    /// Create a key, rejecting empty strings and embedded NUL bytes.
    pub fn new(key: impl Into<String>) -> CacheResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(CacheError::InvalidKey {
                reason: "key is empty".to_string(),
            });
        }
        if key.contains('\0') {
            return Err(CacheError::InvalidKey {
                reason: "key contains an embedded NUL byte".to_string(),
            });
        }
        Ok(Self(key))
    }

    /// The raw key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key as bytes, for hashing into storage paths.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// File-name-safe rendering of this key.
    ///
    /// Every byte outside `[A-Za-z0-9._-]` maps to `_`. Collisions are
    /// acceptable: the output names best-effort diagnostic dumps, not primary
    /// storage, and keys in practice are already file-name shaped.
    pub fn sanitized_file_name(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = CacheError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for CacheKey {
    type Error = CacheError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}
