//! Error types for cache operations

use crate::key::CacheKey;
use thiserror::Error;

/// Result alias used across the cache crates.
pub type CacheResult<T> = Result<T, CacheError>;

/// Cache layer errors.
///
/// `NotFound` is expected in normal operation (cold cache) and callers are
/// expected to regenerate the value. A verification mismatch is deliberately
/// NOT an error variant: it surfaces only through the log stream and
/// diagnostic files, never through a backend's return value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache entry not found for key {key}")]
    NotFound { key: CacheKey },

    #[error("Backend I/O failure: {reason}")]
    BackendIo { reason: String },

    #[error("Invalid cache key: {reason}")]
    InvalidKey { reason: String },

    #[error("Backend is read-only")]
    ReadOnly,

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

impl CacheError {
    /// Shorthand for the common not-found case.
    pub fn not_found(key: &CacheKey) -> Self {
        Self::NotFound { key: key.clone() }
    }

    /// Wrap an I/O error, keeping the taxonomy `Clone + PartialEq`.
    pub fn io(err: std::io::Error) -> Self {
        Self::BackendIo {
            reason: err.to_string(),
        }
    }

    /// Whether this error is the recoverable cache-miss case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
