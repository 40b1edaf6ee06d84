//! Cache backend trait and usage statistics.
//!
//! This module defines the capability contract every storage tier implements.

use async_trait::async_trait;
use strata_core::{CacheKey, CacheResult};

/// Capability contract for a cache storage tier.
///
/// Implementations must be thread-safe: the cache is called from an arbitrary
/// number of worker tasks (parallel asset cooks, shader compiles) with no
/// cooperative scheduling. Decorator backends implement this same trait and
/// compose by holding another implementation, so chains nest arbitrarily.
///
/// # Value Ownership
///
/// Backends copy the caller's buffer on `put` and return owned bytes on
/// `get`; no aliasing with caller-held buffers is retained past the call
/// boundary. Zero-length values are valid.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Whether `put` calls are meaningful for this backend.
    ///
    /// Read-only tiers (a shared network cache mounted read-only, say) return
    /// `false` so callers can skip producing payloads the tier would discard.
    fn is_writable(&self) -> bool;

    /// Fast, possibly-approximate existence check.
    ///
    /// False positives are tolerated for performance; false negatives are
    /// not. No side effects.
    async fn probably_exists(&self, key: &CacheKey) -> bool;

    /// Fetch the bytes stored under `key`.
    ///
    /// Fails with [`CacheError::NotFound`](strata_core::CacheError::NotFound)
    /// when the key is absent; never returns partially populated data.
    async fn get(&self, key: &CacheKey) -> CacheResult<Vec<u8>>;

    /// Store `data` under `key`.
    ///
    /// With `overwrite = false` the call silently no-ops when the key already
    /// exists; with `overwrite = true` the entry is replaced.
    async fn put(&self, key: &CacheKey, data: &[u8], overwrite: bool) -> CacheResult<()>;

    /// Remove the entry for `key`. Removing an absent key is not an error.
    ///
    /// `transient` hints that the artifact is cheap to regenerate, letting a
    /// backend choose a lighter deletion path. Backends may ignore it.
    async fn remove(&self, key: &CacheKey, transient: bool) -> CacheResult<()>;

    /// Usage counters for this backend.
    async fn stats(&self) -> CacheStats;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of successful `get` calls.
    pub hits: u64,
    /// Number of `get` calls that found nothing.
    pub misses: u64,
    /// Number of entries currently stored.
    pub entry_count: u64,
    /// Number of `put` calls that stored or replaced data.
    pub puts: u64,
    /// Number of `remove` calls that deleted an entry.
    pub removes: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
