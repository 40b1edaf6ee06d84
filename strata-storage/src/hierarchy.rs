//! Hierarchical cache backend.
//!
//! Composes an ordered list of tiers - cheapest first - into one backend.
//! Reads walk the tiers in order and back-fill earlier writable tiers on a
//! hit, so a blob fetched once from a slow shared tier is served locally
//! afterwards. Back-fill puts use `overwrite = false`, which deduplicates
//! redundant writes: a tier that already holds the key is left untouched.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use strata_core::{CacheError, CacheKey, CacheResult};

use crate::traits::{CacheBackend, CacheStats};

/// Ordered chain of cache tiers behind a single backend interface.
pub struct HierarchyBackend {
    tiers: Vec<Arc<dyn CacheBackend>>,
}

impl HierarchyBackend {
    /// Create a hierarchy from `tiers`, ordered cheapest to slowest.
    pub fn new(tiers: Vec<Arc<dyn CacheBackend>>) -> Self {
        Self { tiers }
    }

    /// Number of tiers in the chain.
    pub fn tier_count(&self) -> usize {
        self.tiers.len()
    }
}

#[async_trait]
impl CacheBackend for HierarchyBackend {
    fn is_writable(&self) -> bool {
        self.tiers.iter().any(|tier| tier.is_writable())
    }

    async fn probably_exists(&self, key: &CacheKey) -> bool {
        for tier in &self.tiers {
            if tier.probably_exists(key).await {
                return true;
            }
        }
        false
    }

    /// First hit wins; tiers above the hit are back-filled best-effort.
    async fn get(&self, key: &CacheKey) -> CacheResult<Vec<u8>> {
        for (index, tier) in self.tiers.iter().enumerate() {
            match tier.get(key).await {
                Ok(data) => {
                    for upper in &self.tiers[..index] {
                        if !upper.is_writable() {
                            continue;
                        }
                        if let Err(err) = upper.put(key, &data, false).await {
                            warn!(key = %key, %err, "tier back-fill failed");
                        }
                    }
                    if index > 0 {
                        debug!(key = %key, tier = index, "served from lower tier");
                    }
                    return Ok(data);
                }
                Err(CacheError::NotFound { .. }) => continue,
                Err(err) => {
                    // A sick tier should not mask a healthy one below it.
                    warn!(key = %key, tier = index, %err, "tier read failed; trying next");
                    continue;
                }
            }
        }
        Err(CacheError::not_found(key))
    }

    /// Fans out to every writable tier. Failing tiers are logged and
    /// skipped; the put succeeds if any writable tier accepted it.
    async fn put(&self, key: &CacheKey, data: &[u8], overwrite: bool) -> CacheResult<()> {
        let mut stored = false;
        let mut last_err = None;
        for (index, tier) in self.tiers.iter().enumerate() {
            if !tier.is_writable() {
                continue;
            }
            match tier.put(key, data, overwrite).await {
                Ok(()) => stored = true,
                Err(err) => {
                    warn!(key = %key, tier = index, %err, "tier put failed");
                    last_err = Some(err);
                }
            }
        }
        match (stored, last_err) {
            (true, _) => Ok(()),
            (false, Some(err)) => Err(err),
            (false, None) => Err(CacheError::ReadOnly),
        }
    }

    async fn remove(&self, key: &CacheKey, transient: bool) -> CacheResult<()> {
        for (index, tier) in self.tiers.iter().enumerate() {
            if let Err(err) = tier.remove(key, transient).await {
                warn!(key = %key, tier = index, %err, "tier remove failed");
            }
        }
        Ok(())
    }

    /// Aggregated counters across all tiers.
    async fn stats(&self) -> CacheStats {
        let mut total = CacheStats::default();
        for tier in &self.tiers {
            let stats = tier.stats().await;
            total.hits += stats.hits;
            total.misses += stats.misses;
            total.entry_count += stats.entry_count;
            total.puts += stats.puts;
            total.removes += stats.removes;
        }
        total
    }
}
