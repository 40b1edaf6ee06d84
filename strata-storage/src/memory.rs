//! In-memory cache backend.
//!
//! The cheapest tier: a process-local map. Also the reference implementation
//! the decorator tests drive, since it needs no filesystem setup.
//!
//! # Thread Safety
//!
//! Entries live behind an `RwLock`; a poisoned data lock surfaces as
//! `CacheError::LockPoisoned`. Statistics are tracked best-effort under their
//! own lock and never fail an operation.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use strata_core::{CacheError, CacheKey, CacheResult};

use crate::traits::{CacheBackend, CacheStats};

/// In-memory byte-blob store.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<CacheKey, Vec<u8>>>,
    stats: RwLock<CacheStats>,
    read_only: bool,
}

impl MemoryBackend {
    /// Create an empty writable backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty backend that refuses puts.
    ///
    /// Useful for modelling a read-only shared tier in tests.
    pub fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    /// Number of entries currently stored.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    /// Whether the backend holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store an entry directly, bypassing the writability flag and stats.
    ///
    /// Test seam for placing data "out-of-band", the way an older process or
    /// another machine would have populated a shared tier.
    pub fn seed(&self, key: &CacheKey, data: &[u8]) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.clone(), data.to_vec());
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn is_writable(&self) -> bool {
        !self.read_only
    }

    async fn probably_exists(&self, key: &CacheKey) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(key))
            .unwrap_or(false)
    }

    async fn get(&self, key: &CacheKey) -> CacheResult<Vec<u8>> {
        let entries = self.entries.read().map_err(|_| CacheError::LockPoisoned)?;
        match entries.get(key) {
            Some(data) => {
                if let Ok(mut stats) = self.stats.write() {
                    stats.hits += 1;
                }
                Ok(data.clone())
            }
            None => {
                if let Ok(mut stats) = self.stats.write() {
                    stats.misses += 1;
                }
                Err(CacheError::not_found(key))
            }
        }
    }

    async fn put(&self, key: &CacheKey, data: &[u8], overwrite: bool) -> CacheResult<()> {
        if self.read_only {
            return Err(CacheError::ReadOnly);
        }
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        if !overwrite && entries.contains_key(key) {
            return Ok(());
        }
        entries.insert(key.clone(), data.to_vec());
        if let Ok(mut stats) = self.stats.write() {
            stats.puts += 1;
        }
        Ok(())
    }

    async fn remove(&self, key: &CacheKey, _transient: bool) -> CacheResult<()> {
        if self.read_only {
            return Ok(());
        }
        let mut entries = self.entries.write().map_err(|_| CacheError::LockPoisoned)?;
        if entries.remove(key).is_some() {
            if let Ok(mut stats) = self.stats.write() {
                stats.removes += 1;
            }
        }
        Ok(())
    }

    async fn stats(&self) -> CacheStats {
        let mut stats = self
            .stats
            .read()
            .map(|stats| stats.clone())
            .unwrap_or_default();
        stats.entry_count = self.len() as u64;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> CacheKey {
        CacheKey::new(raw).unwrap()
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let backend = MemoryBackend::new();
        let k = key("shader_42");

        assert!(backend.get(&k).await.unwrap_err().is_not_found());
        backend.put(&k, b"bytecode", true).await.unwrap();
        assert_eq!(backend.get(&k).await.unwrap(), b"bytecode");
        assert!(backend.probably_exists(&k).await);
    }

    #[tokio::test]
    async fn test_put_without_overwrite_is_idempotent() {
        let backend = MemoryBackend::new();
        let k = key("tex_7");

        backend.put(&k, b"first", false).await.unwrap();
        backend.put(&k, b"second", false).await.unwrap();
        assert_eq!(backend.get(&k).await.unwrap(), b"first");

        backend.put(&k, b"second", true).await.unwrap();
        assert_eq!(backend.get(&k).await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_empty_value_is_a_valid_entry() {
        let backend = MemoryBackend::new();
        let k = key("empty_artifact");

        backend.put(&k, b"", true).await.unwrap();
        assert!(backend.probably_exists(&k).await);
        assert_eq!(backend.get(&k).await.unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_remove_absent_key_is_not_an_error() {
        let backend = MemoryBackend::new();
        let k = key("never_stored");

        backend.remove(&k, false).await.unwrap();

        backend.put(&k, b"data", true).await.unwrap();
        backend.remove(&k, true).await.unwrap();
        assert!(!backend.probably_exists(&k).await);
    }

    #[tokio::test]
    async fn test_read_only_backend_refuses_puts() {
        let backend = MemoryBackend::read_only();
        let k = key("tex_7");

        assert!(!backend.is_writable());
        assert_eq!(
            backend.put(&k, b"data", true).await,
            Err(CacheError::ReadOnly)
        );

        backend.seed(&k, b"seeded");
        assert_eq!(backend.get(&k).await.unwrap(), b"seeded");
    }

    #[tokio::test]
    async fn test_stats_track_hits_and_misses() {
        let backend = MemoryBackend::new();
        let k = key("mesh_lod0");

        let _ = backend.get(&k).await;
        backend.put(&k, b"tris", true).await.unwrap();
        backend.get(&k).await.unwrap();

        let stats = backend.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.puts, 1);
        assert_eq!(stats.entry_count, 1);
    }
}
