//! Verifying decorator backend.
//!
//! Wraps any inner backend with a one-time-per-key consistency check between
//! previously cached bytes and freshly produced bytes. A mismatch means an
//! upstream producer is nondeterministic, or the cache has been poisoned -
//! either way, a bug worth a loud log line and a pair of dump files.
//!
//! # Access Narrowing
//!
//! The wrapper deliberately reports existence and serves reads only for keys
//! it has personally verified. A key sitting in the inner backend that has
//! not yet passed through `put` is invisible, which forces every first-time
//! access through the verify cycle.
//!
//! # Fire and Forget
//!
//! `put` never fails from the caller's point of view. Inner I/O errors
//! during the verify fetch, the diagnostic dump, and the repair write are
//! logged and swallowed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use strata_core::{CacheError, CacheKey, CacheResult, VerifyConfig};

use crate::diagnostics::MismatchRecorder;
use crate::traits::{CacheBackend, CacheStats};
use crate::verified_set::VerifiedKeySet;

/// Consistency-checking decorator over one inner backend.
///
/// Chains are built by nesting: the inner backend may itself be a hierarchy
/// or another decorator.
pub struct VerifyBackend {
    inner: Arc<dyn CacheBackend>,
    verified: VerifiedKeySet,
    config: VerifyConfig,
    recorder: MismatchRecorder,
}

impl VerifyBackend {
    /// Create a wrapper around `inner`.
    ///
    /// The diagnostics directory and repair policy come from `config`;
    /// nothing is read from ambient process state.
    pub fn new(inner: Arc<dyn CacheBackend>, config: VerifyConfig) -> Self {
        let recorder = MismatchRecorder::new(config.diagnostics_dir());
        Self {
            inner,
            verified: VerifiedKeySet::new(),
            config,
            recorder,
        }
    }

    /// The wrapper's configuration.
    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// The inner backend.
    pub fn inner(&self) -> &Arc<dyn CacheBackend> {
        &self.inner
    }

    /// Keys verified so far this process.
    pub fn verified_key_count(&self) -> usize {
        self.verified.len()
    }

    /// Run the first-sight verify cycle for `key`.
    ///
    /// Exactly one caller per key ever reaches this; see
    /// [`VerifiedKeySet::test_and_insert`].
    async fn verify_first_put(&self, key: &CacheKey, data: &[u8], overwrite: bool) {
        match self.inner.get(key).await {
            Ok(existing) => {
                if existing == data {
                    debug!(key = %key, bytes = data.len(), "cache verification succeeded");
                    return;
                }

                error!(
                    key = %key,
                    cached_bytes = existing.len(),
                    fresh_bytes = data.len(),
                    "cache verification mismatch; dumping both versions"
                );
                self.recorder.record(key, &existing, data);

                if self.config.auto_repair {
                    match self.inner.put(key, data, true).await {
                        Ok(()) => {
                            error!(key = %key, "mismatched cache entry auto-repaired")
                        }
                        Err(err) => {
                            warn!(key = %key, %err, "auto-repair write failed; entry left stale")
                        }
                    }
                }
            }
            Err(CacheError::NotFound { .. }) => {
                warn!(key = %key, "cache entry didn't exist; populating");
                if let Err(err) = self.inner.put(key, data, overwrite).await {
                    warn!(key = %key, %err, "initial population failed");
                }
            }
            Err(err) => {
                // An unreadable entry is indistinguishable from an absent
                // one. Populate rather than leave the key uncached for the
                // rest of the process; the comparison is forfeit either way.
                warn!(key = %key, %err, "verify fetch failed; populating without comparison");
                if let Err(err) = self.inner.put(key, data, overwrite).await {
                    warn!(key = %key, %err, "population after failed fetch failed");
                }
            }
        }
    }
}

#[async_trait]
impl CacheBackend for VerifyBackend {
    /// Always `true`, regardless of the inner backend's writability.
    ///
    /// This preserves the wrapper's historical behavior: it accepts every
    /// put and decides internally whether to forward it. A caller probing
    /// writability before producing an expensive payload will not learn that
    /// the inner tier is read-only. Deliberately left as-is.
    fn is_writable(&self) -> bool {
        true
    }

    /// True only for keys this wrapper has verified - NOT for keys that
    /// merely exist in the inner backend.
    async fn probably_exists(&self, key: &CacheKey) -> bool {
        self.verified.contains(key)
    }

    /// Serves only verified keys; unverified keys read as absent so callers
    /// regenerate and `put`, which triggers verification.
    async fn get(&self, key: &CacheKey) -> CacheResult<Vec<u8>> {
        if self.verified.contains(key) {
            self.inner.get(key).await
        } else {
            Err(CacheError::not_found(key))
        }
    }

    /// First put per key runs the verify cycle; every later put for the same
    /// key is suppressed entirely, even with different bytes.
    ///
    /// Concurrent putters of the same key return immediately without waiting
    /// for the winner's verify cycle to finish.
    async fn put(&self, key: &CacheKey, data: &[u8], overwrite: bool) -> CacheResult<()> {
        if self.verified.test_and_insert(key) {
            self.verify_first_put(key, data, overwrite).await;
        }
        Ok(())
    }

    /// Forwarded unconditionally. The verified set is NOT cleared: a removed
    /// then re-put key stays suppressed for the rest of the process, per the
    /// once-per-process verification contract.
    async fn remove(&self, key: &CacheKey, transient: bool) -> CacheResult<()> {
        self.inner.remove(key, transient).await
    }

    async fn stats(&self) -> CacheStats {
        self.inner.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use std::fs;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn key(raw: &str) -> CacheKey {
        CacheKey::new(raw).unwrap()
    }

    fn wrapper_over(
        inner: Arc<dyn CacheBackend>,
        auto_repair: bool,
    ) -> (VerifyBackend, tempfile::TempDir) {
        let diag = tempfile::tempdir().unwrap();
        let config = VerifyConfig::new(diag.path()).with_auto_repair(auto_repair);
        (VerifyBackend::new(inner, config), diag)
    }

    // Inner backend that counts trait calls, for pinning down how often the
    // wrapper touches its inner tier.
    struct CountingBackend {
        inner: MemoryBackend,
        gets: AtomicU64,
        puts: AtomicU64,
    }

    impl CountingBackend {
        fn new() -> Self {
            Self {
                inner: MemoryBackend::new(),
                gets: AtomicU64::new(0),
                puts: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl CacheBackend for CountingBackend {
        fn is_writable(&self) -> bool {
            self.inner.is_writable()
        }

        async fn probably_exists(&self, key: &CacheKey) -> bool {
            self.inner.probably_exists(key).await
        }

        async fn get(&self, key: &CacheKey) -> CacheResult<Vec<u8>> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(key).await
        }

        async fn put(&self, key: &CacheKey, data: &[u8], overwrite: bool) -> CacheResult<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(key, data, overwrite).await
        }

        async fn remove(&self, key: &CacheKey, transient: bool) -> CacheResult<()> {
            self.inner.remove(key, transient).await
        }

        async fn stats(&self) -> CacheStats {
            self.inner.stats().await
        }
    }

    #[tokio::test]
    async fn test_first_put_populates_empty_inner() {
        let inner = Arc::new(MemoryBackend::new());
        let (wrapper, _diag) = wrapper_over(inner.clone(), false);
        let k = key("shader_42");

        wrapper.put(&k, b"bytesA", false).await.unwrap();

        assert_eq!(inner.get(&k).await.unwrap(), b"bytesA");
        assert_eq!(wrapper.verified_key_count(), 1);
        assert!(wrapper.probably_exists(&k).await);
    }

    #[tokio::test]
    async fn test_second_put_is_suppressed() {
        let inner = Arc::new(MemoryBackend::new());
        let (wrapper, _diag) = wrapper_over(inner.clone(), false);
        let k = key("shader_42");

        wrapper.put(&k, b"bytesA", false).await.unwrap();
        assert_eq!(wrapper.get(&k).await.unwrap(), b"bytesA");

        wrapper.put(&k, b"bytesB", false).await.unwrap();
        assert_eq!(inner.get(&k).await.unwrap(), b"bytesA");
        assert_eq!(wrapper.get(&k).await.unwrap(), b"bytesA");

        // Even overwrite puts are suppressed after first sight.
        wrapper.put(&k, b"bytesC", true).await.unwrap();
        assert_eq!(inner.get(&k).await.unwrap(), b"bytesA");
    }

    #[tokio::test]
    async fn test_mismatch_writes_diagnostics_without_repair() {
        let inner = Arc::new(MemoryBackend::new());
        let k = key("tex_7");
        inner.seed(&k, b"bytesX");

        let (wrapper, diag) = wrapper_over(inner.clone(), false);
        wrapper.put(&k, b"bytesY", false).await.unwrap();

        assert_eq!(inner.get(&k).await.unwrap(), b"bytesX");
        assert_eq!(
            fs::read(diag.path().join("tex_7.fromcache")).unwrap(),
            b"bytesX"
        );
        assert_eq!(fs::read(diag.path().join("tex_7.verify")).unwrap(), b"bytesY");
    }

    #[tokio::test]
    async fn test_mismatch_with_auto_repair_overwrites_inner() {
        let inner = Arc::new(MemoryBackend::new());
        let k = key("tex_7");
        inner.seed(&k, b"bytesX");

        let (wrapper, diag) = wrapper_over(inner.clone(), true);
        wrapper.put(&k, b"bytesY", false).await.unwrap();

        assert_eq!(inner.get(&k).await.unwrap(), b"bytesY");
        assert!(diag.path().join("tex_7.fromcache").is_file());
        assert!(diag.path().join("tex_7.verify").is_file());
    }

    #[tokio::test]
    async fn test_matching_bytes_write_no_diagnostics() {
        let inner = Arc::new(MemoryBackend::new());
        let k = key("tex_7");
        inner.seed(&k, b"bytesX");

        let (wrapper, diag) = wrapper_over(inner.clone(), false);
        wrapper.put(&k, b"bytesX", false).await.unwrap();

        assert_eq!(inner.get(&k).await.unwrap(), b"bytesX");
        assert!(!diag.path().join("tex_7.fromcache").exists());
        assert!(!diag.path().join("tex_7.verify").exists());
    }

    #[tokio::test]
    async fn test_existence_narrowed_to_verified_keys() {
        let inner = Arc::new(MemoryBackend::new());
        let k = key("tex_7");
        inner.seed(&k, b"bytesX");

        let (wrapper, _diag) = wrapper_over(inner.clone(), false);
        assert!(!wrapper.probably_exists(&k).await);

        wrapper.put(&k, b"bytesX", false).await.unwrap();
        assert!(wrapper.probably_exists(&k).await);
    }

    #[tokio::test]
    async fn test_unverified_read_is_blocked() {
        let inner = Arc::new(MemoryBackend::new());
        let k = key("tex_7");
        inner.seed(&k, b"bytesX");

        let (wrapper, _diag) = wrapper_over(inner.clone(), false);
        assert!(wrapper.get(&k).await.unwrap_err().is_not_found());

        wrapper.put(&k, b"bytesX", false).await.unwrap();
        assert_eq!(wrapper.get(&k).await.unwrap(), b"bytesX");
    }

    // Inner backend whose reads always fail as if the medium were sick,
    // while writes still land.
    struct UnreadableBackend {
        inner: MemoryBackend,
    }

    #[async_trait]
    impl CacheBackend for UnreadableBackend {
        fn is_writable(&self) -> bool {
            true
        }

        async fn probably_exists(&self, key: &CacheKey) -> bool {
            self.inner.probably_exists(key).await
        }

        async fn get(&self, _key: &CacheKey) -> CacheResult<Vec<u8>> {
            Err(CacheError::BackendIo {
                reason: "simulated read failure".to_string(),
            })
        }

        async fn put(&self, key: &CacheKey, data: &[u8], overwrite: bool) -> CacheResult<()> {
            self.inner.put(key, data, overwrite).await
        }

        async fn remove(&self, key: &CacheKey, transient: bool) -> CacheResult<()> {
            self.inner.remove(key, transient).await
        }

        async fn stats(&self) -> CacheStats {
            self.inner.stats().await
        }
    }

    #[tokio::test]
    async fn test_failed_verify_fetch_still_populates() {
        // A transient read failure during the first-sight fetch must not
        // leave the key permanently uncached: the fresh bytes go in, only
        // the comparison is forfeit.
        let inner = Arc::new(UnreadableBackend {
            inner: MemoryBackend::new(),
        });
        let (wrapper, diag) = wrapper_over(inner.clone(), false);
        let k = key("shader_42");

        wrapper.put(&k, b"bytesA", false).await.unwrap();

        assert_eq!(inner.inner.get(&k).await.unwrap(), b"bytesA");
        assert!(wrapper.probably_exists(&k).await);
        // No comparison ran, so no mismatch dumps either.
        assert!(!diag.path().join("shader_42.fromcache").exists());

        // Later puts for the key stay suppressed as usual.
        wrapper.put(&k, b"bytesB", false).await.unwrap();
        assert_eq!(inner.inner.get(&k).await.unwrap(), b"bytesA");
    }

    #[tokio::test]
    async fn test_remove_forwards_but_keeps_verification() {
        let inner = Arc::new(MemoryBackend::new());
        let (wrapper, _diag) = wrapper_over(inner.clone(), false);
        let k = key("shader_42");

        wrapper.put(&k, b"bytesA", false).await.unwrap();
        wrapper.remove(&k, false).await.unwrap();
        assert!(!inner.probably_exists(&k).await);

        // Still "verified": the re-put is suppressed, not re-verified.
        wrapper.put(&k, b"bytesB", false).await.unwrap();
        assert!(!inner.probably_exists(&k).await);
        assert!(wrapper.probably_exists(&k).await);
    }

    #[tokio::test]
    async fn test_wrapper_reports_writable_over_read_only_inner() {
        // Historical behavior pinned on purpose; see `is_writable` docs.
        let inner = Arc::new(MemoryBackend::read_only());
        let (wrapper, _diag) = wrapper_over(inner.clone(), false);
        let k = key("shader_42");

        assert!(!inner.is_writable());
        assert!(wrapper.is_writable());

        // The put is accepted and the population failure is swallowed.
        wrapper.put(&k, b"bytesA", true).await.unwrap();
        assert!(wrapper.probably_exists(&k).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_puts_verify_exactly_once() {
        let inner = Arc::new(CountingBackend::new());
        let (wrapper, _diag) = wrapper_over(inner.clone(), false);
        let wrapper = Arc::new(wrapper);
        let k = key("shader_42");

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let wrapper = Arc::clone(&wrapper);
                let k = k.clone();
                tokio::spawn(async move {
                    let payload = vec![i as u8; 64];
                    wrapper.put(&k, &payload, false).await.unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        // One verify fetch, one population, one surviving value.
        assert_eq!(inner.gets.load(Ordering::SeqCst), 1);
        assert_eq!(inner.puts.load(Ordering::SeqCst), 1);
        assert_eq!(wrapper.verified_key_count(), 1);
        let stored = inner.inner.get(&k).await.unwrap();
        assert_eq!(stored.len(), 64);
    }

    #[tokio::test]
    async fn test_wrapper_over_full_chain() {
        // Verify wrapper on top of a local-memory / shared-disk hierarchy,
        // the shape a build pipeline actually runs.
        use crate::filesystem::FilesystemBackend;
        use crate::hierarchy::HierarchyBackend;

        let cache_dir = tempfile::tempdir().unwrap();
        let local = Arc::new(MemoryBackend::new());
        let shared = Arc::new(FilesystemBackend::new(cache_dir.path()).unwrap());
        let k = key("shader_42");
        shared.put(&k, b"stale bytecode", true).await.unwrap();

        let chain = Arc::new(HierarchyBackend::new(vec![local, shared.clone()]));
        let diag = tempfile::tempdir().unwrap();
        let config = VerifyConfig::new(diag.path()).with_auto_repair(true);
        let wrapper = VerifyBackend::new(chain, config);

        wrapper.put(&k, b"fresh bytecode", false).await.unwrap();

        // Mismatch detected against the shared tier, dumped, and repaired.
        assert!(diag.path().join("shader_42.fromcache").is_file());
        assert_eq!(shared.get(&k).await.unwrap(), b"fresh bytecode");
        assert_eq!(wrapper.get(&k).await.unwrap(), b"fresh bytecode");
    }

    #[tokio::test]
    async fn test_wrappers_nest() {
        // The decorator composes with itself like any other backend.
        let inner = Arc::new(MemoryBackend::new());
        let (mid, _diag_mid) = wrapper_over(inner.clone(), false);
        let (outer, _diag_outer) = wrapper_over(Arc::new(mid), false);
        let k = key("shader_42");

        outer.put(&k, b"bytesA", false).await.unwrap();
        assert_eq!(outer.get(&k).await.unwrap(), b"bytesA");
        assert_eq!(inner.get(&k).await.unwrap(), b"bytesA");
    }
}
