//! Once-per-process verification gate.
//!
//! The verifying decorator must run its fetch-and-compare cycle exactly once
//! per key per process, no matter how many worker tasks race a first put.
//! [`VerifiedKeySet`] is that gate: a membership set with atomic
//! insert-if-absent, kept behind a narrow interface so the locking discipline
//! stays encapsulated here.

use std::collections::HashSet;
use std::sync::RwLock;

use strata_core::CacheKey;

/// Thread-safe set of keys already verified this process lifetime.
///
/// Grows monotonically and never shrinks - not even when the underlying
/// entry is removed. Verification is "once per key per process", not
/// per-value-change.
#[derive(Debug, Default)]
pub struct VerifiedKeySet {
    keys: RwLock<HashSet<CacheKey>>,
}

impl VerifiedKeySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically check membership and insert if absent.
    ///
    /// Returns `true` iff the key was newly inserted. For any key, exactly
    /// one caller across all threads observes `true`; every other concurrent
    /// or later caller gets `false` without waiting on the winner's
    /// subsequent work.
    ///
    /// A poisoned lock is treated as "already present": the writer that
    /// poisoned it may have begun a verification cycle, and suppressing is
    /// the conservative answer (never verify a key twice).
    pub fn test_and_insert(&self, key: &CacheKey) -> bool {
        match self.keys.write() {
            Ok(mut keys) => keys.insert(key.clone()),
            Err(_) => false,
        }
    }

    /// Whether `key` has been verified.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.keys.read().map(|keys| keys.contains(key)).unwrap_or(false)
    }

    /// Number of keys verified so far.
    pub fn len(&self) -> usize {
        self.keys.read().map(|keys| keys.len()).unwrap_or(0)
    }

    /// Whether no key has been verified yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
