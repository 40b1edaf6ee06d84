//! Mismatch diagnostics sink.
//!
//! When verification finds diverging bytes for a key, both versions are
//! dumped to disk for offline inspection. The recorder is injected into the
//! verifying decorator at construction rather than reached for through a
//! process-wide path singleton.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use strata_core::CacheKey;

/// Suffix for the bytes that were already in the inner backend.
const FROM_CACHE_SUFFIX: &str = "fromcache";
/// Suffix for the bytes the caller attempted to store.
const VERIFY_SUFFIX: &str = "verify";

/// Writes `<key>.fromcache` / `<key>.verify` raw byte dumps on mismatch.
///
/// All writes are best-effort: failures are logged and swallowed so the
/// verification path stays fire-and-forget.
#[derive(Debug, Clone)]
pub struct MismatchRecorder {
    dir: PathBuf,
}

impl MismatchRecorder {
    /// Create a recorder targeting `dir`. The directory is created lazily on
    /// first mismatch, not here.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The diagnostics directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Dump both versions of `key`'s bytes.
    ///
    /// `from_cache` is what the inner backend held, `fresh` is what the
    /// caller just produced. Files are raw byte dumps with no header.
    pub fn record(&self, key: &CacheKey, from_cache: &[u8], fresh: &[u8]) {
        if let Err(err) = fs::create_dir_all(&self.dir) {
            warn!(
                key = %key,
                dir = %self.dir.display(),
                %err,
                "failed to create diagnostics directory; dropping mismatch dump"
            );
            return;
        }
        self.write_dump(key, FROM_CACHE_SUFFIX, from_cache);
        self.write_dump(key, VERIFY_SUFFIX, fresh);
    }

    /// Path the dump for `key` with `suffix` lands at.
    pub fn dump_path(&self, key: &CacheKey, suffix: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{suffix}", key.sanitized_file_name()))
    }

    fn write_dump(&self, key: &CacheKey, suffix: &str, data: &[u8]) {
        let path = self.dump_path(key, suffix);
        if let Err(err) = fs::write(&path, data) {
            warn!(
                key = %key,
                path = %path.display(),
                %err,
                "failed to write mismatch dump"
            );
        }
    }
}
