//! Filesystem cache backend.
//!
//! The durable local tier: one file per key under a root directory. Keys are
//! opaque strings of arbitrary length and content, so on-disk names are
//! derived from the SHA-256 of the key with a two-level fan-out
//! (`ab/cd/<digest>.bin`) to keep directories from flattening on large
//! caches.
//!
//! # Atomicity
//!
//! Writes land in a temp file first and are published with a rename, so a
//! concurrent reader never observes a partially written entry.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use strata_core::{CacheError, CacheKey, CacheResult};

use crate::traits::{CacheBackend, CacheStats};

/// File extension for stored entries.
const ENTRY_EXT: &str = "bin";

/// Disk-backed byte-blob store.
pub struct FilesystemBackend {
    root: PathBuf,
    read_only: bool,
    stats: RwLock<CacheStats>,
    /// Distinguishes concurrent temp files within one process.
    temp_counter: AtomicU64,
}

impl FilesystemBackend {
    /// Create a writable backend rooted at `root`, creating the directory if
    /// needed.
    pub fn new(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(CacheError::io)?;
        Ok(Self {
            root,
            read_only: false,
            stats: RwLock::new(CacheStats::default()),
            temp_counter: AtomicU64::new(0),
        })
    }

    /// Open an existing cache directory without accepting puts.
    ///
    /// Fails if `root` does not exist - a read-only tier that was never
    /// populated is a deployment mistake worth surfacing early.
    pub fn read_only(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(CacheError::BackendIo {
                reason: format!("read-only cache root {} does not exist", root.display()),
            });
        }
        Ok(Self {
            root,
            read_only: true,
            stats: RwLock::new(CacheStats::default()),
            temp_counter: AtomicU64::new(0),
        })
    }

    /// The cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk path for `key`: `<root>/ab/cd/<sha256-hex>.bin`.
    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_bytes()));
        self.root
            .join(&digest[0..2])
            .join(&digest[2..4])
            .join(format!("{digest}.{ENTRY_EXT}"))
    }

    fn next_temp_path(&self, entry: &Path) -> PathBuf {
        let serial = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        entry.with_extension(format!("tmp.{}.{serial}", std::process::id()))
    }
}

#[async_trait]
impl CacheBackend for FilesystemBackend {
    fn is_writable(&self) -> bool {
        !self.read_only
    }

    async fn probably_exists(&self, key: &CacheKey) -> bool {
        self.entry_path(key).is_file()
    }

    async fn get(&self, key: &CacheKey) -> CacheResult<Vec<u8>> {
        match fs::read(self.entry_path(key)) {
            Ok(data) => {
                if let Ok(mut stats) = self.stats.write() {
                    stats.hits += 1;
                }
                Ok(data)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                if let Ok(mut stats) = self.stats.write() {
                    stats.misses += 1;
                }
                Err(CacheError::not_found(key))
            }
            Err(err) => Err(CacheError::io(err)),
        }
    }

    async fn put(&self, key: &CacheKey, data: &[u8], overwrite: bool) -> CacheResult<()> {
        if self.read_only {
            return Err(CacheError::ReadOnly);
        }
        let entry = self.entry_path(key);
        let existed = entry.is_file();
        if !overwrite && existed {
            return Ok(());
        }
        if let Some(parent) = entry.parent() {
            fs::create_dir_all(parent).map_err(CacheError::io)?;
        }

        // Publish atomically: a reader sees the old entry or the new one,
        // never a torn write.
        let temp = self.next_temp_path(&entry);
        fs::write(&temp, data).map_err(CacheError::io)?;
        if let Err(err) = fs::rename(&temp, &entry) {
            let _ = fs::remove_file(&temp);
            return Err(CacheError::io(err));
        }

        if let Ok(mut stats) = self.stats.write() {
            stats.puts += 1;
            if !existed {
                stats.entry_count += 1;
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &CacheKey, _transient: bool) -> CacheResult<()> {
        if self.read_only {
            return Ok(());
        }
        match fs::remove_file(self.entry_path(key)) {
            Ok(()) => {
                if let Ok(mut stats) = self.stats.write() {
                    stats.removes += 1;
                    stats.entry_count = stats.entry_count.saturating_sub(1);
                }
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CacheError::io(err)),
        }
    }

    async fn stats(&self) -> CacheStats {
        self.stats
            .read()
            .map(|stats| stats.clone())
            .unwrap_or_default()
    }
}
