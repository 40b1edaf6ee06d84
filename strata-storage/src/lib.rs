//! Cache backend chain with write verification.
//!
//! This crate provides the storage tiers of a content-addressed byte-blob
//! cache: callers store expensive-to-recompute build artifacts (compiled
//! shaders, cooked meshes) under opaque string keys, and tiers are composed
//! into chains by decorator backends that all speak the same
//! [`CacheBackend`] trait.
//!
//! # Design Philosophy
//!
//! Deterministic producers should regenerate byte-identical artifacts for the
//! same key. [`VerifyBackend`] turns that assumption into a checked one: the
//! first put for each key in a process fetches whatever the inner tier
//! already holds and compares it byte-for-byte against the freshly produced
//! data, reporting (and optionally repairing) divergence. Everything after
//! that first sight is suppressed, so verification cost is paid once per key
//! and amortized away.
//!
//! # Composition
//!
//! Backends compose by wrapping one another:
//!
//! ```ignore
//! let local = Arc::new(FilesystemBackend::new("/var/cache/strata")?);
//! let shared = Arc::new(FilesystemBackend::read_only("/mnt/shared/strata")?);
//! let chain = Arc::new(HierarchyBackend::new(vec![local, shared]));
//! let cache = VerifyBackend::new(chain, VerifyConfig::new("/tmp/strata-diag"));
//! ```

pub mod diagnostics;
pub mod filesystem;
pub mod hierarchy;
pub mod memory;
pub mod traits;
pub mod verified_set;
pub mod verify;

pub use diagnostics::MismatchRecorder;
pub use filesystem::FilesystemBackend;
pub use hierarchy::HierarchyBackend;
pub use memory::MemoryBackend;
pub use traits::{CacheBackend, CacheStats};
pub use verified_set::VerifiedKeySet;
pub use verify::VerifyBackend;
