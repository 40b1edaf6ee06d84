//! Strata Core - Cache Types
//!
//! Foundational types for the strata cache backend chain. All other crates
//! depend on this. This crate contains only keys, errors, and configuration -
//! no storage logic.

pub mod config;
pub mod error;
pub mod key;

pub use config::VerifyConfig;
pub use error::{CacheError, CacheResult};
pub use key::CacheKey;
