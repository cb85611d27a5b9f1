//! Cairn cache
//!
//! A byte-budgeted cache that fronts the content store. Keys are namespaced by
//! `CacheKey`; entries may be owned by a file so that every cached view of a file can
//! be dropped in one call when the file changes.

pub mod bounded;
pub mod error;
pub mod key;
mod stats;

pub use bounded::{BoundedCache, CacheConfig, CachePriority};
pub use error::{CacheError, CacheResult};
pub use key::CacheKey;
pub use stats::CacheStats;
