//! Cache layer for location data.
//!
//! This module provides a two-tier store built on Moka with freshness
//! classes, ticketed writes and pattern-based invalidation.

pub mod entry;
pub mod invalidation;
pub mod keys;
pub mod store;

// Re-exports
pub use entry::{CacheEntry, CachedValue, Freshness};
pub use invalidation::InvalidationResult;
pub use keys::{CacheKey, DataClass};
pub use store::{CacheLookup, CacheStats, CacheStore, CommitOutcome, StoreConfig, WriteTicket};
