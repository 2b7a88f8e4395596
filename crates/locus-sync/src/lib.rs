//! # Locus Sync
//!
//! Caching and refresh orchestration for location data.
//!
//! The [`LocationManager`] sits between callers and a [`LocationSource`]:
//! reads are served from a freshness-aware cache, stale entries are
//! revalidated in the background, backend change notifications expire the
//! affected entries, and transient failures fall back to the last known
//! value, tagged degraded.
//!
//! ## Features
//!
//! - Per-class stale and hard TTLs (list, detail, status)
//! - Prioritized, deduplicated refresh tasks with bounded concurrency
//! - Out-of-order completions discarded through per-key write tickets
//! - Retry with capped exponential backoff, honoring rate-limit hints
//! - Error statistics, pattern detection and health classification
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use locus_source::StaticSource;
//! use locus_sync::{EventBus, LocationManager, SyncConfig};
//!
//! let source = Arc::new(StaticSource::from_path("fixtures/locations.yml")?);
//! let manager = LocationManager::new(source, SyncConfig::default(), EventBus::default())?;
//! let _sweeper = manager.start();
//!
//! let page = manager.get_locations(Default::default()).await?;
//! println!("{} locations", page.value.total_count);
//! ```
//!
//! [`LocationSource`]: locus_source::LocationSource

pub mod cache;
pub mod config;
pub mod events;
pub mod invalidator;
pub mod manager;
pub mod metrics;
pub mod recovery;
pub mod refresh;

// Re-exports
pub use cache::{CacheKey, CacheLookup, CacheStats, CacheStore, CachedValue, DataClass};
pub use config::{CacheStrategy, ConfigError, RetryPolicy, SyncConfig, TtlConfig, TtlPair};
pub use events::{EventBus, SyncEvent};
pub use invalidator::{ChangeKind, InvalidationReport, Invalidator, Subscription};
pub use manager::{
    AuditFinding, HealthReport, HealthStatus, LocationManager, ManagerStatistics, Served,
    UpdateOutcome,
};
pub use metrics::register_sync_metrics;
pub use recovery::{ErrorPattern, ErrorStats, RecoveryAction, RecoveryHandler};
pub use refresh::{
    Priority, RefreshOutcome, RefreshScheduler, RefreshStats, RefreshTarget, RefreshTask,
    SweepHandle, TaskId, TaskState,
};

// Re-export the lower layers for consumers
pub use locus_core;
pub use locus_source;
