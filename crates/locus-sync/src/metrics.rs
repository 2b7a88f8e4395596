//! Metrics recording for the caching layer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use metrics::{Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

pub const CACHE_LOOKUPS: &str = "locus_cache_lookups_total";
pub const CACHE_EVICTIONS: &str = "locus_cache_evictions_total";
pub const CACHE_ENTRIES: &str = "locus_cache_entries";
pub const REFRESHES: &str = "locus_refresh_total";
pub const REFRESH_DURATION: &str = "locus_refresh_duration_seconds";
pub const REFRESHES_ACTIVE: &str = "locus_refresh_active";
pub const RECOVERY_DECISIONS: &str = "locus_recovery_decisions_total";

/// Describes the metrics emitted by this crate.
///
/// Call once at startup, after installing a recorder.
pub fn register_sync_metrics() {
    describe_counter!(
        CACHE_LOOKUPS,
        "Cache reads by data class and result (hit, miss)"
    );
    describe_counter!(CACHE_EVICTIONS, "Entries dropped from the cache, by reason");
    describe_gauge!(CACHE_ENTRIES, "Live entries in the cache");
    describe_counter!(REFRESHES, "Refresh tasks finished, by outcome");
    describe_histogram!(REFRESH_DURATION, Unit::Seconds, "Refresh task duration");
    describe_gauge!(REFRESHES_ACTIVE, "Refresh tasks holding a worker slot");
    describe_counter!(
        RECOVERY_DECISIONS,
        "Recovery decisions, by error kind and action"
    );
}

/// Hit and miss counters of the cache store.
///
/// Cloning shares the counters.
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, class: &'static str) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!(CACHE_LOOKUPS, "class" => class, "result" => "hit").increment(1);
    }

    pub fn record_miss(&self, class: &'static str) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(CACHE_LOOKUPS, "class" => class, "result" => "miss").increment(1);
    }

    pub fn record_eviction(&self, reason: &'static str) {
        counter!(CACHE_EVICTIONS, "reason" => reason).increment(1);
    }

    pub fn set_entries(&self, count: u64) {
        gauge!(CACHE_ENTRIES).set(count as f64);
    }

    /// Hit rate in `[0, 1]`; zero when nothing was read.
    pub fn hit_rate(&self) -> f64 {
        match self.hits() + self.misses() {
            0 => 0.0,
            reads => self.hits() as f64 / reads as f64,
        }
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub(crate) fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

/// Records a finished refresh task.
pub fn record_refresh(outcome: &'static str, duration: Duration) {
    counter!(REFRESHES, "outcome" => outcome).increment(1);
    histogram!(REFRESH_DURATION, "outcome" => outcome).record(duration.as_secs_f64());
}

/// Updates the active refresh gauge.
pub fn set_active_refreshes(count: usize) {
    gauge!(REFRESHES_ACTIVE).set(count as f64);
}

/// Records a recovery decision.
pub fn record_recovery_decision(kind: &'static str, action: &'static str) {
    counter!(RECOVERY_DECISIONS, "kind" => kind, "action" => action).increment(1);
}
