//! Cache store using Moka.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use locus_core::LocationId;
use moka::notification::RemovalCause;
use moka::sync::Cache;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::entry::{CacheEntry, CachedValue, Freshness};
use super::keys::CacheKey;
use crate::config::TtlConfig;
use crate::metrics::CacheMetrics;

/// Monotonic write ticket.
///
/// Tickets order writes by the time the data was requested, not by the time
/// it arrived: a commit is rejected if a newer ticket was already committed
/// (or fenced by an invalidation) for the same key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct WriteTicket(u64);

impl WriteTicket {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Result of a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied,
    /// A newer write, invalidation or clear happened after the ticket was
    /// issued. The value was discarded.
    Superseded,
}

/// Result of a read.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Fresh(CachedValue),
    /// Usable, but a background refresh should be scheduled.
    Stale(CachedValue),
    Miss,
}

impl CacheLookup {
    pub fn value(&self) -> Option<&CachedValue> {
        match self {
            Self::Fresh(v) | Self::Stale(v) => Some(v),
            Self::Miss => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        !matches!(self, Self::Miss)
    }
}

/// Hit and miss statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Percentage of reads that were hits, `0.0` when nothing was read.
    pub hit_rate: f64,
    pub entries: u64,
}

/// Capacity and retention settings of the store.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    pub ttl: TtlConfig,
    pub max_entries: u64,
    pub fallback_ttl: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl: TtlConfig::default(),
            max_entries: 1000,
            fallback_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Newest ticket per key, plus the ticket floor set by the last clear.
#[derive(Debug, Default)]
struct WriteLedger {
    marks: HashMap<CacheKey, WriteTicket>,
    floor: WriteTicket,
}

impl WriteLedger {
    fn accepts(&self, key: &CacheKey, ticket: WriteTicket) -> bool {
        ticket > self.floor && self.marks.get(key).is_none_or(|mark| ticket > *mark)
    }
}

/// Keyed store of location data with freshness classes.
///
/// Freshness is tracked on [`tokio::time::Instant`], so paused-clock tests
/// control it. Two tiers are kept: the primary tier holds live entries, and
/// a last-known-good tier keeps the most recent committed value per key
/// after its entry is purged, for degraded reads.
///
/// All mutations go through a single ledger lock, so writes, invalidations
/// and clears are linearized.
///
/// # Examples
///
/// ```
/// use locus_core::{LocationId, LocationStatus, StatusSnapshot};
/// use locus_sync::cache::{CacheKey, CacheLookup, CacheStore, CommitOutcome, StoreConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let store = CacheStore::new(StoreConfig::default());
/// let key = CacheKey::Status(LocationId::new("loc-1"));
///
/// let ticket = store.begin_write();
/// let snapshot = StatusSnapshot {
///     location_id: LocationId::new("loc-1"),
///     status: LocationStatus::Active,
///     is_open_now: true,
///     last_updated: chrono::Utc::now(),
/// };
/// assert_eq!(store.commit(&key, ticket, snapshot.into()), CommitOutcome::Applied);
/// assert!(matches!(store.get(&key), CacheLookup::Fresh(_)));
/// # }
/// ```
pub struct CacheStore {
    primary: Cache<CacheKey, CacheEntry>,
    fallback: Cache<CacheKey, CachedValue>,
    ledger: Mutex<WriteLedger>,
    next_ticket: AtomicU64,
    ttl: TtlConfig,
    metrics: CacheMetrics,
}

impl CacheStore {
    /// Creates a store with the given configuration.
    pub fn new(config: StoreConfig) -> Self {
        let metrics = CacheMetrics::new();

        let eviction_metrics = metrics.clone();
        let primary = Cache::builder()
            .max_capacity(config.max_entries)
            .eviction_listener(move |_key, _value, cause| {
                let reason = match cause {
                    RemovalCause::Expired => "ttl",
                    RemovalCause::Size => "capacity",
                    RemovalCause::Explicit => "manual",
                    RemovalCause::Replaced => "replaced",
                };
                eviction_metrics.record_eviction(reason);
            })
            .build();

        let fallback = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(config.fallback_ttl)
            .build();

        Self {
            primary,
            fallback,
            ledger: Mutex::new(WriteLedger::default()),
            next_ticket: AtomicU64::new(1),
            ttl: config.ttl,
            metrics,
        }
    }

    /// Reads an entry. Every call counts exactly one hit or one miss.
    ///
    /// Expired entries are purged and reported as a miss.
    pub fn get(&self, key: &CacheKey) -> CacheLookup {
        let class = key.class().as_str();
        let now = Instant::now();

        let lookup = match self.primary.get(key) {
            Some(entry) => match entry.freshness(now) {
                Freshness::Fresh => CacheLookup::Fresh(entry.value),
                Freshness::Stale => CacheLookup::Stale(entry.value),
                Freshness::Expired => {
                    self.purge_if_expired(key, now);
                    CacheLookup::Miss
                },
            },
            None => CacheLookup::Miss,
        };

        if lookup.is_hit() {
            self.metrics.record_hit(class);
        } else {
            self.metrics.record_miss(class);
        }
        trace!(key = %key, hit = lookup.is_hit(), "Cache read");

        lookup
    }

    /// Returns the live entry without touching statistics.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.primary
            .get(key)
            .filter(|e| e.freshness(Instant::now()) != Freshness::Expired)
    }

    /// Returns the last committed value for the key, even if its entry was
    /// purged or invalidated. Does not touch statistics.
    pub fn last_known(&self, key: &CacheKey) -> Option<CachedValue> {
        self.peek(key)
            .map(|e| e.value)
            .or_else(|| self.fallback.get(key))
    }

    /// Issues a ticket for a write that is about to fetch data.
    pub fn begin_write(&self) -> WriteTicket {
        WriteTicket(self.next_ticket.fetch_add(1, Ordering::SeqCst))
    }

    /// Returns true if a commit with this ticket would still be applied.
    pub fn is_current(&self, key: &CacheKey, ticket: WriteTicket) -> bool {
        self.ledger.lock().accepts(key, ticket)
    }

    /// Returns true if an invalidation, clear or another write happened for
    /// the key after `ticket` was issued. A commit made with `ticket` itself
    /// does not count.
    pub fn has_newer_write(&self, key: &CacheKey, ticket: WriteTicket) -> bool {
        let ledger = self.ledger.lock();
        ticket <= ledger.floor || ledger.marks.get(key).is_some_and(|mark| *mark > ticket)
    }

    /// Commits a value fetched under `ticket`.
    pub fn commit(&self, key: &CacheKey, ticket: WriteTicket, value: CachedValue) -> CommitOutcome {
        let mut ledger = self.ledger.lock();
        if !ledger.accepts(key, ticket) {
            debug!(key = %key, ticket = ticket.0, "Discarding superseded write");
            return CommitOutcome::Superseded;
        }

        let ttl = self.ttl.for_class(key.class());
        let now = Instant::now();
        let entry = CacheEntry {
            value: value.clone(),
            inserted_at: now,
            stale_at: now + ttl.stale_ttl,
            expires_at: now + ttl.hard_ttl,
            ticket,
        };

        ledger.marks.insert(key.clone(), ticket);
        self.primary.insert(key.clone(), entry);
        self.fallback.insert(key.clone(), value);
        drop(ledger);

        self.metrics.set_entries(self.primary.entry_count());
        CommitOutcome::Applied
    }

    /// Writes a value with a fresh ticket.
    pub fn set(&self, key: &CacheKey, value: CachedValue) -> CommitOutcome {
        let ticket = self.begin_write();
        self.commit(key, ticket, value)
    }

    /// Expires an entry and fences off writes issued before this call.
    ///
    /// The last-known-good value is kept. Returns true if a live entry was
    /// removed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut ledger = self.ledger.lock();
        let fence = self.begin_write();
        ledger.marks.insert(key.clone(), fence);
        self.primary.remove(key).is_some()
    }

    /// Drops every entry in both tiers and rejects every outstanding ticket.
    pub fn clear(&self) {
        let mut ledger = self.ledger.lock();
        ledger.floor = self.begin_write();
        ledger.marks.clear();
        self.primary.invalidate_all();
        self.fallback.invalidate_all();
        drop(ledger);

        self.metrics.set_entries(0);
        debug!("Cache cleared");
    }

    /// Resets hit and miss counters.
    pub fn reset_stats(&self) {
        self.metrics.reset();
    }

    /// Removes hard-expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<CacheKey> = self
            .primary
            .iter()
            .filter(|(_, e)| e.freshness(now) == Freshness::Expired)
            .map(|(k, _)| (*k).clone())
            .collect();

        let purged = expired
            .iter()
            .filter(|key| self.purge_if_expired(key, now))
            .count();

        if purged > 0 {
            debug!(purged, "Purged expired cache entries");
            self.metrics.set_entries(self.primary.entry_count());
        }
        purged
    }

    /// Keys whose entries are stale but still usable.
    pub fn stale_keys(&self) -> Vec<CacheKey> {
        let now = Instant::now();
        self.primary
            .iter()
            .filter(|(_, e)| e.freshness(now) == Freshness::Stale)
            .map(|(k, _)| (*k).clone())
            .collect()
    }

    /// Keys of all live entries.
    pub fn keys(&self) -> Vec<CacheKey> {
        let now = Instant::now();
        self.primary
            .iter()
            .filter(|(_, e)| e.freshness(now) != Freshness::Expired)
            .map(|(k, _)| (*k).clone())
            .collect()
    }

    /// Live entries, for audits. Does not touch statistics.
    pub fn entries(&self) -> Vec<(CacheKey, CacheEntry)> {
        let now = Instant::now();
        self.primary
            .iter()
            .filter(|(_, e)| e.freshness(now) != Freshness::Expired)
            .map(|(k, e)| ((*k).clone(), e))
            .collect()
    }

    /// Keys of live entries that belong to the location.
    pub fn keys_for_location(&self, id: &LocationId) -> Vec<CacheKey> {
        self.keys()
            .into_iter()
            .filter(|k| k.location_id() == Some(id))
            .collect()
    }

    /// Keys of live list pages that contain the location.
    pub fn lists_containing(&self, id: &LocationId) -> Vec<CacheKey> {
        self.entries()
            .into_iter()
            .filter(|(k, e)| matches!(k, CacheKey::List(_)) && e.value.mentions(id))
            .map(|(k, _)| k)
            .collect()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.metrics.hits(),
            misses: self.metrics.misses(),
            hit_rate: self.metrics.hit_rate() * 100.0,
            entries: self.len() as u64,
        }
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// Removes the entry if it is still expired. The check runs under the
    /// ledger lock so a concurrent commit is never lost.
    fn purge_if_expired(&self, key: &CacheKey, now: Instant) -> bool {
        let _ledger = self.ledger.lock();
        match self.primary.get(key) {
            Some(entry) if entry.freshness(now) == Freshness::Expired => {
                self.primary.invalidate(key);
                true
            },
            _ => false,
        }
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("entries", &self.primary.entry_count())
            .field("hits", &self.metrics.hits())
            .field("misses", &self.metrics.misses())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TtlPair;
    use chrono::Utc;
    use locus_core::{LocationPage, LocationStatus, SearchParams, StatusSnapshot};

    fn store_with_ttl(stale: u64, hard: u64) -> CacheStore {
        CacheStore::new(StoreConfig {
            ttl: TtlConfig::uniform(TtlPair::new(
                Duration::from_secs(stale),
                Duration::from_secs(hard),
            )),
            ..StoreConfig::default()
        })
    }

    fn status(id: &str, status: LocationStatus) -> CachedValue {
        CachedValue::from(StatusSnapshot {
            location_id: LocationId::new(id),
            status,
            is_open_now: true,
            last_updated: Utc::now(),
        })
    }

    fn status_key(id: &str) -> CacheKey {
        CacheKey::Status(LocationId::new(id))
    }

    #[tokio::test]
    async fn test_every_read_counts_once() {
        let store = store_with_ttl(60, 900);
        let key = status_key("loc-1");

        assert_eq!(store.get(&key), CacheLookup::Miss);
        store.set(&key, status("loc-1", LocationStatus::Active));
        assert!(store.get(&key).is_hit());
        assert!(store.get(&key).is_hit());
        assert_eq!(store.get(&status_key("loc-2")), CacheLookup::Miss);

        let stats = store.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits + stats.misses, 4);
        assert!((stats.hit_rate - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn test_freshness_transitions() {
        let store = store_with_ttl(60, 900);
        let key = status_key("loc-1");
        store.set(&key, status("loc-1", LocationStatus::Active));

        assert!(matches!(store.get(&key), CacheLookup::Fresh(_)));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(matches!(store.get(&key), CacheLookup::Stale(_)));
        assert_eq!(store.stale_keys(), vec![key.clone()]);

        tokio::time::advance(Duration::from_secs(900)).await;
        assert_eq!(store.get(&key), CacheLookup::Miss);
        assert!(store.peek(&key).is_none());

        // Still available as last known good
        assert!(store.last_known(&key).is_some());
    }

    #[tokio::test]
    async fn test_older_ticket_is_superseded() {
        let store = store_with_ttl(60, 900);
        let key = status_key("loc-1");

        let older = store.begin_write();
        let newer = store.begin_write();

        assert_eq!(
            store.commit(&key, newer, status("loc-1", LocationStatus::Maintenance)),
            CommitOutcome::Applied
        );
        assert_eq!(
            store.commit(&key, older, status("loc-1", LocationStatus::Active)),
            CommitOutcome::Superseded
        );

        assert!(!store.has_newer_write(&key, newer));
        assert!(store.has_newer_write(&key, older));

        let value = store.peek(&key).unwrap().value;
        assert_eq!(value.as_status().unwrap().status, LocationStatus::Maintenance);
    }

    #[tokio::test]
    async fn test_tickets_are_per_key() {
        let store = store_with_ttl(60, 900);

        let older = store.begin_write();
        let newer = store.begin_write();

        store.commit(&status_key("loc-1"), newer, status("loc-1", LocationStatus::Active));
        assert_eq!(
            store.commit(&status_key("loc-2"), older, status("loc-2", LocationStatus::Active)),
            CommitOutcome::Applied
        );
    }

    #[tokio::test]
    async fn test_invalidate_fences_in_flight_writes() {
        let store = store_with_ttl(60, 900);
        let key = status_key("loc-3");
        store.set(&key, status("loc-3", LocationStatus::Active));

        let in_flight = store.begin_write();
        assert!(store.invalidate(&key));
        assert!(!store.is_current(&key, in_flight));
        assert!(store.has_newer_write(&key, in_flight));

        assert_eq!(
            store.commit(&key, in_flight, status("loc-3", LocationStatus::Active)),
            CommitOutcome::Superseded
        );
        assert!(store.peek(&key).is_none());
        assert!(store.last_known(&key).is_some());

        let after = store.begin_write();
        assert_eq!(
            store.commit(&key, after, status("loc-3", LocationStatus::Closed)),
            CommitOutcome::Applied
        );
    }

    #[tokio::test]
    async fn test_clear_discards_abandoned_writes() {
        let store = store_with_ttl(60, 900);
        let key = status_key("loc-1");
        store.set(&key, status("loc-1", LocationStatus::Active));

        let abandoned = store.begin_write();
        store.clear();

        assert_eq!(
            store.commit(&key, abandoned, status("loc-1", LocationStatus::Active)),
            CommitOutcome::Superseded
        );
        assert!(store.is_empty());
        assert!(store.last_known(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = store_with_ttl(10, 20);
        store.set(&status_key("loc-1"), status("loc-1", LocationStatus::Active));

        tokio::time::advance(Duration::from_secs(15)).await;
        store.set(&status_key("loc-2"), status("loc-2", LocationStatus::Active));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.keys(), vec![status_key("loc-2")]);
    }

    #[tokio::test]
    async fn test_location_key_lookup() {
        let store = store_with_ttl(60, 900);
        let date = chrono::NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let loc1 = LocationId::new("loc-1");

        store.set(&status_key("loc-1"), status("loc-1", LocationStatus::Active));
        store.set(&status_key("loc-10"), status("loc-10", LocationStatus::Active));
        store.set(
            &CacheKey::List(SearchParams::default()),
            CachedValue::from(LocationPage {
                items: Vec::new(),
                total_count: 0,
                has_more: false,
            }),
        );

        assert_eq!(store.keys_for_location(&loc1), vec![status_key("loc-1")]);
        assert!(store.lists_containing(&loc1).is_empty());
        assert!(
            !store
                .keys_for_location(&loc1)
                .contains(&CacheKey::detail(loc1.clone(), date))
        );
    }
}
