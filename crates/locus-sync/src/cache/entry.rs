//! Cache entries and values.

use std::sync::Arc;

use locus_core::{LocationDetail, LocationId, LocationPage, StatusSnapshot};
use tokio::time::Instant;

use super::store::WriteTicket;

/// A value held by the cache.
///
/// Payloads are reference counted so reads never copy records.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    List(Arc<LocationPage>),
    Detail(Arc<LocationDetail>),
    Status(Arc<StatusSnapshot>),
}

impl CachedValue {
    pub fn as_list(&self) -> Option<&Arc<LocationPage>> {
        match self {
            Self::List(page) => Some(page),
            _ => None,
        }
    }

    pub fn as_detail(&self) -> Option<&Arc<LocationDetail>> {
        match self {
            Self::Detail(detail) => Some(detail),
            _ => None,
        }
    }

    pub fn as_status(&self) -> Option<&Arc<StatusSnapshot>> {
        match self {
            Self::Status(status) => Some(status),
            _ => None,
        }
    }

    /// Returns true if the value carries data about the location.
    pub fn mentions(&self, id: &LocationId) -> bool {
        match self {
            Self::List(page) => page.contains(id),
            Self::Detail(detail) => &detail.record.id == id,
            Self::Status(status) => &status.location_id == id,
        }
    }
}

impl From<LocationPage> for CachedValue {
    fn from(page: LocationPage) -> Self {
        Self::List(Arc::new(page))
    }
}

impl From<LocationDetail> for CachedValue {
    fn from(detail: LocationDetail) -> Self {
        Self::Detail(Arc::new(detail))
    }
}

impl From<StatusSnapshot> for CachedValue {
    fn from(status: StatusSnapshot) -> Self {
        Self::Status(Arc::new(status))
    }
}

/// Freshness of an entry at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Younger than its stale TTL.
    Fresh,
    /// Past its stale TTL but usable until its hard TTL.
    Stale,
    /// Past its hard TTL.
    Expired,
}

/// A committed cache entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: CachedValue,
    pub inserted_at: Instant,
    pub stale_at: Instant,
    pub expires_at: Instant,
    pub ticket: WriteTicket,
}

impl CacheEntry {
    pub fn freshness(&self, now: Instant) -> Freshness {
        if now >= self.expires_at {
            Freshness::Expired
        } else if now >= self.stale_at {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }

    /// Age of the entry.
    pub fn age(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.inserted_at)
    }
}
