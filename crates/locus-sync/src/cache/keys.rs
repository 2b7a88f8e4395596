//! Typed cache keys.

use std::fmt;

use chrono::NaiveDate;
use locus_core::{LocationId, SearchParams};

/// Class of cached data. Each class has its own TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataClass {
    List,
    Detail,
    Status,
}

impl DataClass {
    pub const ALL: [DataClass; 3] = [Self::List, Self::Detail, Self::Status];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Detail => "detail",
            Self::Status => "status",
        }
    }
}

/// Key of a cache entry.
///
/// The string form is stable and is what pattern invalidation matches
/// against:
///
/// ```
/// use chrono::NaiveDate;
/// use locus_core::{LocationId, SearchParams};
/// use locus_sync::CacheKey;
///
/// let id = LocationId::new("loc-1");
/// assert_eq!(CacheKey::Status(id.clone()).to_string(), "location:loc-1:status");
///
/// let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
/// assert_eq!(
///     CacheKey::detail(id, date).to_string(),
///     "location:loc-1:timeslots:2026-03-02"
/// );
///
/// assert_eq!(CacheKey::List(SearchParams::default()).to_string(), "locations:all");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// One page of a location search.
    List(SearchParams),
    /// A location with its availability on a date.
    Detail { id: LocationId, date: NaiveDate },
    /// The live status of a location.
    Status(LocationId),
}

impl CacheKey {
    pub fn detail(id: LocationId, date: NaiveDate) -> Self {
        Self::Detail { id, date }
    }

    /// Returns the data class, which selects the TTLs.
    pub fn class(&self) -> DataClass {
        match self {
            Self::List(_) => DataClass::List,
            Self::Detail { .. } => DataClass::Detail,
            Self::Status(_) => DataClass::Status,
        }
    }

    /// The location this key belongs to. List keys belong to none.
    pub fn location_id(&self) -> Option<&LocationId> {
        match self {
            Self::List(_) => None,
            Self::Detail { id, .. } | Self::Status(id) => Some(id),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(params) => write!(f, "locations:{}", params.canonical()),
            Self::Detail { id, date } => write!(f, "location:{id}:timeslots:{date}"),
            Self::Status(id) => write!(f, "location:{id}:status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_params_make_equal_keys() {
        let a = CacheKey::List(SearchParams::with_limit(50));
        let b = CacheKey::List(SearchParams::with_limit(50));
        let c = CacheKey::List(SearchParams::with_limit(20));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), r#"locations:{"limit":50}"#);
    }

    #[test]
    fn test_class_and_location() {
        let id = LocationId::new("loc-7");
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();

        assert_eq!(CacheKey::Status(id.clone()).class(), DataClass::Status);
        assert_eq!(CacheKey::detail(id.clone(), date).class(), DataClass::Detail);
        assert_eq!(
            CacheKey::detail(id.clone(), date).location_id(),
            Some(&id)
        );
        assert_eq!(CacheKey::List(SearchParams::default()).location_id(), None);
    }
}
