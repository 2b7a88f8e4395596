//! In-memory location source.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{
    Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc, Weekday,
};
use locus_core::{
    LocationDetail, LocationError, LocationId, LocationPage, LocationRecord, LocationStatus,
    OperatingHours, Result, SearchParams, SortBy, StatusSnapshot, TimeSlot, UpdateAck,
    UpdateRequest, WeeklySchedule,
};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::SourceError;
use crate::fixture::Fixture;
use crate::source::LocationSource;

/// Page size used when the search does not set a limit.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Brasília time, where the backend's opening hours are expressed.
const DEFAULT_UTC_OFFSET_SECS: i32 = -3 * 3600;

/// A [`LocationSource`] backed by an in-memory fixture.
///
/// Reads are served from the snapshot, persisted updates are applied to it,
/// and the source can be taken offline to exercise failure handling.
pub struct StaticSource {
    records: RwLock<BTreeMap<LocationId, LocationRecord>>,
    timeslots: RwLock<HashMap<LocationId, Vec<TimeSlot>>>,
    offline: AtomicBool,
    offset: FixedOffset,
}

impl StaticSource {
    /// Creates a source serving the given fixture.
    pub fn new(fixture: Fixture) -> Self {
        let records = fixture
            .locations
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        Self {
            records: RwLock::new(records),
            timeslots: RwLock::new(fixture.timeslots),
            offline: AtomicBool::new(false),
            offset: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix()),
        }
    }

    /// Loads a fixture file (YAML or JSON) and serves it.
    pub fn from_path(path: impl AsRef<Path>) -> std::result::Result<Self, SourceError> {
        let path = path.as_ref();
        let fixture = Fixture::load(path)?;
        info!(
            path = %path.display(),
            locations = fixture.locations.len(),
            "Static source loaded"
        );
        Ok(Self::new(fixture))
    }

    /// Sets the UTC offset used to decide whether a location is open now.
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    /// Takes the source offline (every call fails with a network error) or
    /// back online.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        info!(offline, "Static source availability changed");
    }

    /// Returns true if the source is offline.
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Number of records served.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the source has no records.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Returns a copy of a record, bypassing availability checks.
    pub fn record(&self, id: &LocationId) -> Option<LocationRecord> {
        self.records.read().get(id).cloned()
    }

    /// Inserts or replaces a record, as an out-of-band backend write would.
    pub fn upsert(&self, record: LocationRecord) {
        self.records.write().insert(record.id.clone(), record);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.is_offline() {
            return Err(LocationError::network("static source is offline"));
        }
        Ok(())
    }

    fn local_now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }

    fn get(&self, id: &LocationId) -> Result<LocationRecord> {
        self.record(id)
            .ok_or_else(|| LocationError::not_found(format!("location {id}")))
    }
}

impl std::fmt::Debug for StaticSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticSource")
            .field("locations", &self.len())
            .field("offline", &self.is_offline())
            .field("offset", &self.offset)
            .finish()
    }
}

#[async_trait]
impl LocationSource for StaticSource {
    async fn fetch_location_list(&self, params: &SearchParams) -> Result<LocationPage> {
        self.ensure_online()?;

        let slots = self.timeslots.read();
        let mut matches: Vec<LocationRecord> = self
            .records
            .read()
            .values()
            .filter(|r| matches_search(r, params))
            .cloned()
            .collect();

        match params.sort_by {
            Some(SortBy::Name) => matches.sort_by_key(|r| r.name.to_lowercase()),
            Some(SortBy::Availability) => matches.sort_by_key(|r| {
                let free = slots
                    .get(&r.id)
                    .map_or(0, |s| s.iter().filter(|s| s.available).count());
                std::cmp::Reverse(free)
            }),
            // Without a reference point distance sorting keeps id order.
            Some(SortBy::Distance) | None => {},
        }

        let total = matches.len();
        let offset = params.offset.unwrap_or(0) as usize;
        let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE) as usize;
        let items: Vec<LocationRecord> = matches.into_iter().skip(offset).take(limit).collect();
        let has_more = offset + items.len() < total;

        debug!(
            query = %params.canonical(),
            total,
            returned = items.len(),
            "Static source listed locations"
        );

        Ok(LocationPage {
            items,
            total_count: total as u64,
            has_more,
        })
    }

    async fn fetch_location_detail(
        &self,
        id: &LocationId,
        date: NaiveDate,
    ) -> Result<LocationDetail> {
        self.ensure_online()?;
        let record = self.get(id)?;

        let slots = if day_hours(&record.hours, date.weekday()).closed {
            Vec::new()
        } else {
            self.timeslots.read().get(id).cloned().unwrap_or_default()
        };
        let is_open_now = is_open_at(&record, self.local_now());

        Ok(LocationDetail {
            record,
            date,
            slots,
            is_open_now,
        })
    }

    async fn fetch_location_status(&self, id: &LocationId) -> Result<StatusSnapshot> {
        self.ensure_online()?;
        let record = self.get(id)?;

        Ok(StatusSnapshot {
            location_id: record.id.clone(),
            status: record.status,
            is_open_now: is_open_at(&record, self.local_now()),
            last_updated: record.updated_at,
        })
    }

    async fn persist_location_update(&self, request: &UpdateRequest) -> Result<UpdateAck> {
        self.ensure_online()?;

        let mut records = self.records.write();
        let record = records
            .get_mut(&request.location_id)
            .ok_or_else(|| LocationError::not_found(format!("location {}", request.location_id)))?;

        let now = Utc::now();
        record.apply(&request.updates);
        record.updated_at = now;
        record.source = request.source;

        info!(
            location_id = %request.location_id,
            updated_by = request.updated_by.as_deref().unwrap_or("-"),
            "Static source persisted update"
        );

        Ok(UpdateAck {
            location_id: request.location_id.clone(),
            updated_at: now,
        })
    }

    async fn health_check(&self) -> Result<()> {
        self.ensure_online()
    }

    fn name(&self) -> &str {
        "static"
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn matches_search(record: &LocationRecord, params: &SearchParams) -> bool {
    if let Some(query) = params.query.as_deref().filter(|q| !q.trim().is_empty()) {
        let query = query.trim();
        let hit = contains_ci(&record.name, query)
            || contains_ci(&record.address, query)
            || contains_ci(&record.neighborhood, query)
            || record
                .description
                .as_deref()
                .is_some_and(|d| contains_ci(d, query));
        if !hit {
            return false;
        }
    }

    if let Some(city) = &params.city
        && !record.city.eq_ignore_ascii_case(city.trim())
    {
        return false;
    }

    if let Some(neighborhood) = &params.neighborhood
        && !record.neighborhood.eq_ignore_ascii_case(neighborhood.trim())
    {
        return false;
    }

    if !params.status.is_empty() && !params.status.contains(&record.status) {
        return false;
    }

    params.facilities.iter().all(|wanted| {
        record
            .facilities
            .iter()
            .any(|f| f.available && &f.kind == wanted)
    })
}

fn day_hours(hours: &WeeklySchedule, day: Weekday) -> &OperatingHours {
    match day {
        Weekday::Mon => &hours.monday,
        Weekday::Tue => &hours.tuesday,
        Weekday::Wed => &hours.wednesday,
        Weekday::Thu => &hours.thursday,
        Weekday::Fri => &hours.friday,
        Weekday::Sat => &hours.saturday,
        Weekday::Sun => &hours.sunday,
    }
}

/// Returns true if the location is active and within its opening hours
/// (outside its lunch break) at the given local time.
pub fn is_open_at(record: &LocationRecord, at: NaiveDateTime) -> bool {
    if record.status != LocationStatus::Active {
        return false;
    }

    let hours = day_hours(&record.hours, at.weekday());
    if hours.closed {
        return false;
    }

    let parse = |s: &str| NaiveTime::parse_from_str(s, "%H:%M").ok();
    let now = at.time();
    let within = match (parse(&hours.opens), parse(&hours.closes)) {
        (Some(opens), Some(closes)) => opens <= now && now < closes,
        _ => false,
    };

    let at_lunch = hours.lunch.as_ref().is_some_and(|lunch| {
        match (parse(&lunch.starts), parse(&lunch.ends)) {
            (Some(starts), Some(ends)) => starts <= now && now < ends,
            _ => false,
        }
    });

    within && !at_lunch
}
