//! Location fixtures.
//!
//! A fixture is a snapshot of backend data: a list of records plus the
//! bookable time slots of each location. It is what a [`StaticSource`]
//! serves.
//!
//! ```yaml
//! locations:
//!   - id: loc-1
//!     nome_local: Clinica Central
//!     # ...
//! timeslots:
//!   loc-1:
//!     - time: "09:00"
//!       available: true
//!       location_id: loc-1
//!       duration_minutes: 30
//!       medico_id: doc-1
//! ```
//!
//! [`StaticSource`]: crate::StaticSource

mod format;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use locus_core::{LocationId, LocationRecord, TimeSlot};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

pub use format::FixtureFormat;

/// Backend data snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub locations: Vec<LocationRecord>,
    #[serde(default)]
    pub timeslots: HashMap<LocationId, Vec<TimeSlot>>,
}

impl Fixture {
    /// Parses a fixture from a string in the given format.
    pub fn parse(content: &str, format: FixtureFormat) -> Result<Self, String> {
        let fixture: Self = match format {
            FixtureFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string())?,
            FixtureFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string())?,
        };
        Ok(fixture)
    }

    /// Loads and checks a fixture file.
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path)?;
        let format = FixtureFormat::detect(path, &content).ok_or_else(|| {
            SourceError::UnsupportedFormat(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default()
                    .to_string(),
            )
        })?;

        let fixture = Self::parse(&content, format).map_err(|e| SourceError::parse(path, e))?;
        fixture.check()?;
        Ok(fixture)
    }

    /// Checks that ids are unique and time slots belong to known locations.
    pub fn check(&self) -> Result<(), SourceError> {
        let mut seen = HashSet::new();
        for record in &self.locations {
            if !seen.insert(&record.id) {
                return Err(SourceError::invalid(format!(
                    "duplicate location id '{}'",
                    record.id
                )));
            }
        }

        for (id, slots) in &self.timeslots {
            if !seen.contains(id) {
                return Err(SourceError::invalid(format!(
                    "time slots for unknown location '{id}'"
                )));
            }
            if let Some(slot) = slots.iter().find(|s| &s.location_id != id) {
                return Err(SourceError::invalid(format!(
                    "slot {} listed under '{id}' belongs to '{}'",
                    slot.time, slot.location_id
                )));
            }
        }
        Ok(())
    }
}
