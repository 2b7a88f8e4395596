//! Locus Core - Domain types, errors and validation
//!
//! This crate provides the foundational types shared by the Locus source
//! adapters, the caching and refresh layer, and the HTTP server.

pub mod error;
pub mod types;
pub mod validation;

pub use error::{ErrorKind, LocationError, Result};
pub use types::{
    ChangeNotification, ConsultationType, CoordinatePrecision, Coordinates, DataSource, Facility,
    FacilityCost, FacilityType, LocationDetail, LocationId, LocationPage, LocationPatch,
    LocationRecord, LocationStatus, LunchBreak, OperatingHours, SearchParams, SortBy,
    StatusSnapshot, TimeSlot, UpdateAck, UpdateRequest, WeeklySchedule,
};
pub use validation::{LocationValidator, Severity, ValidationIssue, ValidationResult};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
