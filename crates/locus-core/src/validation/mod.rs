//! Structural and business-rule validation of location data.
//!
//! The validator is pure: it never mutates its input and never performs
//! I/O. It is used as a gate before updates are persisted, before refreshed
//! data is written to the cache, and as a read-side audit.

mod result;
mod validator;

pub use result::{Severity, ValidationIssue, ValidationResult};
pub use validator::LocationValidator;
