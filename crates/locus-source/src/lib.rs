//! # Locus Source
//!
//! Data source abstraction for the Locus caching layer.
//!
//! The backend that owns location records is an external collaborator. This
//! crate defines the [`LocationSource`] trait the caching layer is written
//! against, and [`StaticSource`], an in-memory implementation loaded from
//! YAML or JSON fixtures.
//!
//! ## Example
//!
//! ```ignore
//! use locus_source::{LocationSource, StaticSource};
//!
//! let source = StaticSource::from_path("fixtures/locations.yml")?;
//! let status = source.fetch_location_status(&"loc-1".into()).await?;
//! ```

pub mod error;
pub mod fixture;
pub mod source;
pub mod static_source;

// Re-exports
pub use async_trait::async_trait;
pub use error::SourceError;
pub use fixture::{Fixture, FixtureFormat};
pub use source::LocationSource;
pub use static_source::{DEFAULT_PAGE_SIZE, StaticSource, is_open_at};

// Re-export locus_core for consumers
pub use locus_core;
