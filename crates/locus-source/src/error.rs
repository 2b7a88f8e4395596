//! Error types for loading location fixtures.

use std::path::PathBuf;

/// Errors that can occur while loading a fixture into a [`StaticSource`].
///
/// Runtime failures of the data source itself are reported as
/// [`locus_core::LocationError`]; this type only covers setup.
///
/// [`StaticSource`]: crate::StaticSource
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a fixture file.
    #[error("parse error in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// The fixture format is not supported.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The fixture parsed but its content is inconsistent.
    #[error("invalid fixture: {0}")]
    InvalidFixture(String),
}

impl SourceError {
    /// Creates a new parse error.
    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new invalid fixture error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidFixture(reason.into())
    }
}
