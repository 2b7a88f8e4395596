//! Error types for Locus.
//!
//! Every failure the location layer can observe is one of five kinds, and
//! recovery policy is decided per kind.
//!
//! # Example
//!
//! ```
//! use locus_core::{ErrorKind, LocationError};
//!
//! let error = LocationError::network("connection reset");
//! assert_eq!(error.kind(), ErrorKind::Network);
//! assert!(error.is_transient());
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::ValidationIssue;

/// Main error type for location operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    /// The data source could not be reached, or an attempt timed out.
    #[error("network error: {message}")]
    Network {
        /// Description of the failure
        message: String,
    },

    /// The data was rejected by validation.
    #[error("validation failed for fields: {}", field_list(issues))]
    Validation {
        /// Field-level issues, in the order they were found
        issues: Vec<ValidationIssue>,
    },

    /// The requested resource does not exist.
    #[error("not found: {resource}")]
    NotFound {
        /// The resource that was requested
        resource: String,
    },

    /// The data source asked us to slow down.
    #[error("rate limited: {message}")]
    RateLimited {
        /// Description from the data source
        message: String,
        /// Server-provided delay before the next attempt
        retry_after: Option<Duration>,
    },

    /// Anything else.
    #[error("unexpected error: {message}")]
    Unknown {
        /// Description of the failure
        message: String,
    },
}

fn field_list(issues: &[ValidationIssue]) -> String {
    let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
    fields.join(", ")
}

impl LocationError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates the network error reported when an attempt exceeds its budget.
    pub fn timeout(limit: Duration) -> Self {
        Self::Network {
            message: format!("operation timed out after {}ms", limit.as_millis()),
        }
    }

    /// Creates a validation error from the issues found.
    pub fn validation(issues: Vec<ValidationIssue>) -> Self {
        Self::Validation { issues }
    }

    /// Creates a not-found error.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Creates a rate-limited error with an optional delay hint.
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after,
        }
    }

    /// Creates an unknown error.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Unknown { .. } => ErrorKind::Unknown,
        }
    }

    /// Returns true if a retry might succeed.
    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    /// Names of the fields that failed validation, empty for other kinds.
    pub fn invalid_fields(&self) -> Vec<&str> {
        match self {
            Self::Validation { issues } => issues.iter().map(|i| i.field.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// The server-provided retry delay, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Classification of a [`LocationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Validation,
    NotFound,
    RateLimited,
    Unknown,
}

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [ErrorKind; 5] = [
        Self::Network,
        Self::Validation,
        Self::NotFound,
        Self::RateLimited,
        Self::Unknown,
    ];

    /// Stable label, used for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::RateLimited => "rate_limited",
            Self::Unknown => "unknown",
        }
    }

    /// Network and rate-limit failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimited)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result alias for location operations.
pub type Result<T> = std::result::Result<T, LocationError>;
