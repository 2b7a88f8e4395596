//! Validation result types.

use serde::{Deserialize, Serialize};

use super::validator::REQUIRED_FIELDS;
use crate::error::LocationError;

/// How serious a validation issue is. Only `Error` makes a result invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A problem found on a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Wire name of the field (e.g. `nome_local`).
    pub field: String,
    /// Human readable description.
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Outcome of validating a record or a partial update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    /// Field-level issues in the order they were found.
    pub issues: Vec<ValidationIssue>,
    /// Record-level observations that never affect validity.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub(crate) fn from_parts(issues: Vec<ValidationIssue>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: !issues.iter().any(ValidationIssue::is_error),
            issues,
            warnings,
        }
    }

    /// Issues with `Error` severity.
    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.is_error())
    }

    /// Returns true if `field` has an error-level issue.
    pub fn has_error_for(&self, field: &str) -> bool {
        self.errors().any(|i| i.field == field)
    }

    /// Converts an invalid result into a [`LocationError::Validation`]
    /// carrying only the error-level issues.
    pub fn into_error(self) -> Option<LocationError> {
        if self.is_valid {
            return None;
        }
        let errors = self.issues.into_iter().filter(|i| i.is_error()).collect();
        Some(LocationError::validation(errors))
    }

    /// Like [`into_error`](Self::into_error), but only error-level issues
    /// on required fields count.
    pub fn into_required_error(self) -> Option<LocationError> {
        let errors: Vec<ValidationIssue> = self
            .issues
            .into_iter()
            .filter(|i| i.is_error() && REQUIRED_FIELDS.contains(&i.field.as_str()))
            .collect();
        (!errors.is_empty()).then(|| LocationError::validation(errors))
    }

    /// `field: message` lines for display.
    pub fn messages(&self) -> Vec<String> {
        self.issues
            .iter()
            .map(|i| format!("{}: {}", i.field, i.message))
            .collect()
    }
}
