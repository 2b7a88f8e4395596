//! HTTP error mapping.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use locus_core::{ErrorKind, LocationError, ValidationIssue};
use serde::Serialize;
use thiserror::Error;

/// Errors returned by handlers.
#[derive(Debug, Error)]
pub enum AppError {
    /// A caching layer or data source error.
    #[error(transparent)]
    Location(#[from] LocationError),

    /// Malformed request parameters.
    #[error("{0}")]
    BadRequest(String),

    /// No refresh task with this id is retained.
    #[error("refresh task {0} not found")]
    TaskNotFound(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    issues: Vec<ValidationIssue>,
}

impl AppError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Location(error) => match error.kind() {
                ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                ErrorKind::Network => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.to_string();

        let (kind, issues, retry_after) = match self {
            AppError::Location(error) => {
                let retry_after = error.retry_after();
                let kind = error.kind();
                let issues = match error {
                    LocationError::Validation { issues } => issues,
                    _ => Vec::new(),
                };
                (Some(kind), issues, retry_after)
            },
            AppError::BadRequest(_) | AppError::TaskNotFound(_) => (None, Vec::new(), None),
        };

        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %message, "Request failed");
        }

        let body = Json(ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error"),
            message,
            kind,
            issues,
        });

        let mut response = (status, body).into_response();
        if let Some(delay) = retry_after {
            let seconds = delay.as_secs_f64().ceil() as u64;
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}
