//! Health and statistics handlers.

use axum::{Json, extract::State, http::StatusCode};
use locus_sync::{HealthReport, HealthStatus, ManagerStatistics};

use crate::state::AppState;

/// GET /health
///
/// Answers 503 when the health is critical.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.manager().health();
    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Warning => StatusCode::OK,
        HealthStatus::Critical => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, Json(report))
}

/// GET /stats
pub async fn statistics(State(state): State<AppState>) -> Json<ManagerStatistics> {
    Json(state.manager().statistics())
}
