//! Cache administration handlers.

use axum::{Json, extract::State};
use locus_sync::AuditFinding;
use serde::Serialize;
use tracing::{info, instrument};

use crate::state::AppState;

/// Response of a cache reset.
#[derive(Debug, Serialize)]
pub struct ResetResponse {
    /// Number of entries dropped.
    pub invalidated: usize,
    pub message: String,
}

/// DELETE /cache
/// Cancels every refresh and empties the cache.
#[instrument(skip_all)]
pub async fn reset_cache(State(state): State<AppState>) -> Json<ResetResponse> {
    let manager = state.manager();
    let count = manager.store().len();
    manager.reset();

    info!(count, "Cache reset");
    Json(ResetResponse {
        invalidated: count,
        message: format!("Invalidated all {count} cache entries"),
    })
}

/// GET /cache/audit
/// Validates every cached record.
#[instrument(skip_all)]
pub async fn audit_cache(State(state): State<AppState>) -> Json<Vec<AuditFinding>> {
    Json(state.manager().validate_cached())
}
