//! Refresh endpoint handlers.

use std::str::FromStr;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use locus_core::{ErrorKind, LocationId};
use locus_sync::{Priority, RefreshTask, TaskId, TaskState};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::state::AppState;

/// Body of `POST /refresh`. Without location ids, everything cached is
/// refreshed.
#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RefreshRequest {
    pub priority: Priority,
    pub location_ids: Option<Vec<LocationId>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub task_ids: Vec<TaskId>,
}

/// Wire view of a refresh task.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskView {
    pub id: TaskId,
    pub target: String,
    pub priority: Priority,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub fallback_used: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TaskId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl From<RefreshTask> for TaskView {
    fn from(task: RefreshTask) -> Self {
        Self {
            id: task.id,
            target: task.target.to_string(),
            priority: task.priority,
            state: task.state,
            created_at: task.created_at,
            started_at: task.started_at,
            finished_at: task.finished_at,
            attempts: task.attempts,
            error_kind: task.last_error.as_ref().map(|e| e.kind()),
            last_error: task.last_error.map(|e| e.to_string()),
            fallback_used: task.fallback_used,
            children: task.children,
            duration_ms: task.duration.map(|d| d.as_millis() as u64),
        }
    }
}

/// POST /refresh
#[instrument(skip_all)]
pub async fn start_refresh(
    State(state): State<AppState>,
    body: Option<Json<RefreshRequest>>,
) -> (StatusCode, Json<RefreshResponse>) {
    let Json(request) = body.unwrap_or_default();
    let manager = state.manager();

    let task_ids = match request.location_ids {
        Some(ids) => manager.refresh_locations(&ids, request.priority),
        None => vec![manager.refresh_all(request.priority)],
    };

    info!(
        priority = %request.priority,
        tasks = task_ids.len(),
        "Refresh requested"
    );
    (StatusCode::ACCEPTED, Json(RefreshResponse { task_ids }))
}

/// GET /refresh/{task_id}
#[instrument(skip_all, fields(task_id = %task_id))]
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskView>, AppError> {
    let id = TaskId::from_str(&task_id)
        .map_err(|e| AppError::BadRequest(format!("invalid task id '{task_id}': {e}")))?;

    state
        .manager()
        .task(id)
        .map(|task| Json(TaskView::from(task)))
        .ok_or(AppError::TaskNotFound(task_id))
}
