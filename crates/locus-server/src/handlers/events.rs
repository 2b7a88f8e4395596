//! Inbound change notifications.

use axum::{Json, extract::State, http::StatusCode};
use locus_core::ChangeNotification;
use locus_sync::InvalidationReport;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    /// False when the notification was older than one already applied.
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalidation: Option<InvalidationReport>,
}

/// POST /events
#[instrument(skip_all, fields(location_id = %notification.location_id()))]
pub async fn receive_event(
    State(state): State<AppState>,
    Json(notification): Json<ChangeNotification>,
) -> (StatusCode, Json<EventResponse>) {
    match state.manager().handle_notification(&notification) {
        Some(report) => (
            StatusCode::ACCEPTED,
            Json(EventResponse {
                applied: true,
                invalidation: Some(report),
            }),
        ),
        None => {
            debug!("Notification ignored");
            (
                StatusCode::OK,
                Json(EventResponse {
                    applied: false,
                    invalidation: None,
                }),
            )
        },
    }
}
