//! Refresh, event and cache administration endpoint tests.

mod helpers;

use std::str::FromStr;

use axum::http::StatusCode;
use helpers::test_app;
use locus_sync::{TaskId, TaskState};
use serde_json::json;

#[tokio::test]
async fn test_refresh_locations() {
    let app = test_app();

    let response = app
        .client
        .post_json(
            "/refresh",
            json!({ "priority": "critical", "locationIds": ["loc-1", "loc-3"] }),
        )
        .await;
    response.assert_status(StatusCode::ACCEPTED);

    let task_ids = response.json()["taskIds"].as_array().unwrap().clone();
    assert!(!task_ids.is_empty());

    for id in task_ids {
        let id = TaskId::from_str(id.as_str().unwrap()).unwrap();
        let task = app.manager().wait_task(id).await.unwrap();
        assert_eq!(task.state, TaskState::Completed);
    }
}

#[tokio::test]
async fn test_refresh_all_without_body() {
    let app = test_app();
    app.client.get("/locations").await;

    let response = app.client.post_empty("/refresh").await;
    response.assert_status(StatusCode::ACCEPTED);

    let task_ids = response.json()["taskIds"].as_array().unwrap().clone();
    assert_eq!(task_ids.len(), 1);
}

#[tokio::test]
async fn test_get_refresh_task() {
    let app = test_app();

    let response = app
        .client
        .post_json("/refresh", json!({ "locationIds": ["loc-1"] }))
        .await;
    let task_id = response.json()["taskIds"][0].as_str().unwrap().to_string();
    app.manager()
        .wait_task(TaskId::from_str(&task_id).unwrap())
        .await;

    let response = app.client.get(&format!("/refresh/{task_id}")).await;
    response.assert_status(StatusCode::OK);

    let body = response.json();
    assert_eq!(body["id"], task_id.as_str());
    assert_eq!(body["state"], "completed");
    assert_eq!(body["target"], "location:loc-1:status");
    assert_eq!(body["priority"], "normal");
    assert_eq!(body["attempts"], 1);
    assert_eq!(body["fallbackUsed"], false);
}

#[tokio::test]
async fn test_get_refresh_task_with_invalid_id() {
    let app = test_app();

    let response = app.client.get("/refresh/not-a-uuid").await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_unknown_refresh_task() {
    let app = test_app();

    let response = app
        .client
        .get("/refresh/01890a5d-ac96-774b-bcce-b302099a8057")
        .await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_event_is_applied_once() {
    let app = test_app();
    app.client.get("/locations/loc-1/status").await;

    let event = json!({
        "type": "location-status-changed",
        "locationId": "loc-1",
        "newStatus": "fechado",
        "timestamp": "2026-10-18T12:00:00Z"
    });

    let response = app.client.post_json("/events", event.clone()).await;
    response.assert_status(StatusCode::ACCEPTED);
    let body = response.json();
    assert_eq!(body["applied"], true);
    assert_eq!(body["invalidation"]["locationId"], "loc-1");
    assert_eq!(body["invalidation"]["expired"], json!(["location:loc-1:status"]));

    // Redelivery is ignored
    let response = app.client.post_json("/events", event).await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.json()["applied"], false);
}

#[tokio::test]
async fn test_malformed_event_is_rejected() {
    let app = test_app();

    let response = app
        .client
        .post_json("/events", json!({ "type": "location-moved", "locationId": "loc-1" }))
        .await;

    assert!(response.status.is_client_error());
}

#[tokio::test]
async fn test_reset_cache() {
    let app = test_app();
    app.client.get("/locations").await;
    app.client.get("/locations/loc-1/status").await;

    let response = app.client.delete("/cache").await;
    response.assert_status(StatusCode::OK);

    let body = response.json();
    assert_eq!(body["invalidated"], 2);
    assert_eq!(body["message"], "Invalidated all 2 cache entries");
    assert!(app.manager().store().is_empty());
    assert_eq!(app.manager().statistics().cache.misses, 0);
}

#[tokio::test]
async fn test_cache_audit() {
    let app = test_app();

    let response = app.client.get("/cache/audit").await;
    response.assert_status(StatusCode::OK);
    assert_eq!(response.json(), json!([]));

    app.client.get("/locations").await;

    let response = app.client.get("/cache/audit").await;
    response.assert_status(StatusCode::OK);
    for finding in response.json().as_array().unwrap() {
        assert_eq!(finding["key"], "locations:all");
    }
}
