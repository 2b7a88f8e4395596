//! Integration tests for change notification handling.

mod common;

use std::time::Duration;

use chrono::{TimeZone, Utc};
use common::{MockSource, id, manager};
use locus_core::{ChangeNotification, LocationStatus, SearchParams};
use locus_sync::{CacheKey, ChangeKind, Priority, SyncEvent, TaskState};
use tokio::time::sleep;

fn at(seconds: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_767_000_000 + seconds, 0).unwrap()
}

fn status_changed(location: &str, status: LocationStatus, seconds: i64) -> ChangeNotification {
    ChangeNotification::StatusChanged {
        location_id: id(location),
        new_status: status,
        timestamp: at(seconds),
    }
}

#[tokio::test(start_paused = true)]
async fn test_redelivered_notifications_are_dropped() {
    let source = MockSource::with_locations(&["loc-1"]);
    let manager = manager(&source);
    manager.get_location_status(&id("loc-1")).await.unwrap();

    let first = manager.handle_notification(&status_changed("loc-1", LocationStatus::Closed, 10));
    assert!(first.is_some());

    assert!(
        manager
            .handle_notification(&status_changed("loc-1", LocationStatus::Closed, 10))
            .is_none()
    );
    assert!(
        manager
            .handle_notification(&status_changed("loc-1", LocationStatus::Active, 5))
            .is_none()
    );

    // Each kind keeps its own clock
    let data = manager.handle_notification(&ChangeNotification::DataUpdated {
        location_id: id("loc-1"),
        timestamp: at(5),
    });
    assert_eq!(data.unwrap().kind, ChangeKind::Data);

    // And each location
    assert!(
        manager
            .handle_notification(&status_changed("loc-2", LocationStatus::Active, 1))
            .is_some()
    );
}

#[tokio::test(start_paused = true)]
async fn test_reset_forgets_applied_timestamps() {
    let source = MockSource::with_locations(&["loc-1"]);
    let manager = manager(&source);

    assert!(
        manager
            .handle_notification(&status_changed("loc-1", LocationStatus::Closed, 10))
            .is_some()
    );
    manager.reset();
    assert!(
        manager
            .handle_notification(&status_changed("loc-1", LocationStatus::Closed, 10))
            .is_some()
    );
}

#[tokio::test(start_paused = true)]
async fn test_status_change_leaves_lists_alone() {
    let source = MockSource::with_locations(&["loc-1", "loc-2"]);
    let manager = manager(&source);
    manager.get_locations(SearchParams::default()).await.unwrap();
    manager.get_location_status(&id("loc-1")).await.unwrap();

    let report = manager
        .handle_notification(&status_changed("loc-1", LocationStatus::Closed, 1))
        .unwrap();

    assert_eq!(report.expired, vec!["location:loc-1:status".to_string()]);
    assert_eq!(report.task_ids.len(), 1);
    assert!(
        manager
            .store()
            .peek(&CacheKey::List(SearchParams::default()))
            .is_some()
    );
}

#[tokio::test(start_paused = true)]
async fn test_data_update_expires_lists_and_refreshes_them() {
    let source = MockSource::with_locations(&["loc-1", "loc-2"]);
    let manager = manager(&source);
    let list_key = CacheKey::List(SearchParams::default());
    let other_list = CacheKey::List(SearchParams::with_limit(1));

    manager.get_locations(SearchParams::default()).await.unwrap();
    manager.get_locations(SearchParams::with_limit(1)).await.unwrap();
    manager.get_location_status(&id("loc-2")).await.unwrap();

    let report = manager
        .invalidator()
        .on_data_updated(&id("loc-2"), at(1))
        .unwrap();

    // The one-item page only holds loc-1
    assert_eq!(report.expired.len(), 2);
    assert!(report.expired.contains(&list_key.to_string()));
    assert!(!report.expired.contains(&other_list.to_string()));
    assert!(manager.store().peek(&list_key).is_none());
    assert!(manager.store().peek(&other_list).is_some());

    for task_id in &report.task_ids {
        let task = manager.wait_task(*task_id).await.unwrap();
        assert_eq!(task.state, TaskState::Completed);
    }
    let list_task = report
        .task_ids
        .iter()
        .filter_map(|task_id| manager.task(*task_id))
        .find(|task| task.target.key() == Some(&list_key))
        .unwrap();
    assert_eq!(list_task.priority, Priority::Normal);

    assert!(manager.store().peek(&list_key).is_some());
    assert_eq!(source.calls("list", "all"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_invalidation_publishes_expired_keys() {
    let source = MockSource::with_locations(&["loc-1"]);
    let manager = manager(&source);
    manager.get_location_status(&id("loc-1")).await.unwrap();
    let mut events = manager.events().subscribe();

    manager.handle_notification(&status_changed("loc-1", LocationStatus::Closed, 1));
    sleep(Duration::from_secs(1)).await;

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    assert_eq!(
        received[0],
        SyncEvent::CacheInvalidated {
            key: "location:loc-1:status".to_string()
        }
    );
    assert!(received.iter().any(|event| matches!(
        event,
        SyncEvent::RefreshCompleted { key, .. } if key == "location:loc-1:status"
    )));
}

#[tokio::test(start_paused = true)]
async fn test_uncached_location_still_gets_a_status_refresh() {
    let source = MockSource::with_locations(&["loc-1"]);
    let manager = manager(&source);

    let report = manager
        .invalidator()
        .invalidate_location(&id("loc-1"), ChangeKind::Status);

    assert!(report.expired.is_empty());
    assert_eq!(report.task_ids.len(), 1);
    manager.wait_task(report.task_ids[0]).await.unwrap();
    assert!(
        manager
            .store()
            .peek(&CacheKey::Status(id("loc-1")))
            .is_some()
    );
}

#[tokio::test(start_paused = true)]
async fn test_event_during_cold_fetch_refetches_status() {
    let source = MockSource::with_locations(&["loc-1"]);
    let manager = manager(&source);

    source.delay_next(Duration::from_secs(8));
    let first = manager.scheduler().schedule(CacheKey::Status(id("loc-1")), Priority::Normal);
    sleep(Duration::from_secs(2)).await;

    source.set_status("loc-1", LocationStatus::Closed);
    let report = manager
        .handle_notification(&status_changed("loc-1", LocationStatus::Closed, 1))
        .unwrap();

    assert!(report.expired.is_empty());
    assert_eq!(report.task_ids.len(), 1);
    assert_ne!(report.task_ids[0], first);

    assert_eq!(
        manager.wait_task(report.task_ids[0]).await.unwrap().state,
        TaskState::Completed
    );
    assert_eq!(
        manager.wait_task(first).await.unwrap().state,
        TaskState::Superseded
    );

    let served = manager.get_location_status(&id("loc-1")).await.unwrap();
    assert_eq!(served.value.status, LocationStatus::Closed);
    assert_eq!(source.calls("status", "loc-1"), 2);
}
