//! Integration tests for the refresh scheduler.

mod common;

use std::time::Duration;

use common::{MockSource, id, manager, manager_with, test_config};
use locus_core::{ErrorKind, LocationError, LocationStatus};
use locus_sync::refresh::Sweeper;
use locus_sync::{
    CacheKey, CacheStrategy, Priority, RefreshOutcome, RefreshTarget, SyncConfig, SyncEvent,
    TaskState,
};
use tokio::time::sleep;

fn status_key(value: &str) -> CacheKey {
    CacheKey::Status(id(value))
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_requests_share_one_task() {
    let source = MockSource::with_locations(&["loc-1"]);
    let manager = manager(&source);
    let scheduler = manager.scheduler();

    source.delay_next(Duration::from_secs(5));
    let first = scheduler.schedule(status_key("loc-1"), Priority::Normal);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(scheduler.status(first).unwrap().state, TaskState::Active);

    let second = scheduler.schedule(status_key("loc-1"), Priority::Normal);
    assert_eq!(first, second);

    let task = scheduler.wait(first).await.unwrap();
    assert_eq!(task.state, TaskState::Completed);
    assert_eq!(source.calls("status", "loc-1"), 1);
    assert_eq!(scheduler.stats().total, 1);
}

#[tokio::test(start_paused = true)]
async fn test_pending_task_is_upgraded() {
    let source = MockSource::with_locations(&["loc-1", "loc-2"]);
    let manager = manager_with(
        &source,
        SyncConfig {
            max_concurrent_refreshes: 1,
            ..test_config()
        },
    );
    let scheduler = manager.scheduler();

    source.delay_next(Duration::from_secs(5));
    scheduler.schedule(status_key("loc-1"), Priority::Normal);
    let pending = scheduler.schedule(status_key("loc-2"), Priority::Background);
    let upgraded = scheduler.schedule(status_key("loc-2"), Priority::Critical);

    assert_eq!(pending, upgraded);
    let task = scheduler.status(pending).unwrap();
    assert_eq!(task.state, TaskState::Pending);
    assert_eq!(task.priority, Priority::Critical);

    assert_eq!(
        scheduler.wait(pending).await.unwrap().state,
        TaskState::Completed
    );
    assert_eq!(source.calls("status", "loc-2"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_queue_serves_priorities_in_order() {
    let source = MockSource::with_locations(&["loc-1", "loc-2", "loc-3", "loc-4"]);
    let manager = manager_with(
        &source,
        SyncConfig {
            max_concurrent_refreshes: 1,
            ..test_config()
        },
    );
    let scheduler = manager.scheduler();
    let mut events = manager.events().subscribe();

    source.delay_next(Duration::from_secs(5));
    let running = scheduler.schedule(status_key("loc-1"), Priority::Normal);
    let background = scheduler.schedule(status_key("loc-2"), Priority::Background);
    scheduler.schedule(status_key("loc-3"), Priority::Critical);
    scheduler.schedule(status_key("loc-4"), Priority::Normal);

    assert_eq!(scheduler.stats().active, 1);
    assert_eq!(scheduler.stats().queued, 3);

    scheduler.wait(running).await;
    scheduler.wait(background).await;

    let mut order = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SyncEvent::RefreshCompleted { key, outcome, .. } = event {
            assert_eq!(outcome, RefreshOutcome::Completed);
            order.push(key);
        }
    }
    assert_eq!(
        order,
        vec![
            "location:loc-1:status",
            "location:loc-3:status",
            "location:loc-4:status",
            "location:loc-2:status",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_older_completion_is_superseded() {
    let source = MockSource::with_locations(&["loc-1"]);
    let manager = manager(&source);
    let scheduler = manager.scheduler();
    let key = status_key("loc-1");

    // The first fetch reads "ativo" and takes 10s to return it.
    source.delay_next(Duration::from_secs(10));
    let older = scheduler.schedule(key.clone(), Priority::Normal);
    sleep(Duration::from_secs(1)).await;

    source.set_status("loc-1", LocationStatus::Maintenance);
    let newer = scheduler.force_refresh(key.clone());
    assert_ne!(older, newer);

    assert_eq!(scheduler.wait(newer).await.unwrap().state, TaskState::Completed);
    assert_eq!(
        scheduler.wait(older).await.unwrap().state,
        TaskState::Superseded
    );

    let cached = manager.store().peek(&key).unwrap().value;
    assert_eq!(
        cached.as_status().unwrap().status,
        LocationStatus::Maintenance
    );
    assert_eq!(scheduler.stats().superseded, 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalidation_detaches_in_flight_task() {
    let source = MockSource::with_locations(&["loc-1"]);
    let manager = manager(&source);
    let scheduler = manager.scheduler();
    let key = status_key("loc-1");

    source.delay_next(Duration::from_secs(5));
    let in_flight = scheduler.schedule(key.clone(), Priority::Normal);
    sleep(Duration::from_secs(1)).await;

    manager.store().invalidate(&key);
    let fresh = scheduler.schedule(key.clone(), Priority::Critical);
    assert_ne!(in_flight, fresh);

    assert_eq!(scheduler.wait(fresh).await.unwrap().state, TaskState::Completed);
    assert_eq!(
        scheduler.wait(in_flight).await.unwrap().state,
        TaskState::Superseded
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_retried() {
    let source = MockSource::with_locations(&["loc-1"]);
    let manager = manager_with(
        &source,
        SyncConfig {
            task_timeout: Duration::from_secs(2),
            ..test_config()
        },
    );
    let scheduler = manager.scheduler();

    source.delay_next(Duration::from_secs(5));
    let task_id = scheduler.schedule(status_key("loc-1"), Priority::Normal);
    let task = scheduler.wait(task_id).await.unwrap();

    assert_eq!(task.state, TaskState::Completed);
    assert_eq!(task.attempts, 2);
    assert_eq!(
        task.last_error.as_ref().map(LocationError::kind),
        Some(ErrorKind::Network)
    );

    let errors = manager.recovery().stats();
    assert_eq!(errors.total_operations, 2);
    assert_eq!(errors.total_errors, 1);
    assert_eq!(errors.recoveries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_not_found_is_not_retried() {
    let source = MockSource::with_locations(&[]);
    let manager = manager(&source);
    let scheduler = manager.scheduler();

    let task_id = scheduler.schedule(status_key("loc-9"), Priority::Normal);
    let task = scheduler.wait(task_id).await.unwrap();

    assert_eq!(task.state, TaskState::Failed);
    assert_eq!(task.attempts, 1);
    assert!(!task.fallback_used);
    assert!(matches!(task.last_error, Some(LocationError::NotFound { .. })));
    assert_eq!(source.calls("status", "loc-9"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_fail_the_task() {
    let source = MockSource::with_locations(&["loc-1"]);
    let manager = manager(&source);
    let scheduler = manager.scheduler();
    source.fail_with(LocationError::network("connection refused"));

    let task_id = scheduler.schedule(status_key("loc-1"), Priority::Normal);
    let task = scheduler.wait(task_id).await.unwrap();

    assert_eq!(task.state, TaskState::Failed);
    assert_eq!(task.attempts, 3);
    assert_eq!(source.calls("status", "loc-1"), 3);
    assert!(task.finished_at.is_some());
    assert_eq!(scheduler.stats().failed, 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_all_fails_live_tasks_and_frees_slots() {
    let source = MockSource::with_locations(&["loc-1", "loc-2"]);
    let manager = manager_with(
        &source,
        SyncConfig {
            max_concurrent_refreshes: 1,
            ..test_config()
        },
    );
    let scheduler = manager.scheduler();

    source.delay_next(Duration::from_secs(60));
    let active = scheduler.schedule(status_key("loc-1"), Priority::Normal);
    let queued = scheduler.schedule(status_key("loc-2"), Priority::Normal);
    sleep(Duration::from_secs(1)).await;

    assert_eq!(scheduler.cancel_all(), 2);
    for task_id in [active, queued] {
        let task = scheduler.wait(task_id).await.unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert!(task.last_error.unwrap().to_string().contains("cancelled"));
    }
    assert_eq!(scheduler.stats().queued, 0);

    let after = scheduler.schedule(status_key("loc-2"), Priority::Normal);
    assert_eq!(scheduler.wait(after).await.unwrap().state, TaskState::Completed);
    assert!(manager.store().peek(&status_key("loc-1")).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_all_fans_out() {
    let source = MockSource::with_locations(&["loc-1", "loc-2"]);
    let manager = manager(&source);
    manager.get_location_status(&id("loc-1")).await.unwrap();
    manager.get_location_status(&id("loc-2")).await.unwrap();

    let parent = manager.refresh_all(Priority::Normal);
    assert_eq!(manager.refresh_all(Priority::Normal), parent);

    let task = manager.wait_task(parent).await.unwrap();
    assert_eq!(task.target, RefreshTarget::All);
    assert_eq!(task.state, TaskState::Completed);
    assert_eq!(task.children.len(), 2);
    assert_eq!(source.calls("status", "loc-1"), 2);
    assert_eq!(source.calls("status", "loc-2"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_terminal_tasks_are_collected() {
    let source = MockSource::with_locations(&["loc-1", "loc-2"]);
    let manager = manager_with(
        &source,
        SyncConfig {
            task_retention: Duration::from_secs(5),
            ..test_config()
        },
    );
    let scheduler = manager.scheduler();

    let old = scheduler.schedule(status_key("loc-1"), Priority::Normal);
    scheduler.wait(old).await;
    sleep(Duration::from_secs(6)).await;

    let recent = scheduler.schedule(status_key("loc-2"), Priority::Normal);
    scheduler.wait(recent).await;

    assert!(scheduler.status(old).is_none());
    assert!(scheduler.status(recent).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_sweep_refreshes_stale_and_purges_expired() {
    let source = MockSource::with_locations(&["loc-1", "loc-2"]);
    let config = test_config();
    let manager = manager_with(&source, config.clone());
    let sweeper = Sweeper::new(
        manager.store().clone(),
        manager.scheduler().clone(),
        &config,
    );

    manager.get_location_status(&id("loc-1")).await.unwrap();
    sleep(Duration::from_secs(61)).await;

    let report = sweeper.sweep_once();
    assert_eq!(report.scheduled, 1);
    assert_eq!(report.purged, 0);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls("status", "loc-1"), 2);

    manager.store().invalidate(&status_key("loc-1"));
    manager.get_location_status(&id("loc-2")).await.unwrap();
    sleep(Duration::from_secs(901)).await;

    let report = sweeper.sweep_once();
    assert_eq!(report.purged, 1);
    assert!(manager.store().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_minimal_strategy_drops_stale_entries() {
    let source = MockSource::with_locations(&["loc-1"]);
    let config = SyncConfig {
        cache_strategy: CacheStrategy::Minimal,
        ..test_config()
    };
    let manager = manager_with(&source, config.clone());
    let sweeper = Sweeper::new(
        manager.store().clone(),
        manager.scheduler().clone(),
        &config,
    );

    manager.get_location_status(&id("loc-1")).await.unwrap();
    sleep(Duration::from_secs(61)).await;

    let report = sweeper.sweep_once();
    assert_eq!(report.dropped, 1);
    assert_eq!(report.scheduled, 0);
    assert!(manager.store().is_empty());
    assert_eq!(source.calls("status", "loc-1"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_in_flight_keys_are_listed_per_location() {
    let source = MockSource::with_locations(&["loc-1", "loc-2"]);
    let manager = manager(&source);
    let scheduler = manager.scheduler();

    source.delay_next(Duration::from_secs(5));
    let task = scheduler.schedule(status_key("loc-1"), Priority::Normal);
    sleep(Duration::from_secs(1)).await;

    assert_eq!(scheduler.in_flight_keys(&id("loc-1")), vec![status_key("loc-1")]);
    assert!(scheduler.in_flight_keys(&id("loc-2")).is_empty());

    scheduler.wait(task).await.unwrap();
    assert!(scheduler.in_flight_keys(&id("loc-1")).is_empty());
}
