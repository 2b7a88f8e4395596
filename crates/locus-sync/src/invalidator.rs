//! Reaction to backend change notifications.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use locus_core::{ChangeNotification, LocationId, LocationStatus};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::{CacheKey, CacheStore, InvalidationResult};
use crate::events::{EventBus, SyncEvent};
use crate::refresh::{Priority, RefreshScheduler, TaskId};

/// Which kind of change a notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Status,
    Data,
}

/// What an invalidation expired and scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidationReport {
    pub location_id: LocationId,
    pub kind: ChangeKind,
    /// Keys whose live entries were expired.
    pub expired: Vec<String>,
    /// Refresh tasks serving the affected keys.
    pub task_ids: Vec<TaskId>,
}

/// Callback invoked once the refreshes of an invalidation are terminal.
pub type Listener = Arc<dyn Fn(&InvalidationReport) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    next_id: u64,
    listeners: BTreeMap<u64, Listener>,
}

/// Keeps a listener registered. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<ListenerRegistry>>,
}

impl Subscription {
    /// Removes the listener. Same as dropping the subscription.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().listeners.remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Expires the entries of a changed location and schedules their refresh.
///
/// Entries are expired, not marked stale, so the next read never serves
/// the old value. Unrelated keys are untouched. A notification whose
/// timestamp is not newer than the last applied one for the same location
/// and kind is dropped, which makes redelivery harmless.
pub struct Invalidator {
    store: Arc<CacheStore>,
    scheduler: RefreshScheduler,
    events: EventBus,
    applied: Mutex<HashMap<(LocationId, ChangeKind), DateTime<Utc>>>,
    registry: Arc<Mutex<ListenerRegistry>>,
}

impl Invalidator {
    pub fn new(store: Arc<CacheStore>, scheduler: RefreshScheduler, events: EventBus) -> Self {
        Self {
            store,
            scheduler,
            events,
            applied: Mutex::new(HashMap::new()),
            registry: Arc::new(Mutex::new(ListenerRegistry::default())),
        }
    }

    /// Applies a notification. Returns `None` if it was dropped as
    /// out of date.
    pub fn handle(&self, notification: &ChangeNotification) -> Option<InvalidationReport> {
        match notification {
            ChangeNotification::StatusChanged {
                location_id,
                new_status,
                timestamp,
            } => self.on_status_changed(location_id, *new_status, *timestamp),
            ChangeNotification::DataUpdated {
                location_id,
                timestamp,
            } => self.on_data_updated(location_id, *timestamp),
        }
    }

    pub fn on_status_changed(
        &self,
        id: &LocationId,
        new_status: LocationStatus,
        timestamp: DateTime<Utc>,
    ) -> Option<InvalidationReport> {
        if !self.admit(id, ChangeKind::Status, timestamp) {
            return None;
        }
        info!(location_id = %id, status = %new_status, "Location status changed");
        Some(self.invalidate_location(id, ChangeKind::Status))
    }

    pub fn on_data_updated(
        &self,
        id: &LocationId,
        timestamp: DateTime<Utc>,
    ) -> Option<InvalidationReport> {
        if !self.admit(id, ChangeKind::Data, timestamp) {
            return None;
        }
        info!(location_id = %id, "Location data updated");
        Some(self.invalidate_location(id, ChangeKind::Data))
    }

    /// Expires the location's entries and schedules critical refreshes,
    /// without the timestamp check.
    ///
    /// Data changes also expire the cached list pages containing the
    /// location, which are refreshed at normal priority.
    pub fn invalidate_location(&self, id: &LocationId, kind: ChangeKind) -> InvalidationReport {
        let live = self.store.keys_for_location(id);
        let mut keys = live.clone();
        for key in self
            .scheduler
            .in_flight_keys(id)
            .into_iter()
            .chain([CacheKey::Status(id.clone())])
        {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        // Fenced whether cached or not: no fetch already under way may commit.
        let mut result = InvalidationResult {
            keys: Vec::new(),
            patterns: vec![format!("location:{id}:*")],
        };
        for key in &keys {
            if self.store.invalidate(key) && live.contains(key) {
                result.keys.push(key.to_string());
            }
        }

        let mut task_ids: Vec<TaskId> = keys
            .into_iter()
            .map(|key| self.scheduler.schedule(key, Priority::Critical))
            .collect();

        if kind == ChangeKind::Data {
            let lists = self.store.lists_containing(id);
            result.merge(self.store.invalidate_keys(&lists, "lists"));
            task_ids.extend(
                lists
                    .into_iter()
                    .map(|key| self.scheduler.schedule(key, Priority::Normal)),
            );
        }
        task_ids.sort();
        task_ids.dedup();

        for key in &result.keys {
            self.events.publish(SyncEvent::CacheInvalidated { key: key.clone() });
        }
        debug!(
            location_id = %id,
            expired = result.count(),
            tasks = task_ids.len(),
            "Invalidated location"
        );

        let report = InvalidationReport {
            location_id: id.clone(),
            kind,
            expired: result.keys,
            task_ids,
        };
        self.notify_when_refreshed(report.clone());
        report
    }

    /// Registers a listener called after the refreshes triggered by each
    /// invalidation are terminal.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&InvalidationReport) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.listeners.insert(id, Arc::new(listener));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }

    /// Forgets the applied timestamps.
    pub fn reset(&self) {
        self.applied.lock().clear();
    }

    fn admit(&self, id: &LocationId, kind: ChangeKind, timestamp: DateTime<Utc>) -> bool {
        let mut applied = self.applied.lock();
        let last = applied.entry((id.clone(), kind)).or_insert(DateTime::<Utc>::MIN_UTC);
        if timestamp <= *last {
            debug!(
                location_id = %id,
                kind = ?kind,
                %timestamp,
                last_applied = %last,
                "Dropping out-of-date notification"
            );
            return false;
        }
        *last = timestamp;
        true
    }

    fn notify_when_refreshed(&self, report: InvalidationReport) {
        if self.listener_count() == 0 {
            return;
        }

        let scheduler = self.scheduler.clone();
        let registry = Arc::downgrade(&self.registry);
        tokio::spawn(async move {
            for id in &report.task_ids {
                scheduler.wait(*id).await;
            }

            let Some(registry) = registry.upgrade() else {
                return;
            };
            let listeners: Vec<Listener> = registry.lock().listeners.values().cloned().collect();
            for listener in listeners {
                listener(&report);
            }
        });
    }
}

impl std::fmt::Debug for Invalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invalidator")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
