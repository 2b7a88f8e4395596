//! In-process event bus for outbound notifications.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::refresh::{RefreshOutcome, TaskId};

const DEFAULT_CAPACITY: usize = 256;

/// Events published by the caching layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SyncEvent {
    /// A cache entry was expired by an invalidation.
    #[serde(rename_all = "camelCase")]
    CacheInvalidated { key: String },

    /// A refresh task reached a terminal state.
    #[serde(rename_all = "camelCase")]
    RefreshCompleted {
        task_id: TaskId,
        key: String,
        outcome: RefreshOutcome,
    },
}

/// Broadcast channel shared by the components of a manager.
///
/// Cloning the bus yields another handle to the same channel. Publishing
/// never blocks; subscribers that fall behind lose the oldest events.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a bus that buffers up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event, returning the number of subscribers reached.
    pub fn publish(&self, event: SyncEvent) -> usize {
        trace!(?event, "Publishing event");
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
