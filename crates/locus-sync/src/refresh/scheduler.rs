//! Prioritized, deduplicated refresh of cache entries.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use locus_core::{LocationError, LocationId, LocationRecord, LocationValidator};
use locus_source::LocationSource;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, watch};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use super::queue::TaskQueue;
use super::task::{Priority, RefreshOutcome, RefreshTarget, RefreshTask, TaskId, TaskState};
use crate::cache::{CacheKey, CacheStore, CachedValue, CommitOutcome, WriteTicket};
use crate::config::SyncConfig;
use crate::events::{EventBus, SyncEvent};
use crate::metrics::{record_refresh, set_active_refreshes};
use crate::recovery::{RecoveryAction, RecoveryContext, RecoveryHandler};

/// Configuration for the refresh scheduler.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Maximum number of tasks calling the data source at once.
    pub max_concurrent: usize,
    /// Maximum duration of a single data source call.
    pub task_timeout: Duration,
    /// How long terminal tasks stay queryable.
    pub task_retention: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SchedulerConfig {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent_refreshes,
            task_timeout: config.task_timeout,
            task_retention: config.task_retention,
        }
    }
}

/// Refresh statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshStats {
    pub active: usize,
    pub queued: usize,
    /// Tasks created since start (coalesced requests are not counted).
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub superseded: u64,
    /// Mean duration of finished single-key tasks.
    pub average_duration_ms: f64,
}

struct TaskRecord {
    task: RefreshTask,
    /// Ticket of the current attempt.
    ticket: Option<WriteTicket>,
    done: watch::Sender<TaskState>,
    finished: Option<Instant>,
}

impl TaskRecord {
    fn new(task: RefreshTask) -> Self {
        let (done, _) = watch::channel(task.state);
        Self {
            task,
            ticket: None,
            done,
            finished: None,
        }
    }

    fn terminate(&mut self, execution: Execution, elapsed: Duration) {
        self.task.state = execution.outcome.into();
        self.task.finished_at = Some(Utc::now());
        self.task.duration = Some(elapsed);
        self.task.fallback_used = execution.fallback_used;
        if execution.error.is_some() {
            self.task.last_error = execution.error;
        }
        self.finished = Some(Instant::now());
        self.done.send_replace(self.task.state);
    }
}

#[derive(Default)]
struct SchedulerState {
    tasks: HashMap<TaskId, TaskRecord>,
    /// Non-terminal task currently serving each target.
    live: HashMap<RefreshTarget, TaskId>,
    queue: TaskQueue,
}

#[derive(Default)]
struct RefreshCounters {
    total: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    superseded: AtomicU64,
    timed: AtomicU64,
    duration_ms: AtomicU64,
}

struct Execution {
    outcome: RefreshOutcome,
    error: Option<LocationError>,
    fallback_used: bool,
}

impl Execution {
    fn failed(error: LocationError, fallback_used: bool) -> Self {
        Self {
            outcome: RefreshOutcome::Failed,
            error: Some(error),
            fallback_used,
        }
    }
}

struct Inner {
    source: Arc<dyn LocationSource>,
    store: Arc<CacheStore>,
    recovery: Arc<RecoveryHandler>,
    validator: LocationValidator,
    events: EventBus,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    permits: Arc<Semaphore>,
    counters: RefreshCounters,
}

/// Runs refresh tasks against the data source and writes their results.
///
/// - Pending tasks are served critical first, then normal, then background,
///   FIFO within a priority.
/// - A request for a target that already has a live task returns that
///   task's id. A higher priority upgrades a pending task.
/// - At most `max_concurrent` tasks call the data source at once.
/// - Results are committed with the ticket taken before the fetch, so a
///   task that finishes after a newer write ends `superseded`.
///
/// Cloning the scheduler yields another handle to the same queue.
#[derive(Clone)]
pub struct RefreshScheduler {
    inner: Arc<Inner>,
}

impl RefreshScheduler {
    pub fn new(
        source: Arc<dyn LocationSource>,
        store: Arc<CacheStore>,
        recovery: Arc<RecoveryHandler>,
        events: EventBus,
        config: SchedulerConfig,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self {
            inner: Arc::new(Inner {
                source,
                store,
                recovery,
                validator: LocationValidator::new(),
                events,
                config,
                state: Mutex::new(SchedulerState::default()),
                permits,
                counters: RefreshCounters::default(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Schedules a refresh and returns the id of the task serving it.
    pub fn schedule(&self, target: impl Into<RefreshTarget>, priority: Priority) -> TaskId {
        let target = target.into();
        if target == RefreshTarget::All {
            return self.refresh_all(priority);
        }

        let id = self.enqueue(target, priority, false);
        self.pump();
        id
    }

    /// Starts a critical refresh of the key, ignoring any live task for it.
    ///
    /// The detached task keeps running; whichever result is newer wins.
    pub fn force_refresh(&self, key: CacheKey) -> TaskId {
        let id = self.enqueue(RefreshTarget::Key(key), Priority::Critical, true);
        self.pump();
        id
    }

    /// Refreshes every cached key under a parent task.
    ///
    /// The parent is active until all of its children are terminal, and
    /// fails if any child failed.
    pub fn refresh_all(&self, priority: Priority) -> TaskId {
        let started = Instant::now();
        let parent = {
            let mut state = self.inner.state.lock();
            if let Some(id) = state.live.get(&RefreshTarget::All).copied() {
                return id;
            }

            let mut task = RefreshTask::new(RefreshTarget::All, priority);
            task.state = TaskState::Active;
            task.started_at = Some(Utc::now());
            let id = task.id;
            state.tasks.insert(id, TaskRecord::new(task));
            state.live.insert(RefreshTarget::All, id);
            id
        };
        self.inner.counters.total.fetch_add(1, Ordering::Relaxed);

        let children: Vec<TaskId> = self
            .inner
            .store
            .keys()
            .into_iter()
            .map(|key| self.enqueue(RefreshTarget::Key(key), priority, false))
            .collect();

        let cancelled = {
            let mut state = self.inner.state.lock();
            match state.tasks.get_mut(&parent) {
                Some(record) => {
                    record.task.children = children.clone();
                    record.done.subscribe()
                },
                None => return parent,
            }
        };

        info!(
            task_id = %parent,
            children = children.len(),
            priority = %priority,
            "Refreshing all cached entries"
        );

        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut cancelled = cancelled;
            let joined = tokio::select! {
                error = scheduler.join_children(&children) => Some(error),
                _ = cancelled.wait_for(TaskState::is_terminal) => None,
            };
            if let Some(error) = joined {
                let execution = match error {
                    Some(error) => Execution::failed(error, false),
                    None => Execution {
                        outcome: RefreshOutcome::Completed,
                        error: None,
                        fallback_used: false,
                    },
                };
                scheduler.finish(parent, execution, started.elapsed());
            }
        });

        self.pump();
        parent
    }

    /// Waits for the children, returning the first error among them.
    async fn join_children(&self, children: &[TaskId]) -> Option<LocationError> {
        let mut first_error = None;
        for child in children {
            if let Some(task) = self.wait(*child).await {
                if task.state == TaskState::Failed && first_error.is_none() {
                    first_error = Some(
                        task.last_error
                            .unwrap_or_else(|| LocationError::unknown("refresh failed")),
                    );
                }
            }
        }
        first_error
    }

    /// Returns a snapshot of the task.
    pub fn status(&self, id: TaskId) -> Option<RefreshTask> {
        self.inner
            .state
            .lock()
            .tasks
            .get(&id)
            .map(|record| record.task.clone())
    }

    /// Keys of the location with a pending or active refresh.
    pub fn in_flight_keys(&self, id: &LocationId) -> Vec<CacheKey> {
        self.inner
            .state
            .lock()
            .live
            .keys()
            .filter_map(RefreshTarget::key)
            .filter(|key| key.location_id() == Some(id))
            .cloned()
            .collect()
    }

    /// Waits until the task is terminal and returns its final snapshot.
    ///
    /// Returns `None` for unknown ids and for tasks already collected.
    pub async fn wait(&self, id: TaskId) -> Option<RefreshTask> {
        let mut rx = self.watch(id)?;
        let _ = rx.wait_for(TaskState::is_terminal).await;
        self.status(id)
    }

    fn watch(&self, id: TaskId) -> Option<watch::Receiver<TaskState>> {
        let state = self.inner.state.lock();
        state.tasks.get(&id).map(|record| record.done.subscribe())
    }

    /// Fails every pending and active task and empties the queue.
    ///
    /// Active tasks stop at their next suspension point and release their
    /// slot. Returns the number of tasks cancelled.
    pub fn cancel_all(&self) -> usize {
        let mut state = self.inner.state.lock();
        let SchedulerState { tasks, live, queue } = &mut *state;

        let mut cancelled = 0;
        for record in tasks.values_mut().filter(|r| !r.task.is_terminal()) {
            let elapsed = record
                .task
                .started_at
                .and_then(|at| (Utc::now() - at).to_std().ok())
                .unwrap_or_default();
            record.terminate(
                Execution::failed(LocationError::unknown("refresh cancelled"), false),
                elapsed,
            );
            cancelled += 1;
        }
        live.clear();
        queue.clear();
        drop(state);

        if cancelled > 0 {
            self.inner
                .counters
                .failed
                .fetch_add(cancelled as u64, Ordering::Relaxed);
            info!(cancelled, "Cancelled refresh tasks");
        }
        cancelled
    }

    pub fn stats(&self) -> RefreshStats {
        let (active, queued) = {
            let state = self.inner.state.lock();
            state
                .tasks
                .values()
                .filter(|r| r.task.target != RefreshTarget::All)
                .fold((0, 0), |(active, queued), r| match r.task.state {
                    TaskState::Active => (active + 1, queued),
                    TaskState::Pending => (active, queued + 1),
                    _ => (active, queued),
                })
        };

        let counters = &self.inner.counters;
        let timed = counters.timed.load(Ordering::Relaxed);
        let average_duration_ms = if timed == 0 {
            0.0
        } else {
            counters.duration_ms.load(Ordering::Relaxed) as f64 / timed as f64
        };

        RefreshStats {
            active,
            queued,
            total: counters.total.load(Ordering::Relaxed),
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            superseded: counters.superseded.load(Ordering::Relaxed),
            average_duration_ms,
        }
    }

    /// Creates a task for the target, or returns the live one serving it.
    fn enqueue(&self, target: RefreshTarget, priority: Priority, detach: bool) -> TaskId {
        let mut state = self.inner.state.lock();
        if detach {
            state.live.remove(&target);
        } else if let Some(id) = self.coalesce(&mut state, &target, priority) {
            return id;
        }

        let task = RefreshTask::new(target.clone(), priority);
        let id = task.id;
        state.tasks.insert(id, TaskRecord::new(task));
        state.live.insert(target.clone(), id);
        state.queue.push(id, priority);
        drop(state);

        self.inner.counters.total.fetch_add(1, Ordering::Relaxed);
        debug!(task_id = %id, target = %target, priority = %priority, "Refresh scheduled");
        id
    }

    fn coalesce(
        &self,
        state: &mut SchedulerState,
        target: &RefreshTarget,
        priority: Priority,
    ) -> Option<TaskId> {
        let id = *state.live.get(target)?;
        let record = state.tasks.get_mut(&id)?;

        match record.task.state {
            TaskState::Pending => {
                if priority > record.task.priority {
                    record.task.priority = priority;
                    state.queue.push(id, priority);
                    debug!(task_id = %id, priority = %priority, "Upgraded pending refresh");
                }
            },
            TaskState::Active => {
                // An invalidation after the fetch started makes its result
                // useless to the new caller.
                if let (Some(key), Some(ticket)) = (target.key(), record.ticket) {
                    if self.inner.store.has_newer_write(key, ticket) {
                        return None;
                    }
                }
            },
            TaskState::Completed | TaskState::Failed | TaskState::Superseded => return None,
        }

        debug!(task_id = %id, target = %target, "Coalesced refresh request");
        Some(id)
    }

    /// Starts pending tasks while slots are free.
    fn pump(&self) {
        loop {
            let Ok(permit) = self.inner.permits.clone().try_acquire_owned() else {
                break;
            };
            let Some((id, key, cancelled)) = self.next_pending() else {
                break;
            };

            let scheduler = self.clone();
            tokio::spawn(async move { scheduler.run(id, key, permit, cancelled).await });
        }

        let available = self.inner.permits.available_permits();
        set_active_refreshes(self.inner.config.max_concurrent.max(1) - available);
    }

    fn next_pending(&self) -> Option<(TaskId, CacheKey, watch::Receiver<TaskState>)> {
        let mut state = self.inner.state.lock();
        let SchedulerState { tasks, queue, .. } = &mut *state;

        while let Some((id, priority)) = queue.pop() {
            let Some(record) = tasks.get_mut(&id) else {
                continue;
            };
            if record.task.state != TaskState::Pending || record.task.priority != priority {
                continue;
            }
            let Some(key) = record.task.target.key().cloned() else {
                continue;
            };

            record.task.state = TaskState::Active;
            record.task.started_at = Some(Utc::now());
            record.done.send_replace(TaskState::Active);
            return Some((id, key, record.done.subscribe()));
        }
        None
    }

    async fn run(
        self,
        id: TaskId,
        key: CacheKey,
        permit: OwnedSemaphorePermit,
        mut cancelled: watch::Receiver<TaskState>,
    ) {
        let started = Instant::now();
        let execution = tokio::select! {
            execution = self.execute(id, &key) => Some(execution),
            _ = cancelled.wait_for(TaskState::is_terminal) => None,
        };
        drop(permit);

        match execution {
            Some(execution) => self.finish(id, execution, started.elapsed()),
            None => debug!(task_id = %id, key = %key, "Refresh stopped"),
        }
        self.pump();
    }

    async fn execute(&self, id: TaskId, key: &CacheKey) -> Execution {
        let inner = &self.inner;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let ticket = inner.store.begin_write();
            self.begin_attempt(id, attempt, ticket);
            inner.recovery.record_operation();

            let fetched = match timeout(inner.config.task_timeout, self.fetch(key)).await {
                Ok(result) => result,
                Err(_) => Err(LocationError::timeout(inner.config.task_timeout)),
            };

            let error = match fetched.and_then(|value| self.check(&value).map(|()| value)) {
                Ok(value) => {
                    if attempt > 1 {
                        inner.recovery.record_recovery();
                    }
                    let outcome = match inner.store.commit(key, ticket, value) {
                        CommitOutcome::Applied => RefreshOutcome::Completed,
                        CommitOutcome::Superseded => RefreshOutcome::Superseded,
                    };
                    return Execution {
                        outcome,
                        error: None,
                        fallback_used: false,
                    };
                },
                Err(error) => error,
            };

            let ctx = RecoveryContext::new("refresh", key.to_string(), attempt)
                .with_fallback(inner.store.last_known(key).is_some());

            match inner.recovery.handle(&error, &ctx) {
                RecoveryAction::Retry(delay) => {
                    self.record_error(id, error);
                    sleep(delay).await;
                },
                RecoveryAction::FallbackToCache => return Execution::failed(error, true),
                RecoveryAction::Propagate => {
                    if matches!(error, LocationError::NotFound { .. }) {
                        inner.store.invalidate(key);
                    }
                    return Execution::failed(error, false);
                },
            }
        }
    }

    async fn fetch(&self, key: &CacheKey) -> Result<CachedValue, LocationError> {
        let source = &self.inner.source;
        match key {
            CacheKey::List(params) => source
                .fetch_location_list(params)
                .await
                .map(CachedValue::from),
            CacheKey::Detail { id, date } => source
                .fetch_location_detail(id, *date)
                .await
                .map(CachedValue::from),
            CacheKey::Status(id) => source
                .fetch_location_status(id)
                .await
                .map(CachedValue::from),
        }
    }

    /// Rejects fetched records missing a required field. Other errors are
    /// logged and the value is kept.
    fn check(&self, value: &CachedValue) -> Result<(), LocationError> {
        let records: Vec<&LocationRecord> = match value {
            CachedValue::List(page) => page.items.iter().collect(),
            CachedValue::Detail(detail) => vec![&detail.record],
            CachedValue::Status(_) => Vec::new(),
        };

        for record in records {
            let result = self.inner.validator.validate_record(record);
            if result.is_valid {
                continue;
            }
            let messages = result.messages();
            if let Some(error) = result.into_required_error() {
                return Err(error);
            }
            warn!(
                location_id = %record.id,
                issues = ?messages,
                "Fetched record has validation errors"
            );
        }
        Ok(())
    }

    fn begin_attempt(&self, id: TaskId, attempt: u32, ticket: WriteTicket) {
        if let Some(record) = self.inner.state.lock().tasks.get_mut(&id) {
            record.task.attempts = attempt;
            record.ticket = Some(ticket);
        }
    }

    fn record_error(&self, id: TaskId, error: LocationError) {
        if let Some(record) = self.inner.state.lock().tasks.get_mut(&id) {
            record.task.last_error = Some(error);
        }
    }

    fn finish(&self, id: TaskId, execution: Execution, elapsed: Duration) {
        let outcome = execution.outcome;
        let task = {
            let mut state = self.inner.state.lock();
            let Some(record) = state.tasks.get_mut(&id) else {
                return;
            };
            if record.task.is_terminal() {
                return;
            }
            record.terminate(execution, elapsed);
            let task = record.task.clone();

            if state.live.get(&task.target) == Some(&id) {
                state.live.remove(&task.target);
            }
            self.collect_garbage(&mut state);
            task
        };

        let counters = &self.inner.counters;
        match outcome {
            RefreshOutcome::Completed => &counters.succeeded,
            RefreshOutcome::Superseded => &counters.superseded,
            RefreshOutcome::Failed => &counters.failed,
        }
        .fetch_add(1, Ordering::Relaxed);

        if task.target != RefreshTarget::All {
            counters.timed.fetch_add(1, Ordering::Relaxed);
            counters
                .duration_ms
                .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
            record_refresh(outcome.as_str(), elapsed);
        }

        self.inner.events.publish(SyncEvent::RefreshCompleted {
            task_id: id,
            key: task.target.to_string(),
            outcome,
        });

        match (&task.last_error, outcome) {
            (Some(error), RefreshOutcome::Failed) => warn!(
                task_id = %id,
                target = %task.target,
                attempts = task.attempts,
                fallback = task.fallback_used,
                error = %error,
                "Refresh failed"
            ),
            _ => debug!(
                task_id = %id,
                target = %task.target,
                outcome = outcome.as_str(),
                duration_ms = elapsed.as_millis() as u64,
                "Refresh finished"
            ),
        }
    }

    /// Drops terminal tasks older than the retention window.
    fn collect_garbage(&self, state: &mut SchedulerState) {
        let retention = self.inner.config.task_retention;
        let now = Instant::now();
        state.tasks.retain(|_, record| {
            record
                .finished
                .is_none_or(|at| now.saturating_duration_since(at) <= retention)
        });
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("source", &self.inner.source.name())
            .field("config", &self.inner.config)
            .finish()
    }
}
