//! Location manager: the single entry point of the caching layer.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use locus_core::{
    ChangeNotification, LocationDetail, LocationError, LocationId, LocationPage, LocationRecord,
    LocationValidator, Result, SearchParams, Severity, StatusSnapshot, UpdateAck, UpdateRequest,
    ValidationIssue,
};
use locus_source::LocationSource;
use serde::Serialize;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::cache::{CacheKey, CacheLookup, CacheStats, CacheStore, CachedValue, StoreConfig};
use crate::config::{CacheStrategy, ConfigError, SyncConfig};
use crate::events::{EventBus, SyncEvent};
use crate::invalidator::{ChangeKind, InvalidationReport, Invalidator, Subscription};
use crate::recovery::{ErrorStats, RecoveryAction, RecoveryContext, RecoveryHandler};
use crate::refresh::{
    Priority, RefreshScheduler, RefreshStats, RefreshTask, SchedulerConfig, SweepHandle, Sweeper,
    TaskId, TaskState,
};

/// Page size of the listing warmed by the aggressive strategy.
pub const WARM_LIST_LIMIT: u32 = 50;

/// Times a read re-checks the cache after its refresh finished before
/// giving up.
const MAX_READ_ROUNDS: usize = 3;

/// A value returned by the manager.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Served<T> {
    pub value: T,
    /// The value is a last known copy served because a refresh failed.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl<T> Served<T> {
    fn current(value: T) -> Self {
        Self {
            value,
            degraded: false,
            warning: None,
        }
    }

    fn degraded(value: T, warning: String) -> Self {
        Self {
            value,
            degraded: true,
            warning: Some(warning),
        }
    }
}

/// Result of a persisted update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub ack: UpdateAck,
    pub invalidation: InvalidationReport,
    /// Non-blocking validation findings.
    pub warnings: Vec<ValidationIssue>,
}

/// Overall health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
}

/// Health snapshot with the findings behind the classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Percentage of data source attempts that failed.
    pub error_rate: f64,
    /// Percentage of reads served from the cache.
    pub cache_hit_rate: f64,
    pub average_refresh_ms: f64,
    pub active_refreshes: usize,
    pub queued_refreshes: usize,
    pub cache_entries: u64,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Statistics of every component.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerStatistics {
    pub strategy: CacheStrategy,
    pub cache: CacheStats,
    pub refresh: RefreshStats,
    pub errors: ErrorStats,
}

/// A cached record that fails validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFinding {
    pub key: String,
    pub location_id: LocationId,
    pub issues: Vec<ValidationIssue>,
}

/// Serves location data from the cache and keeps it fresh.
///
/// - Fresh entries are returned as is.
/// - Stale entries are returned immediately and refreshed in the
///   background.
/// - Misses wait for a critical refresh. If it fails and a last known value
///   exists, that value is returned tagged degraded.
///
/// # Example
///
/// ```ignore
/// let source = Arc::new(StaticSource::from_path("fixtures/locations.yml")?);
/// let manager = LocationManager::new(source, SyncConfig::default(), EventBus::default())?;
/// let _sweeper = manager.start();
///
/// let status = manager.get_location_status(&LocationId::new("loc-1")).await?;
/// ```
pub struct LocationManager {
    config: SyncConfig,
    source: Arc<dyn LocationSource>,
    store: Arc<CacheStore>,
    recovery: Arc<RecoveryHandler>,
    scheduler: RefreshScheduler,
    invalidator: Invalidator,
    validator: LocationValidator,
    events: EventBus,
}

impl LocationManager {
    /// Creates a manager with its own cache.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is inconsistent.
    pub fn new(
        source: Arc<dyn LocationSource>,
        config: SyncConfig,
        events: EventBus,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;

        let store = Arc::new(CacheStore::new(StoreConfig {
            ttl: config.ttl,
            max_entries: config.max_entries,
            fallback_ttl: config.fallback_ttl,
        }));
        let recovery = Arc::new(RecoveryHandler::new(config.retry_policy));
        let scheduler = RefreshScheduler::new(
            Arc::clone(&source),
            Arc::clone(&store),
            Arc::clone(&recovery),
            events.clone(),
            SchedulerConfig::from(&config),
        );
        let invalidator = Invalidator::new(Arc::clone(&store), scheduler.clone(), events.clone());

        info!(
            source = source.name(),
            strategy = ?config.cache_strategy,
            max_concurrent = config.max_concurrent_refreshes,
            "Location manager created"
        );

        Ok(Self {
            config,
            source,
            store,
            recovery,
            scheduler,
            invalidator,
            validator: LocationValidator::new(),
            events,
        })
    }

    /// Applies the cache strategy and starts the sweeper.
    ///
    /// The sweeper runs until the returned handle is dropped.
    pub fn start(&self) -> SweepHandle {
        match self.config.cache_strategy {
            CacheStrategy::Aggressive => {
                let key = CacheKey::List(SearchParams::with_limit(WARM_LIST_LIMIT));
                let task_id = self.scheduler.schedule(key, Priority::Normal);
                info!(task_id = %task_id, "Warming default listing");
            },
            CacheStrategy::Minimal => self.store.clear(),
            CacheStrategy::Normal => {},
        }

        Sweeper::new(Arc::clone(&self.store), self.scheduler.clone(), &self.config).start()
    }

    pub async fn get_locations(&self, params: SearchParams) -> Result<Served<Arc<LocationPage>>> {
        self.read(CacheKey::List(params), |v| v.as_list().cloned())
            .await
    }

    pub async fn get_location_detail(
        &self,
        id: &LocationId,
        date: NaiveDate,
    ) -> Result<Served<Arc<LocationDetail>>> {
        self.read(CacheKey::detail(id.clone(), date), |v| {
            v.as_detail().cloned()
        })
        .await
    }

    pub async fn get_location_status(&self, id: &LocationId) -> Result<Served<Arc<StatusSnapshot>>> {
        self.read(CacheKey::Status(id.clone()), |v| v.as_status().cloned())
            .await
    }

    async fn read<T>(&self, key: CacheKey, extract: fn(&CachedValue) -> Option<T>) -> Result<Served<T>> {
        match self.store.get(&key) {
            CacheLookup::Fresh(value) => {
                if let Some(value) = extract(&value) {
                    return Ok(Served::current(value));
                }
            },
            CacheLookup::Stale(value) => {
                self.scheduler.schedule(key.clone(), Priority::Background);
                if let Some(value) = extract(&value) {
                    return Ok(Served::current(value));
                }
            },
            CacheLookup::Miss => {},
        }

        for _ in 0..MAX_READ_ROUNDS {
            let task_id = self.scheduler.schedule(key.clone(), Priority::Critical);
            let task = self.scheduler.wait(task_id).await;

            match task {
                Some(task) if task.state == TaskState::Failed => {
                    let error = task
                        .last_error
                        .unwrap_or_else(|| LocationError::unknown("refresh failed"));
                    let fallback = task
                        .fallback_used
                        .then(|| self.store.last_known(&key).as_ref().and_then(extract))
                        .flatten();

                    return match fallback {
                        Some(value) => {
                            warn!(key = %key, error = %error, "Serving last known value");
                            Ok(Served::degraded(
                                value,
                                format!("serving cached data after refresh failure: {error}"),
                            ))
                        },
                        None => Err(error),
                    };
                },
                // A superseded task committed nothing; only a live entry is
                // current, otherwise join the refresh that replaced it.
                Some(_) => {
                    let current = self.store.peek(&key).and_then(|entry| extract(&entry.value));
                    if let Some(value) = current {
                        return Ok(Served::current(value));
                    }
                },
                None => {},
            }
        }

        Err(LocationError::unknown(format!("no value available for {key}")))
    }

    /// Validates, persists and then invalidates.
    ///
    /// Nothing reaches the data source when validation fails.
    pub async fn update_location(&self, request: UpdateRequest) -> Result<UpdateOutcome> {
        let id = request.location_id.clone();

        if let Some(patch_id) = &request.updates.id {
            if patch_id != &id {
                return Err(LocationError::validation(vec![ValidationIssue::new(
                    "id",
                    format!("update for {id} carries id {patch_id}"),
                    Severity::Error,
                )]));
            }
        }

        let mut warnings = Vec::new();
        if self.config.validate_updates {
            let result = self.validator.validate_patch(&request.updates);
            warnings = result.issues.iter().filter(|i| !i.is_error()).cloned().collect();
            if let Some(error) = result.into_error() {
                warn!(location_id = %id, error = %error, "Rejected update");
                return Err(error);
            }
        }

        let ack = self.persist(&request).await?;
        let invalidation = self.invalidator.invalidate_location(&id, ChangeKind::Data);

        info!(
            location_id = %id,
            updated_by = request.updated_by.as_deref().unwrap_or("-"),
            expired = invalidation.expired.len(),
            "Location updated"
        );

        Ok(UpdateOutcome {
            ack,
            invalidation,
            warnings,
        })
    }

    async fn persist(&self, request: &UpdateRequest) -> Result<UpdateAck> {
        let limit = self.config.task_timeout;
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.recovery.record_operation();

            let result = match timeout(limit, self.source.persist_location_update(request)).await {
                Ok(result) => result,
                Err(_) => Err(LocationError::timeout(limit)),
            };
            let error = match result {
                Ok(ack) => {
                    if attempt > 1 {
                        self.recovery.record_recovery();
                    }
                    return Ok(ack);
                },
                Err(error) => error,
            };

            let ctx = RecoveryContext::new("update", request.location_id.as_str(), attempt);
            match self.recovery.handle(&error, &ctx) {
                RecoveryAction::Retry(delay) => sleep(delay).await,
                RecoveryAction::FallbackToCache | RecoveryAction::Propagate => return Err(error),
            }
        }
    }

    /// Refreshes every cached entry under one parent task.
    pub fn refresh_all(&self, priority: Priority) -> TaskId {
        self.scheduler.refresh_all(priority)
    }

    /// Refreshes the status and every cached entry of the given locations.
    pub fn refresh_locations(&self, ids: &[LocationId], priority: Priority) -> Vec<TaskId> {
        let mut task_ids = Vec::new();
        for id in ids {
            let mut keys = self.store.keys_for_location(id);
            let status_key = CacheKey::Status(id.clone());
            if !keys.contains(&status_key) {
                keys.push(status_key);
            }
            task_ids.extend(
                keys.into_iter()
                    .map(|key| self.scheduler.schedule(key, priority)),
            );
        }
        task_ids
    }

    /// Starts a critical refresh of the key even if one is already running.
    pub fn force_refresh(&self, key: CacheKey) -> TaskId {
        self.scheduler.force_refresh(key)
    }

    /// Loads the status and today's availability of a location in the
    /// background.
    pub fn prefetch(&self, id: &LocationId) -> Vec<TaskId> {
        let today = Utc::now().date_naive();
        [
            CacheKey::Status(id.clone()),
            CacheKey::detail(id.clone(), today),
        ]
        .into_iter()
        .filter(|key| self.store.peek(key).is_none())
        .map(|key| self.scheduler.schedule(key, Priority::Background))
        .collect()
    }

    /// Applies a backend change notification.
    pub fn handle_notification(&self, notification: &ChangeNotification) -> Option<InvalidationReport> {
        self.invalidator.handle(notification)
    }

    /// Registers a listener called once the refreshes triggered by an
    /// invalidation are done.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&InvalidationReport) + Send + Sync + 'static,
    {
        self.invalidator.subscribe(listener)
    }

    pub fn task(&self, id: TaskId) -> Option<RefreshTask> {
        self.scheduler.status(id)
    }

    pub async fn wait_task(&self, id: TaskId) -> Option<RefreshTask> {
        self.scheduler.wait(id).await
    }

    /// Cancels every refresh and empties the cache and the statistics.
    pub fn reset(&self) {
        let cancelled = self.scheduler.cancel_all();
        self.store.clear();
        self.store.reset_stats();
        self.recovery.clear_history();
        self.invalidator.reset();
        self.events.publish(SyncEvent::CacheInvalidated {
            key: "*".to_string(),
        });
        info!(cancelled, "Location cache reset");
    }

    /// Classifies the health of the caching layer.
    ///
    /// | Finding | Status |
    /// |---|---|
    /// | error rate > 10% | critical |
    /// | error rate > 5% | warning |
    /// | hit rate < 50% (after at least one read) | warning |
    /// | average refresh > 5 s | reported, status unchanged |
    pub fn health(&self) -> HealthReport {
        let errors = self.recovery.stats();
        let cache = self.store.stats();
        let refresh = self.scheduler.stats();

        let mut status = HealthStatus::Healthy;
        let mut issues = Vec::new();
        let mut recommendations = Vec::new();

        if errors.error_rate > 10.0 {
            status = HealthStatus::Critical;
            issues.push(format!("high error rate: {:.1}%", errors.error_rate));
            recommendations.push("check data source connectivity".to_string());
        } else if errors.error_rate > 5.0 {
            status = HealthStatus::Warning;
            issues.push(format!("elevated error rate: {:.1}%", errors.error_rate));
            recommendations.push("monitor data source errors".to_string());
        }

        if cache.hits + cache.misses > 0 && cache.hit_rate < 50.0 {
            status = status.max(HealthStatus::Warning);
            issues.push(format!("low cache hit rate: {:.1}%", cache.hit_rate));
            recommendations
                .push("consider the aggressive cache strategy or longer TTLs".to_string());
        }

        if refresh.average_duration_ms > 5000.0 {
            issues.push(format!(
                "slow refreshes: {:.0}ms on average",
                refresh.average_duration_ms
            ));
            recommendations.push("check data source latency".to_string());
        }

        issues.extend(self.recovery.detect_patterns().iter().map(|p| p.describe()));

        HealthReport {
            status,
            error_rate: errors.error_rate,
            cache_hit_rate: cache.hit_rate,
            average_refresh_ms: refresh.average_duration_ms,
            active_refreshes: refresh.active,
            queued_refreshes: refresh.queued,
            cache_entries: cache.entries,
            issues,
            recommendations,
        }
    }

    pub fn statistics(&self) -> ManagerStatistics {
        ManagerStatistics {
            strategy: self.config.cache_strategy,
            cache: self.store.stats(),
            refresh: self.scheduler.stats(),
            errors: self.recovery.stats(),
        }
    }

    /// Validates every cached record and lists those with findings.
    pub fn validate_cached(&self) -> Vec<AuditFinding> {
        let mut findings = Vec::new();
        for (key, entry) in self.store.entries() {
            let records: Vec<&LocationRecord> = match &entry.value {
                CachedValue::List(page) => page.items.iter().collect(),
                CachedValue::Detail(detail) => vec![&detail.record],
                CachedValue::Status(_) => Vec::new(),
            };
            for record in records {
                let result = self.validator.validate_record(record);
                if !result.issues.is_empty() {
                    findings.push(AuditFinding {
                        key: key.to_string(),
                        location_id: record.id.clone(),
                        issues: result.issues,
                    });
                }
            }
        }
        findings
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn LocationSource> {
        &self.source
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    pub fn recovery(&self) -> &Arc<RecoveryHandler> {
        &self.recovery
    }

    pub fn invalidator(&self) -> &Invalidator {
        &self.invalidator
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }
}

impl std::fmt::Debug for LocationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationManager")
            .field("source", &self.source.name())
            .field("strategy", &self.config.cache_strategy)
            .field("store", &self.store)
            .finish()
    }
}
