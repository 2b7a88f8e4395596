//! Error classification and recovery decisions.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use locus_core::{ErrorKind, LocationError};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, warn};

use super::backoff::backoff_delay;
use crate::config::RetryPolicy;
use crate::metrics::record_recovery_decision;

/// Maximum number of errors kept in the history.
pub const MAX_HISTORY: usize = 1000;

/// Window of recent errors inspected by pattern detection.
const PATTERN_WINDOW: usize = 20;
/// Occurrences of one kind inside the window that make a pattern.
const PATTERN_THRESHOLD: usize = 10;
/// Error rate (percent) above which the rate itself is a pattern.
const HIGH_ERROR_RATE: f64 = 25.0;

/// What to do about a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Try again after the delay.
    Retry(Duration),
    /// Give up and serve the last known value, tagged degraded.
    FallbackToCache,
    /// Give up and surface the error.
    Propagate,
}

impl RecoveryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Retry(_) => "retry",
            Self::FallbackToCache => "fallback",
            Self::Propagate => "propagate",
        }
    }
}

/// Where a failure happened.
#[derive(Debug, Clone)]
pub struct RecoveryContext {
    /// Operation name, for logs and history (e.g. `refresh`, `update`).
    pub operation: &'static str,
    /// Cache key or resource the operation was about.
    pub key: Option<String>,
    /// One-based number of the attempt that failed.
    pub attempt: u32,
    /// Whether a last known value exists to fall back to.
    pub has_fallback: bool,
}

impl RecoveryContext {
    pub fn new(operation: &'static str, key: impl Into<String>, attempt: u32) -> Self {
        Self {
            operation,
            key: Some(key.into()),
            attempt,
            has_fallback: false,
        }
    }

    pub fn with_fallback(mut self, has_fallback: bool) -> Self {
        self.has_fallback = has_fallback;
        self
    }
}

/// A failure kept in the history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub operation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub attempt: u32,
    pub fallback_used: bool,
}

/// Aggregated error statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    pub total_operations: u64,
    pub total_errors: u64,
    /// Failed attempts over all attempts, as a percentage.
    pub error_rate: f64,
    /// Operations that succeeded after a retry or fell back to cache.
    pub recoveries: u64,
    pub errors_by_kind: BTreeMap<&'static str, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error_at: Option<DateTime<Utc>>,
}

/// A repeated-failure pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorPattern {
    /// One kind dominates the recent errors.
    #[serde(rename_all = "camelCase")]
    Recurring {
        kind: ErrorKind,
        occurrences: usize,
        window: usize,
    },
    /// Too many attempts fail.
    #[serde(rename_all = "camelCase")]
    HighErrorRate { error_rate: f64 },
}

impl ErrorPattern {
    /// Human readable description, used in health reports.
    pub fn describe(&self) -> String {
        match self {
            Self::Recurring {
                kind,
                occurrences,
                window,
            } => format!("{kind} errors recurring: {occurrences} of the last {window}"),
            Self::HighErrorRate { error_rate } => {
                format!("error rate is {error_rate:.1}%")
            },
        }
    }
}

#[derive(Debug, Default)]
struct History {
    records: VecDeque<ErrorRecord>,
    by_kind: BTreeMap<&'static str, u64>,
    last_error_at: Option<DateTime<Utc>>,
}

/// Classifies failures and decides between retry, fallback and propagation.
///
/// | Kind | Decision |
/// |---|---|
/// | network | retry with backoff up to `max_attempts`, then fall back if possible |
/// | rate limited | like network, but the server delay hint wins over backoff |
/// | validation | propagate |
/// | not found | propagate |
/// | unknown | retry once, then propagate |
///
/// Every decision is recorded in a bounded history used for statistics and
/// pattern detection.
#[derive(Debug)]
pub struct RecoveryHandler {
    policy: RetryPolicy,
    history: Mutex<History>,
    operations: AtomicU64,
    errors: AtomicU64,
    recoveries: AtomicU64,
}

impl RecoveryHandler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            history: Mutex::new(History::default()),
            operations: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            recoveries: AtomicU64::new(0),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Classifies an error.
    pub fn classify(error: &LocationError) -> ErrorKind {
        error.kind()
    }

    /// Decides what to do about a failed attempt, and records it.
    pub fn handle(&self, error: &LocationError, ctx: &RecoveryContext) -> RecoveryAction {
        let kind = Self::classify(error);
        let action = self.decide(error, ctx);

        self.errors.fetch_add(1, Ordering::Relaxed);
        if action == RecoveryAction::FallbackToCache {
            self.recoveries.fetch_add(1, Ordering::Relaxed);
        }
        self.record(ErrorRecord {
            kind,
            message: error.to_string(),
            timestamp: Utc::now(),
            operation: ctx.operation,
            key: ctx.key.clone(),
            attempt: ctx.attempt,
            fallback_used: action == RecoveryAction::FallbackToCache,
        });
        record_recovery_decision(kind.as_str(), action.as_str());

        match action {
            RecoveryAction::Retry(delay) => debug!(
                operation = ctx.operation,
                key = ctx.key.as_deref().unwrap_or("-"),
                attempt = ctx.attempt,
                kind = %kind,
                delay_ms = delay.as_millis() as u64,
                "Retrying after failure"
            ),
            _ => warn!(
                operation = ctx.operation,
                key = ctx.key.as_deref().unwrap_or("-"),
                attempt = ctx.attempt,
                kind = %kind,
                action = action.as_str(),
                error = %error,
                "Giving up"
            ),
        }

        action
    }

    fn decide(&self, error: &LocationError, ctx: &RecoveryContext) -> RecoveryAction {
        let exhausted = ctx.attempt >= self.policy.max_attempts;
        let give_up = if ctx.has_fallback {
            RecoveryAction::FallbackToCache
        } else {
            RecoveryAction::Propagate
        };
        let retry = ctx.attempt.saturating_sub(1);

        match error.kind() {
            ErrorKind::Network if exhausted => give_up,
            ErrorKind::Network => RecoveryAction::Retry(backoff_delay(&self.policy, retry)),
            ErrorKind::RateLimited if exhausted => give_up,
            ErrorKind::RateLimited => RecoveryAction::Retry(
                error
                    .retry_after()
                    .unwrap_or_else(|| backoff_delay(&self.policy, retry)),
            ),
            ErrorKind::Validation | ErrorKind::NotFound => RecoveryAction::Propagate,
            ErrorKind::Unknown if ctx.attempt < 2 && !exhausted => {
                RecoveryAction::Retry(backoff_delay(&self.policy, retry))
            },
            ErrorKind::Unknown => RecoveryAction::Propagate,
        }
    }

    /// Counts one attempt of an operation.
    pub fn record_operation(&self) {
        self.operations.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts an operation that succeeded after at least one retry.
    pub fn record_recovery(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
    }

    fn record(&self, record: ErrorRecord) {
        let mut history = self.history.lock();
        *history.by_kind.entry(record.kind.as_str()).or_insert(0) += 1;
        history.last_error_at = Some(record.timestamp);
        if history.records.len() == MAX_HISTORY {
            history.records.pop_front();
        }
        history.records.push_back(record);
    }

    /// Failed attempts over all attempts, as a percentage.
    pub fn error_rate(&self) -> f64 {
        let operations = self.operations.load(Ordering::Relaxed);
        if operations == 0 {
            return 0.0;
        }
        let errors = self.errors.load(Ordering::Relaxed);
        (errors as f64 / operations as f64 * 100.0).min(100.0)
    }

    pub fn stats(&self) -> ErrorStats {
        let history = self.history.lock();
        let mut errors_by_kind: BTreeMap<&'static str, u64> =
            ErrorKind::ALL.iter().map(|k| (k.as_str(), 0)).collect();
        errors_by_kind.extend(history.by_kind.iter().map(|(k, v)| (*k, *v)));

        ErrorStats {
            total_operations: self.operations.load(Ordering::Relaxed),
            total_errors: self.errors.load(Ordering::Relaxed),
            error_rate: self.error_rate(),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            errors_by_kind,
            last_error_at: history.last_error_at,
        }
    }

    /// The most recent errors, newest last.
    pub fn recent(&self, limit: usize) -> Vec<ErrorRecord> {
        let history = self.history.lock();
        let skip = history.records.len().saturating_sub(limit);
        history.records.iter().skip(skip).cloned().collect()
    }

    /// Number of errors in the history.
    pub fn history_len(&self) -> usize {
        self.history.lock().records.len()
    }

    /// Detects repeated-failure patterns.
    pub fn detect_patterns(&self) -> Vec<ErrorPattern> {
        let mut patterns = Vec::new();

        let recent = self.recent(PATTERN_WINDOW);
        let mut counts: BTreeMap<&'static str, (ErrorKind, usize)> = BTreeMap::new();
        for record in &recent {
            counts.entry(record.kind.as_str()).or_insert((record.kind, 0)).1 += 1;
        }
        for (kind, occurrences) in counts.into_values() {
            if occurrences >= PATTERN_THRESHOLD {
                patterns.push(ErrorPattern::Recurring {
                    kind,
                    occurrences,
                    window: recent.len(),
                });
            }
        }

        let error_rate = self.error_rate();
        if error_rate > HIGH_ERROR_RATE {
            patterns.push(ErrorPattern::HighErrorRate { error_rate });
        }

        patterns
    }

    /// Forgets the error history and resets every counter.
    pub fn clear_history(&self) {
        let mut history = self.history.lock();
        *history = History::default();
        self.operations.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.recoveries.store(0, Ordering::Relaxed);
    }
}

impl Default for RecoveryHandler {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
