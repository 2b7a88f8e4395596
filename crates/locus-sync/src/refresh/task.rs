//! Refresh task model.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use locus_core::LocationError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::CacheKey;

/// Identifier of a refresh task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generates a new time-ordered id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// What a task refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RefreshTarget {
    /// A single cache entry.
    Key(CacheKey),
    /// Every key cached when the task was scheduled.
    All,
}

impl RefreshTarget {
    pub fn key(&self) -> Option<&CacheKey> {
        match self {
            Self::Key(key) => Some(key),
            Self::All => None,
        }
    }
}

impl From<CacheKey> for RefreshTarget {
    fn from(key: CacheKey) -> Self {
        Self::Key(key)
    }
}

impl fmt::Display for RefreshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => key.fmt(f),
            Self::All => f.write_str("*"),
        }
    }
}

/// Scheduling priority. Higher priorities are served first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Background,
    #[default]
    Normal,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Background => "background",
            Self::Normal => "normal",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "background" => Ok(Self::Background),
            "normal" => Ok(Self::Normal),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Active,
    Completed,
    Failed,
    Superseded,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Superseded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Superseded => "superseded",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshOutcome {
    /// The fetched value was written.
    Completed,
    /// A newer write was committed first; the fetched value was discarded.
    Superseded,
    Failed,
}

impl RefreshOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Superseded => "superseded",
            Self::Failed => "failed",
        }
    }
}

impl From<RefreshOutcome> for TaskState {
    fn from(outcome: RefreshOutcome) -> Self {
        match outcome {
            RefreshOutcome::Completed => Self::Completed,
            RefreshOutcome::Superseded => Self::Superseded,
            RefreshOutcome::Failed => Self::Failed,
        }
    }
}

/// Snapshot of a refresh task.
#[derive(Debug, Clone)]
pub struct RefreshTask {
    pub id: TaskId,
    pub target: RefreshTarget,
    pub priority: Priority,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Data source attempts made so far.
    pub attempts: u32,
    /// Error of the last failed attempt.
    pub last_error: Option<LocationError>,
    /// The task failed while a last known value was available.
    pub fallback_used: bool,
    /// Tasks spawned by a refresh of everything.
    pub children: Vec<TaskId>,
    pub duration: Option<Duration>,
}

impl RefreshTask {
    pub(crate) fn new(target: RefreshTarget, priority: Priority) -> Self {
        Self {
            id: TaskId::new(),
            target,
            priority,
            state: TaskState::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            attempts: 0,
            last_error: None,
            fallback_used: false,
            children: Vec::new(),
            duration: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// The outcome, once the task is terminal.
    pub fn outcome(&self) -> Option<RefreshOutcome> {
        match self.state {
            TaskState::Completed => Some(RefreshOutcome::Completed),
            TaskState::Superseded => Some(RefreshOutcome::Superseded),
            TaskState::Failed => Some(RefreshOutcome::Failed),
            TaskState::Pending | TaskState::Active => None,
        }
    }
}
