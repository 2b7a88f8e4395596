//! Configuration for the caching and refresh layer.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::DataClass;

/// Errors found while validating a [`SyncConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A stale TTL is not shorter than its hard TTL.
    #[error("{class} ttl: staleTtl ({stale:?}) must be shorter than hardTtl ({hard:?})")]
    TtlOrder {
        class: &'static str,
        stale: Duration,
        hard: Duration,
    },

    /// A value that must be positive is zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    /// The retry delays are inconsistent.
    #[error("retryPolicy: baseDelay ({base:?}) must not exceed maxDelay ({max:?})")]
    RetryDelays { base: Duration, max: Duration },
}

/// Soft and hard expiry for one class of data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtlPair {
    /// Age after which an entry is served stale and refreshed in the background.
    #[serde(with = "humantime_serde")]
    pub stale_ttl: Duration,
    /// Age after which an entry is purged.
    #[serde(with = "humantime_serde")]
    pub hard_ttl: Duration,
}

impl TtlPair {
    pub const fn new(stale_ttl: Duration, hard_ttl: Duration) -> Self {
        Self {
            stale_ttl,
            hard_ttl,
        }
    }
}

/// TTLs per data class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtlConfig {
    #[serde(default = "default_list_ttl")]
    pub list: TtlPair,
    #[serde(default = "default_detail_ttl")]
    pub detail: TtlPair,
    #[serde(default = "default_status_ttl")]
    pub status: TtlPair,
}

impl TtlConfig {
    /// Returns the TTLs for a data class.
    pub fn for_class(&self, class: DataClass) -> TtlPair {
        match class {
            DataClass::List => self.list,
            DataClass::Detail => self.detail,
            DataClass::Status => self.status,
        }
    }

    /// Uses the same TTLs for every class.
    pub fn uniform(ttl: TtlPair) -> Self {
        Self {
            list: ttl,
            detail: ttl,
            status: ttl,
        }
    }
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            list: default_list_ttl(),
            detail: default_detail_ttl(),
            status: default_status_ttl(),
        }
    }
}

fn default_list_ttl() -> TtlPair {
    TtlPair::new(Duration::from_secs(5 * 60), Duration::from_secs(15 * 60))
}

fn default_detail_ttl() -> TtlPair {
    TtlPair::new(Duration::from_secs(2 * 60), Duration::from_secs(10 * 60))
}

fn default_status_ttl() -> TtlPair {
    TtlPair::new(Duration::from_secs(30), Duration::from_secs(2 * 60))
}

/// How eagerly the cache is populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    /// Warm the default listing at start.
    Aggressive,
    #[default]
    Normal,
    /// Start empty and drop stale entries instead of refreshing them.
    Minimal,
}

/// Retry policy for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every retry.
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,
    /// Upper bound for a computed delay.
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

/// Configuration for the caching and refresh layer.
///
/// Every field has a default, so an empty document is a valid
/// configuration:
///
/// ```
/// use locus_sync::SyncConfig;
///
/// let config: SyncConfig = serde_json::from_str(r#"{ "maxConcurrentRefreshes": 5 }"#).unwrap();
/// assert_eq!(config.max_concurrent_refreshes, 5);
/// assert_eq!(config.max_entries, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default)]
    pub ttl: TtlConfig,

    #[serde(default)]
    pub cache_strategy: CacheStrategy,

    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_refreshes: usize,

    #[serde(default)]
    pub retry_policy: RetryPolicy,

    /// Maximum duration of a single data source call.
    #[serde(default = "default_task_timeout", with = "humantime_serde")]
    pub task_timeout: Duration,

    /// Period of the background sweep.
    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub sweep_interval: Duration,

    /// How long finished refresh tasks stay queryable.
    #[serde(default = "default_task_retention", with = "humantime_serde")]
    pub task_retention: Duration,

    #[serde(default = "default_max_entries")]
    pub max_entries: u64,

    /// How long a last-known-good value is kept after its entry is purged.
    #[serde(default = "default_fallback_ttl", with = "humantime_serde")]
    pub fallback_ttl: Duration,

    /// Run the validator on updates before persisting them.
    #[serde(default = "default_true")]
    pub validate_updates: bool,
}

fn default_max_concurrent() -> usize {
    3
}

fn default_task_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_task_retention() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_max_entries() -> u64 {
    1000
}

fn default_fallback_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_true() -> bool {
    true
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            ttl: TtlConfig::default(),
            cache_strategy: CacheStrategy::default(),
            max_concurrent_refreshes: default_max_concurrent(),
            retry_policy: RetryPolicy::default(),
            task_timeout: default_task_timeout(),
            sweep_interval: default_sweep_interval(),
            task_retention: default_task_retention(),
            max_entries: default_max_entries(),
            fallback_ttl: default_fallback_ttl(),
            validate_updates: default_true(),
        }
    }
}

impl SyncConfig {
    /// Checks the configuration for inconsistent values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for class in DataClass::ALL {
            let ttl = self.ttl.for_class(class);
            if ttl.stale_ttl.is_zero() {
                return Err(ConfigError::Zero("staleTtl"));
            }
            if ttl.stale_ttl >= ttl.hard_ttl {
                return Err(ConfigError::TtlOrder {
                    class: class.as_str(),
                    stale: ttl.stale_ttl,
                    hard: ttl.hard_ttl,
                });
            }
        }

        if self.max_concurrent_refreshes == 0 {
            return Err(ConfigError::Zero("maxConcurrentRefreshes"));
        }
        if self.retry_policy.max_attempts == 0 {
            return Err(ConfigError::Zero("retryPolicy.maxAttempts"));
        }
        if self.retry_policy.base_delay > self.retry_policy.max_delay {
            return Err(ConfigError::RetryDelays {
                base: self.retry_policy.base_delay,
                max: self.retry_policy.max_delay,
            });
        }
        if self.task_timeout.is_zero() {
            return Err(ConfigError::Zero("taskTimeout"));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Zero("sweepInterval"));
        }
        if self.max_entries == 0 {
            return Err(ConfigError::Zero("maxEntries"));
        }
        Ok(())
    }
}

/// Durations as human readable strings (`"250ms"`, `"30s"`, `"15m"`, `"2h"`).
/// Bare integers are read as milliseconds.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer, de};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(*duration))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
            Raw::Text(text) => parse(&text).map_err(de::Error::custom),
        }
    }

    pub(super) fn format(duration: Duration) -> String {
        let ms = duration.as_millis();
        match ms {
            0 => "0ms".to_string(),
            _ if ms % 3_600_000 == 0 => format!("{}h", ms / 3_600_000),
            _ if ms % 60_000 == 0 => format!("{}m", ms / 60_000),
            _ if ms % 1_000 == 0 => format!("{}s", ms / 1_000),
            _ => format!("{ms}ms"),
        }
    }

    pub(super) fn parse(text: &str) -> Result<Duration, String> {
        let text = text.trim();
        let split = text
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(text.len());
        let (digits, unit) = text.split_at(split);
        let value: u64 = digits
            .parse()
            .map_err(|_| format!("invalid duration '{text}'"))?;

        let millis = match unit.trim() {
            "" | "ms" => Some(value),
            "s" => value.checked_mul(1_000),
            "m" | "min" => value.checked_mul(60_000),
            "h" => value.checked_mul(3_600_000),
            other => return Err(format!("unknown duration unit '{other}' in '{text}'")),
        };
        millis
            .map(Duration::from_millis)
            .ok_or_else(|| format!("duration '{text}' is too large"))
    }
}
