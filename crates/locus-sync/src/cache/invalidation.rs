//! Cache invalidation with pattern matching support.

use glob::Pattern;
use locus_core::LocationId;
use serde::Serialize;
use tracing::{debug, info};

use super::{CacheKey, CacheStore};

/// Result of an invalidation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationResult {
    /// Keys whose live entries were expired.
    pub keys: Vec<String>,
    /// Patterns applied.
    pub patterns: Vec<String>,
}

impl InvalidationResult {
    /// Number of entries expired.
    pub fn count(&self) -> usize {
        self.keys.len()
    }

    pub fn merge(&mut self, other: InvalidationResult) {
        self.keys.extend(other.keys);
        self.patterns.extend(other.patterns);
    }
}

impl CacheStore {
    /// Expires every entry of a location (status and all detail dates).
    ///
    /// Keys are selected by id equality, so an id never reaches the entries
    /// of another id it prefixes.
    pub fn invalidate_location(&self, id: &LocationId) -> InvalidationResult {
        let keys = self.keys_for_location(id);
        self.invalidate_keys(&keys, &format!("location:{id}:*"))
    }

    /// Expires entries whose key string matches a glob pattern.
    ///
    /// - `*`: matches any sequence of characters
    /// - `?`: matches one character
    ///
    /// ```
    /// # use locus_sync::cache::{CacheStore, StoreConfig};
    /// # let store = CacheStore::new(StoreConfig::default());
    /// // Every status entry
    /// let result = store.invalidate_by_pattern("location:*:status");
    ///
    /// // Every page of every search
    /// let result = store.invalidate_by_pattern("locations:*");
    /// ```
    pub fn invalidate_by_pattern(&self, pattern_str: &str) -> InvalidationResult {
        let pattern = match Pattern::new(pattern_str) {
            Ok(p) => p,
            Err(e) => {
                debug!(pattern = %pattern_str, error = %e, "Invalid glob pattern");
                return InvalidationResult {
                    keys: Vec::new(),
                    patterns: vec![pattern_str.to_string()],
                };
            },
        };

        let matching: Vec<CacheKey> = self
            .keys()
            .into_iter()
            .filter(|k| pattern.matches(&k.to_string()))
            .collect();

        let result = self.invalidate_keys(&matching, pattern_str);
        info!(
            pattern = %pattern_str,
            count = result.count(),
            "Cache entries invalidated by pattern"
        );
        result
    }

    /// Applies several patterns.
    pub fn invalidate_by_patterns(&self, patterns: &[&str]) -> InvalidationResult {
        let mut total = InvalidationResult::default();
        for pattern in patterns {
            total.merge(self.invalidate_by_pattern(pattern));
        }
        total
    }

    /// Expires the given keys.
    pub fn invalidate_keys(&self, keys: &[CacheKey], label: &str) -> InvalidationResult {
        let keys = keys
            .iter()
            .filter(|key| self.invalidate(key))
            .map(|key| key.to_string())
            .collect();

        InvalidationResult {
            keys,
            patterns: vec![label.to_string()],
        }
    }
}
