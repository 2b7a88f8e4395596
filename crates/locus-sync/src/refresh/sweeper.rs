//! Periodic sweep of the cache.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use super::scheduler::RefreshScheduler;
use super::task::Priority;
use crate::cache::CacheStore;
use crate::config::{CacheStrategy, SyncConfig};

/// What a sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    /// Hard-expired entries removed.
    pub purged: usize,
    /// Background refreshes requested for stale entries.
    pub scheduled: usize,
    /// Stale entries dropped instead of refreshed.
    pub dropped: usize,
}

/// Handle for controlling a running sweeper.
///
/// Dropping the handle stops the sweeper.
#[derive(Debug)]
pub struct SweepHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl SweepHandle {
    /// Signals the sweeper to stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Drop for SweepHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Purges expired entries and revalidates stale ones on a fixed period.
///
/// At most `max_concurrent_refreshes` stale keys are scheduled per sweep, at
/// background priority. Under the minimal strategy stale entries are dropped
/// instead.
pub struct Sweeper {
    store: Arc<CacheStore>,
    scheduler: RefreshScheduler,
    strategy: CacheStrategy,
    interval: Duration,
    batch: usize,
}

impl Sweeper {
    pub fn new(store: Arc<CacheStore>, scheduler: RefreshScheduler, config: &SyncConfig) -> Self {
        Self {
            store,
            scheduler,
            strategy: config.cache_strategy,
            interval: config.sweep_interval,
            batch: config.max_concurrent_refreshes.max(1),
        }
    }

    /// Runs one sweep.
    pub fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport {
            purged: self.store.purge_expired(),
            ..SweepReport::default()
        };

        let stale = self.store.stale_keys();
        if self.strategy == CacheStrategy::Minimal {
            report.dropped = self.store.invalidate_keys(&stale, "stale").count();
        } else {
            for key in stale.into_iter().take(self.batch) {
                self.scheduler.schedule(key, Priority::Background);
                report.scheduled += 1;
            }
        }

        if report != SweepReport::default() {
            debug!(
                purged = report.purged,
                scheduled = report.scheduled,
                dropped = report.dropped,
                "Cache sweep"
            );
        }
        report
    }

    /// Starts the background sweep.
    ///
    /// Returns a handle that can be used to stop the sweeper.
    pub fn start(self) -> SweepHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = SweepHandle { shutdown_tx };

        tokio::spawn(self.run(shutdown_rx));

        handle
    }

    async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = self.interval.as_millis() as u64,
            strategy = ?self.strategy,
            "Starting cache sweeper"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once();
                }
                result = shutdown_rx.changed() => {
                    if result.is_err() || *shutdown_rx.borrow() {
                        info!("Cache sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("strategy", &self.strategy)
            .field("interval", &self.interval)
            .field("batch", &self.batch)
            .finish()
    }
}
