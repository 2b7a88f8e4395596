//! Refresh scheduling.
//!
//! - [`RefreshScheduler`]: prioritized, deduplicated, bounded refresh tasks
//! - [`Sweeper`]: periodic purge of expired entries and revalidation of
//!   stale ones

mod queue;
mod scheduler;
mod sweeper;
mod task;

pub use scheduler::{RefreshScheduler, RefreshStats, SchedulerConfig};
pub use sweeper::{SweepHandle, SweepReport, Sweeper};
pub use task::{Priority, RefreshOutcome, RefreshTarget, RefreshTask, TaskId, TaskState};
