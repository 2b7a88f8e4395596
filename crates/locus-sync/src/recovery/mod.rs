//! Retry and fallback decisions for failed data source calls.

mod backoff;
mod handler;

pub use backoff::backoff_delay;
pub use handler::{
    ErrorPattern, ErrorRecord, ErrorStats, MAX_HISTORY, RecoveryAction, RecoveryContext,
    RecoveryHandler,
};
