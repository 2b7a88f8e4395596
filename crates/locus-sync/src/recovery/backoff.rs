//! Exponential backoff.

use std::cmp::min;
use std::time::Duration;

use crate::config::RetryPolicy;

const EXPONENTIAL_FACTOR: f64 = 2.0;

/// Delay before retry number `retry` (zero based): `base * 2^retry`, capped
/// at `max_delay`.
///
/// ```
/// use std::time::Duration;
/// use locus_sync::config::RetryPolicy;
/// use locus_sync::recovery::backoff_delay;
///
/// let policy = RetryPolicy {
///     max_attempts: 5,
///     base_delay: Duration::from_millis(100),
///     max_delay: Duration::from_millis(350),
/// };
/// assert_eq!(backoff_delay(&policy, 0), Duration::from_millis(100));
/// assert_eq!(backoff_delay(&policy, 1), Duration::from_millis(200));
/// assert_eq!(backoff_delay(&policy, 2), Duration::from_millis(350));
/// ```
pub fn backoff_delay(policy: &RetryPolicy, retry: u32) -> Duration {
    clamp_to_max(duration_mul_pow2(policy.base_delay, retry), policy.max_delay)
}

fn clamp_to_max(d: Duration, max: Duration) -> Duration {
    min(d, max)
}

fn duration_mul_pow2(base: Duration, retry: u32) -> Duration {
    let factor = EXPONENTIAL_FACTOR.powi(i32::try_from(retry).unwrap_or(i32::MAX));
    secs_to_duration_saturating(base.as_secs_f64() * factor)
}

fn secs_to_duration_saturating(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_ms: u64, max_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
        }
    }

    #[test]
    fn test_doubles_until_cap() {
        let policy = policy(1000, 30_000);
        let delays: Vec<u64> = (0..7)
            .map(|r| backoff_delay(&policy, r).as_millis() as u64)
            .collect();

        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16_000, 30_000, 30_000]);
    }

    #[test]
    fn test_huge_retry_saturates_at_cap() {
        let policy = policy(1000, 30_000);
        assert_eq!(backoff_delay(&policy, u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_zero_base() {
        let policy = policy(0, 30_000);
        assert_eq!(backoff_delay(&policy, 3), Duration::ZERO);
    }
}
