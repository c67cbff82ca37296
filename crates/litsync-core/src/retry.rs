//! Exponential backoff between retry attempts

use std::time::Duration;

/// Delay before the next attempt after `attempt` failed.
///
/// Attempts are counted from zero and the delay doubles each time:
/// `base`, `2 * base`, `4 * base`, ... Saturates instead of overflowing.
pub fn backoff_duration(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}
