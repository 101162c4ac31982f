//! Reconnect policy.
//!
//! Pure arithmetic, no timers: the connection loop asks the policy whether
//! to retry and how long to wait, then does the (cancellable) sleeping
//! itself.

use std::time::Duration;

/// Exponential backoff bounded by an attempt count.
///
/// `next_delay(attempt) = base_delay * 2^(attempt - 1)` for attempts
/// numbered from 1. Attempt 0 is treated like attempt 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first reconnection attempt. Default: 5s.
    pub base_delay: Duration,

    /// Reconnection attempts allowed before giving up. Default: 10.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay to wait before reconnection attempt number `attempt`.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2_u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Whether another attempt is allowed after `attempt` attempts.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
