//! Exponential backoff schedule for transient delivery failures.

use std::time::Duration;

use duewatch_core::config::DispatchConfig;

/// Retry schedule for a delivery channel.
///
/// `max_attempts` counts the initial attempt: a policy with three
/// attempts sends at most three times, sleeping `delay_for(1)` after
/// the first failure and `delay_for(2)` after the second.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(cfg: &DispatchConfig) -> Self {
        Self::new(
            cfg.email_max_attempts,
            Duration::from_millis(cfg.email_retry_base_ms),
            Duration::from_millis(cfg.email_retry_max_ms),
        )
    }

    /// A single attempt with no backoff, for synchronous channels.
    pub fn single() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay to wait after the given failed attempt (1-based).
    ///
    /// Doubles the base delay for every failure past the first, capped
    /// at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_delay)
    }
}
