//! Retry policy: decides how many attempts an operation gets and how long to
//! back off between them.

use std::time::Duration;

use rand::Rng;

use crate::LockManagerConfig;

/// Exponential backoff with symmetric jitter.
///
/// `delay = min(base_delay * 2^(attempt - 1), max_delay)`, then scaled by a
/// uniform factor in `[1 - jitter, 1 + jitter]`. Attempts are 1-indexed.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Backoff after the first failed attempt
    pub base_delay: Duration,

    /// Cap applied before jitter
    pub max_delay: Duration,

    /// Relative jitter (0.2 = ±20%)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10000),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &LockManagerConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_backoff,
            max_delay: config.max_backoff,
            jitter: config.backoff_jitter,
        }
    }

    /// Whether another attempt is allowed after `attempt` failed
    pub fn has_attempts_left(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Un-jittered delay after failed attempt `attempt`
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt.saturating_sub(1))
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Jittered delay after failed attempt `attempt`
    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.next_delay_with(attempt, &mut rand::thread_rng())
    }

    pub fn next_delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let delay = self.base_backoff(attempt);
        if self.jitter <= 0.0 {
            return delay;
        }

        let factor = 1.0 + rng.gen_range(-self.jitter..=self.jitter);
        let millis = (delay.as_secs_f64() * 1000.0 * factor).round().max(0.0);
        Duration::from_millis(millis as u64)
    }

    /// Smallest and largest delay `next_delay` can return for any attempt
    pub fn delay_bounds(&self) -> (Duration, Duration) {
        (
            self.base_delay.mul_f64(1.0 - self.jitter),
            self.max_delay.mul_f64(1.0 + self.jitter),
        )
    }
}
