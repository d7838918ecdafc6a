use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;

/// Retry policy for transactions whose resolution keeps failing
///
/// Delay after the n-th failure is `min(base * 2^(n-1), max)` plus up to 10%
/// jitter. Once `max_attempts` failures are recorded the transaction is
/// parked as stuck.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next attempt, without jitter
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn next_attempt_at(&self, now: DateTime<Utc>, attempts: u32) -> DateTime<Utc> {
        let delay = self.delay_for(attempts);
        let jitter_ms = (delay.as_millis() / 10) as u64;
        let jitter = if jitter_ms > 0 {
            rand::rng().random_range(0..=jitter_ms)
        } else {
            0
        };
        let total = delay + Duration::from_millis(jitter);

        now + chrono::Duration::from_std(total).unwrap_or_else(|_| chrono::Duration::hours(1))
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }
}
