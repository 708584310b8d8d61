//! Exponential backoff policy.
//!
//! The policy is a plain value: it computes delays and decides whether
//! another attempt is allowed. Sleeping and re-invoking the operation is the
//! job of the executor in the runtime crate.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Growth factor applied per retry; must be > 1.0.
    pub multiplier: f64,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Total attempts including the first one; `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `failed_attempts` consecutive failures (>= 1).
    ///
    /// 1 → base, 2 → base × multiplier, … capped at `max_delay`.
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(64) as i32;
        let scaled = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled)
    }

    /// Whether another attempt may follow `failed_attempts` failures.
    pub fn allows_retry(&self, failed_attempts: u32) -> bool {
        match self.max_attempts {
            Some(max) => failed_attempts < max,
            None => true,
        }
    }
}
