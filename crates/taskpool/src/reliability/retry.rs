//! Submission retry policy

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::duration_millis;

/// Backoff schedule for re-submitting work to a saturated pool
///
/// Attempts are 1-based: attempt 1 is the initial submission and has no
/// delay; attempt `n` waits `initial_interval * backoff_coefficient^(n - 2)`,
/// capped at `max_interval` and spread by `jitter`.
///
/// # Example
///
/// ```
/// use taskpool::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::exponential()
///     .with_max_attempts(4)
///     .with_initial_interval(Duration::from_millis(50))
///     .with_jitter(0.0);
///
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(50));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(100));
/// assert!(!policy.has_attempts_remaining(4));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(with = "duration_millis")]
    pub initial_interval: Duration,

    /// Upper bound on any single delay
    #[serde(with = "duration_millis")]
    pub max_interval: Duration,

    /// Growth factor between consecutive delays
    pub backoff_coefficient: f64,

    /// Relative spread (0.0-1.0); 0.1 means +/-10%
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

impl RetryPolicy {
    /// Exponential backoff: 3 attempts, 100ms doubling up to 5s, 10% jitter
    pub fn exponential() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(5),
            backoff_coefficient: 2.0,
            jitter: 0.1,
        }
    }

    /// A single attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    /// Constant delay between attempts
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval: interval,
            max_interval: interval,
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    pub fn with_backoff_coefficient(mut self, coefficient: f64) -> Self {
        self.backoff_coefficient = coefficient;
        self
    }

    /// Set the jitter factor, clamped to 0.0-1.0
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay to sleep before `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let exponent = (attempt - 2) as i32;
        let base = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        // Negative or NaN coefficients still yield a valid duration
        let capped = base.min(self.max_interval.as_secs_f64()).max(0.0);

        let spread = capped * self.jitter;
        let delay = if spread > 0.0 {
            (capped + rand::thread_rng().gen_range(-spread..spread)).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(delay)
    }

    /// Check if another attempt may follow `current_attempt`
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_defaults() {
        let policy = RetryPolicy::exponential();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_interval, Duration::from_millis(100));
        assert_eq!(policy.backoff_coefficient, 2.0);
        assert_eq!(policy, RetryPolicy::default());
    }

    #[test]
    fn test_no_retry() {
        let policy = RetryPolicy::no_retry();
        assert!(!policy.has_attempts_remaining(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::ZERO);
    }

    #[test]
    fn test_fixed_interval() {
        let policy = RetryPolicy::fixed(Duration::from_millis(250), 4);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(250));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(250));
        assert!(policy.has_attempts_remaining(3));
        assert!(!policy.has_attempts_remaining(4));
    }

    #[test]
    fn test_delay_doubles_then_caps() {
        let policy = RetryPolicy::exponential()
            .with_max_interval(Duration::from_millis(300))
            .with_jitter(0.0);

        assert_eq!(policy.delay_for_attempt(1), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(300));
        assert_eq!(policy.delay_for_attempt(20), Duration::from_millis(300));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::fixed(Duration::from_secs(1), 5).with_jitter(0.2);

        for _ in 0..50 {
            let delay = policy.delay_for_attempt(3);
            assert!(delay >= Duration::from_millis(800));
            assert!(delay <= Duration::from_millis(1200));
        }
    }

    #[test]
    fn test_negative_coefficient_clamps_to_zero() {
        let mut policy = RetryPolicy::exponential().with_jitter(0.0);
        policy.backoff_coefficient = -2.0;

        // initial * (-2)^1 is negative
        assert_eq!(policy.delay_for_attempt(3), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(400));

        let jittered = policy.with_jitter(0.5);
        assert_eq!(jittered.delay_for_attempt(3), Duration::ZERO);
    }

    #[test]
    fn test_serialization() {
        let policy = RetryPolicy::exponential().with_max_attempts(7);

        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["initial_interval"], 100);

        let parsed: RetryPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(policy, parsed);
    }
}
