//! Retry policy implementation

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Backoff schedule shared by the file writer and the enrichment workers
///
/// Exponential backoff with jitter. The file writer uses an
/// [`unbounded`](RetryPolicy::unbounded) policy (a line is never dropped);
/// enrichment uses a bounded one.
///
/// # Example
///
/// ```
/// use campuslog_durable::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::enrichment()
///     .with_max_attempts(5)
///     .with_initial_interval(Duration::from_millis(50));
///
/// assert!(policy.has_attempts_remaining(4));
/// assert!(!policy.has_attempts_remaining(5));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts including the first; `None` retries forever
    pub max_attempts: Option<u32>,

    #[serde(with = "crate::reliability::duration_millis")]
    pub initial_interval: Duration,

    #[serde(with = "crate::reliability::duration_millis")]
    pub max_interval: Duration,

    pub backoff_coefficient: f64,

    /// Jitter factor (0.0-1.0); 0.1 means +/-10%
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::enrichment()
    }
}

impl RetryPolicy {
    /// Bounded policy for background enrichment
    ///
    /// - 3 attempts
    /// - 100ms initial interval, doubling, capped at 2s
    /// - 10% jitter
    pub fn enrichment() -> Self {
        Self {
            max_attempts: Some(3),
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(2),
            backoff_coefficient: 2.0,
            jitter: 0.1,
        }
    }

    /// Policy that retries forever, backing off up to `max_interval`
    pub fn unbounded(initial_interval: Duration, max_interval: Duration) -> Self {
        Self {
            max_attempts: None,
            initial_interval,
            max_interval,
            backoff_coefficient: 2.0,
            jitter: 0.1,
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: Some(1),
            initial_interval: Duration::ZERO,
            max_interval: Duration::ZERO,
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    /// Fixed intervals, no backoff, no jitter
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            initial_interval: interval,
            max_interval: interval,
            backoff_coefficient: 1.0,
            jitter: 0.0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts.max(1));
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

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Delay before the given attempt (1-based); the first attempt has none
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let retry_num = (attempt - 1).min(64) as i32;
        let base =
            self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(retry_num - 1);
        let capped = base.min(self.max_interval.as_secs_f64());

        let jitter_range = capped * self.jitter;
        let jittered = if jitter_range > 0.0 {
            let offset = rand::thread_rng().gen_range(-jitter_range..jitter_range);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered)
    }

    /// Whether another attempt may follow `current_attempt`
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| current_attempt < max)
    }
}
