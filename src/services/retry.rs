//! Retry planning for failed actions: exponential backoff with jitter.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::domain::models::config::RetryConfig;

/// Computes retry eligibility and next-retry times.
///
/// Delay grows as `base * factor^(attempt-1)`, capped, with symmetric
/// jitter so a burst of failures does not retry in lockstep.
pub struct RetryPlanner {
    config: RetryConfig,
}

impl RetryPlanner {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn max_retries(&self) -> i64 {
        self.config.max_retries
    }

    /// Whether another attempt is allowed after `retry_count` failures.
    pub fn should_retry(&self, retry_count: i64) -> bool {
        retry_count <= self.config.max_retries
    }

    /// The time of the next retry for the given attempt number (1-based).
    pub fn next_retry_at(&self, retry_count: i64) -> DateTime<Utc> {
        Utc::now() + Duration::milliseconds(self.delay_ms(retry_count))
    }

    fn delay_ms(&self, retry_count: i64) -> i64 {
        let exponent = (retry_count - 1).max(0) as f64;
        let raw = self.config.base_delay_secs * self.config.factor.powf(exponent);
        let capped = raw.min(self.config.max_delay_secs);

        let jitter_span = capped * self.config.jitter_ratio;
        let jitter = if jitter_span > 0.0 {
            rand::thread_rng().gen_range(-jitter_span..=jitter_span)
        } else {
            0.0
        };

        ((capped + jitter).max(0.0) * 1000.0) as i64
    }
}
