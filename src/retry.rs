//! Retry policy with exponential backoff.
//!
//! The policy only computes delays and decides eligibility; the orchestrator
//! owns the loop so each attempt can re-resolve its endpoint.

use std::time::Duration;

use crate::error::BwsError;

/// Retry policy configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
    /// Add up to 25% random jitter
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Custom retry count.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Custom initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Custom delay cap.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Custom multiplier.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Deterministic delays.
    #[must_use]
    pub const fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }
}

/// Backoff calculator and retry gate.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a retry policy.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before retry number `attempt + 1`.
    ///
    /// `initial * multiplier^attempt`, capped at the max delay, then jittered upward by up to 25%.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base_delay =
            self.config.initial_delay.as_millis() as f64 * self.config.multiplier.powi(exponent);

        let delay_ms = base_delay.min(self.config.max_delay.as_millis() as f64);

        let final_delay = if self.config.jitter {
            delay_ms * (1.0 + rand::random::<f64>() * 0.25)
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay as u64)
    }

    /// Whether `error` on zero-based `attempt` may be retried.
    ///
    /// An open breaker is never retried here even though it is retryable for callers.
    #[must_use]
    pub fn should_retry(&self, error: &BwsError, attempt: u32) -> bool {
        attempt < self.config.max_retries
            && error.is_retryable()
            && !matches!(error, BwsError::CircuitOpen { .. })
    }

    /// Maximum number of retries.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCategory, ErrorClassification, ErrorCode};

    fn unavailable() -> BwsError {
        ErrorClassification::new(ErrorCode::ServiceUnavailable, true, 503, ErrorCategory::Service)
            .into_error("unavailable")
    }

    #[test]
    fn test_default_config() {
        let config = RetryConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_delay, Duration::from_millis(100));
        assert_eq!(config.max_delay, Duration::from_secs(5));
    }

    #[test]
    fn test_delay_calculation_no_jitter() {
        let policy = RetryPolicy::new(RetryConfig::default().without_jitter());

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[test]
    fn test_max_delay_cap() {
        let policy = RetryPolicy::new(RetryConfig::default().without_jitter());
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_quarter() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let delay = policy.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();

        assert!(policy.should_retry(&unavailable(), 0));
        assert!(policy.should_retry(&unavailable(), 2));
        assert!(!policy.should_retry(&unavailable(), 3));

        assert!(!policy.should_retry(&BwsError::invalid_request("no images"), 0));
        let open = BwsError::CircuitOpen {
            endpoint: "grpcs://bws.test:443".to_string(),
            retry_after: Duration::from_secs(3),
        };
        assert!(!policy.should_retry(&open, 0));
    }
}
