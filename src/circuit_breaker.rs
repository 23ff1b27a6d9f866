//! Circuit breaker gating new work on the BWS endpoints.
//!
//! Consecutive failures are counted with atomics; once the threshold is
//! reached the breaker opens and every attempt fails fast until a success is
//! recorded, [`CircuitBreaker::reset`] is called, or the cool-down elapses.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{info, warn};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests are allowed
    Closed,
    /// Requests are rejected without touching the network
    Open,
}

impl CircuitState {
    /// Get the string representation of the state
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Time after which an open circuit closes again
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with custom failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Create a new config with custom cool-down.
    #[must_use]
    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

/// Lock-free consecutive-failure circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    failures: AtomicU32,
    open: AtomicBool,
    /// Milliseconds since `epoch` at which the circuit last opened
    opened_at_ms: AtomicU64,
    epoch: Instant,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration.
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            failures: AtomicU32::new(0),
            open: AtomicBool::new(false),
            opened_at_ms: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    /// Create a circuit breaker with default configuration.
    #[must_use]
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default())
    }

    /// Check if a request is allowed.
    ///
    /// An open circuit whose cool-down has elapsed closes here.
    pub fn allow_request(&self) -> bool {
        if !self.open.load(Ordering::Acquire) {
            return true;
        }
        if self.open_for() < self.config.cooldown {
            return false;
        }
        if self
            .open
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.failures.store(0, Ordering::Release);
            info!(circuit = %self.name, "Circuit closed after cool-down");
        }
        true
    }

    /// Record a successful request; resets the failure count and closes the circuit.
    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Release);
        if self.open.swap(false, Ordering::AcqRel) {
            info!(circuit = %self.name, "Circuit closed after successful request");
        }
    }

    /// Record a failed request; opens the circuit at the threshold.
    pub fn record_failure(&self) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        if failures < self.config.failure_threshold || self.open.load(Ordering::Acquire) {
            return;
        }

        self.opened_at_ms.store(self.now_ms(), Ordering::Release);
        if !self.open.swap(true, Ordering::AcqRel) {
            warn!(
                circuit = %self.name,
                failures,
                cooldown_secs = self.config.cooldown.as_secs(),
                "Circuit opened due to consecutive failures"
            );
        }
    }

    /// Get the current circuit state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        if self.open.load(Ordering::Acquire) {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    /// Get the current failure count.
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::Acquire)
    }

    /// Remaining cool-down while open.
    #[must_use]
    pub fn retry_after(&self) -> Duration {
        if self.state() == CircuitState::Closed {
            return Duration::ZERO;
        }
        self.config.cooldown.saturating_sub(self.open_for())
    }

    /// Reset the circuit breaker to closed state.
    pub fn reset(&self) {
        self.failures.store(0, Ordering::Release);
        if self.open.swap(false, Ordering::AcqRel) {
            info!(circuit = %self.name, "Circuit manually reset");
        }
    }

    /// Configured failure threshold.
    #[must_use]
    pub const fn failure_threshold(&self) -> u32 {
        self.config.failure_threshold
    }

    fn open_for(&self) -> Duration {
        let opened = self.opened_at_ms.load(Ordering::Acquire);
        Duration::from_millis(self.now_ms().saturating_sub(opened))
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_closed() {
        let cb = CircuitBreaker::with_defaults("bws");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = CircuitBreaker::with_defaults("bws");
        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
        assert!(cb.retry_after() > Duration::ZERO);
    }

    #[test]
    fn test_success_resets_failures() {
        let cb = CircuitBreaker::with_defaults("bws");
        for _ in 0..4 {
            cb.record_failure();
        }
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);

        for _ in 0..4 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_success_closes_open_circuit() {
        let cb = CircuitBreaker::new("bws", CircuitBreakerConfig::default().with_failure_threshold(1));
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_reset() {
        let cb = CircuitBreaker::new("bws", CircuitBreakerConfig::default().with_failure_threshold(2));
        cb.record_failure();
        cb.record_failure();
        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
        assert_eq!(cb.retry_after(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closes_after_cooldown() {
        let config = CircuitBreakerConfig::default()
            .with_failure_threshold(2)
            .with_cooldown(Duration::from_secs(30));
        let cb = CircuitBreaker::new("bws", config);
        cb.record_failure();
        cb.record_failure();
        assert!(!cb.allow_request());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!cb.allow_request());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }
}
