//! Health verdicts and immutable health snapshots

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tri-state health verdict, plus `Unknown` before the first sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    /// Fast and error-free
    Healthy,
    /// Usable but slow, erroring or saturated
    Degraded,
    /// Should not receive new work
    Unhealthy,
    /// Not sampled yet
    Unknown,
}

impl HealthState {
    /// Preference order for endpoint selection; lower is better.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Unknown => 1,
            Self::Degraded => 2,
            Self::Unhealthy => 3,
        }
    }

    /// Get the string representation of the state
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Degraded => "DEGRADED",
            Self::Unhealthy => "UNHEALTHY",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Numeric gauge value (0=healthy, 1=degraded, 2=unhealthy, -1=unknown)
    #[must_use]
    pub const fn gauge_value(self) -> i64 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Unhealthy => 2,
            Self::Unknown => -1,
        }
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds turning raw signals into a verdict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    /// Upper bound on response time for `Healthy`
    pub healthy_response: Duration,
    /// Response times above this are at best `Degraded`
    pub degraded_response: Duration,
    /// Error rate must stay below this for `Healthy`
    pub healthy_error_rate: f64,
    /// Error rates at or above this are `Unhealthy`
    pub degraded_error_rate: f64,
    /// Pool utilization above this is `Degraded`
    pub max_utilization: f64,
    /// How long a verdict is served from cache
    pub cache_ttl: Duration,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            healthy_response: Duration::from_millis(1000),
            degraded_response: Duration::from_millis(3000),
            healthy_error_rate: 0.05,
            degraded_error_rate: 0.20,
            max_utilization: 0.9,
            cache_ttl: Duration::from_secs(30),
        }
    }
}

impl HealthThresholds {
    /// Override the cache window.
    #[must_use]
    pub const fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Computes the verdict for one sample. `None` means the response time is unbounded.
    #[must_use]
    pub fn evaluate(&self, response: Option<Duration>, error_rate: f64, utilization: f64) -> HealthState {
        let Some(response) = response else {
            return HealthState::Unhealthy;
        };
        if error_rate >= self.degraded_error_rate {
            return HealthState::Unhealthy;
        }
        if response > self.degraded_response
            || error_rate >= self.healthy_error_rate
            || utilization > self.max_utilization
        {
            return HealthState::Degraded;
        }
        if response <= self.healthy_response {
            HealthState::Healthy
        } else {
            HealthState::Degraded
        }
    }
}

/// Immutable health snapshot for the active endpoint.
///
/// Replaced wholesale on every check; never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Verdict
    pub state: HealthState,
    /// Endpoint that was checked
    pub endpoint: String,
    /// Region tag of the endpoint
    pub region: String,
    /// Probe round-trip; `None` when unbounded (probe failed)
    pub response_time_ms: Option<u64>,
    /// Failed / total requests
    pub error_rate: f64,
    /// Pool utilization in `[0, 1]`
    pub utilization: f64,
    /// When the check ran
    pub checked_at: DateTime<Utc>,
    /// Human-readable diagnostic
    pub message: String,
}

impl HealthStatus {
    /// Snapshot from a successful probe.
    #[must_use]
    pub fn evaluated(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        response: Duration,
        error_rate: f64,
        utilization: f64,
        thresholds: &HealthThresholds,
    ) -> Self {
        let state = thresholds.evaluate(Some(response), error_rate, utilization);
        let response_ms = u64::try_from(response.as_millis()).unwrap_or(u64::MAX);
        let word = match state {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unhealthy => "unhealthy",
            HealthState::Unknown => "unknown",
        };
        Self {
            state,
            endpoint: endpoint.into(),
            region: region.into(),
            response_time_ms: Some(response_ms),
            error_rate,
            utilization,
            checked_at: Utc::now(),
            message: format!(
                "Service is {word} (response: {response_ms}ms, error rate: {:.1}%)",
                error_rate * 100.0
            ),
        }
    }

    /// Snapshot for a probe that failed outright.
    #[must_use]
    pub fn failed(endpoint: impl Into<String>, region: impl Into<String>, reason: &str) -> Self {
        Self {
            state: HealthState::Unhealthy,
            endpoint: endpoint.into(),
            region: region.into(),
            response_time_ms: None,
            error_rate: 1.0,
            utilization: 0.0,
            checked_at: Utc::now(),
            message: format!("Health check failed: {reason}"),
        }
    }

    /// Whether the verdict allows new work.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        matches!(self.state, HealthState::Healthy | HealthState::Degraded)
    }

    /// Age of this snapshot.
    #[must_use]
    pub fn age(&self) -> Duration {
        (Utc::now() - self.checked_at).to_std().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> HealthThresholds {
        HealthThresholds::default()
    }

    #[test]
    fn test_fast_and_clean_is_healthy() {
        let state = thresholds().evaluate(Some(Duration::from_millis(500)), 0.02, 0.1);
        assert_eq!(state, HealthState::Healthy);
    }

    #[test]
    fn test_slow_response_is_degraded() {
        let state = thresholds().evaluate(Some(Duration::from_millis(4000)), 0.0, 0.0);
        assert_eq!(state, HealthState::Degraded);
    }

    #[test]
    fn test_between_bands_is_degraded() {
        let state = thresholds().evaluate(Some(Duration::from_millis(2000)), 0.0, 0.0);
        assert_eq!(state, HealthState::Degraded);
    }

    #[test]
    fn test_error_rate_bands() {
        let t = thresholds();
        let fast = Some(Duration::from_millis(100));
        assert_eq!(t.evaluate(fast, 0.05, 0.0), HealthState::Degraded);
        assert_eq!(t.evaluate(fast, 0.20, 0.0), HealthState::Unhealthy);
    }

    #[test]
    fn test_saturated_pool_is_degraded() {
        let state = thresholds().evaluate(Some(Duration::from_millis(100)), 0.0, 0.95);
        assert_eq!(state, HealthState::Degraded);
    }

    #[test]
    fn test_unbounded_response_is_unhealthy() {
        assert_eq!(thresholds().evaluate(None, 0.0, 0.0), HealthState::Unhealthy);
    }

    #[test]
    fn test_message_format() {
        let status = HealthStatus::evaluated(
            "grpcs://bws:443",
            "primary",
            Duration::from_millis(120),
            0.01,
            0.0,
            &thresholds(),
        );
        assert_eq!(
            status.message,
            "Service is healthy (response: 120ms, error rate: 1.0%)"
        );
    }

    #[test]
    fn test_failed_probe_snapshot() {
        let status = HealthStatus::failed("grpcs://bws:443", "primary", "connection refused");
        assert_eq!(status.state, HealthState::Unhealthy);
        assert_eq!(status.response_time_ms, None);
        assert!((status.error_rate - 1.0).abs() < f64::EPSILON);
        assert!(!status.is_healthy());
    }

    #[test]
    fn test_rank_order() {
        assert!(HealthState::Healthy.rank() < HealthState::Unknown.rank());
        assert!(HealthState::Unknown.rank() < HealthState::Degraded.rank());
        assert!(HealthState::Degraded.rank() < HealthState::Unhealthy.rank());
    }
}
