//! Prometheus metrics for BWS client calls
//!
//! Every [`BwsMetrics`] owns its own [`Registry`], so several clients can
//! live in one process without name clashes.

use std::fmt;
use std::time::Duration;

use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, IntGauge, Opts, Registry,
    TextEncoder,
};

use crate::circuit_breaker::CircuitState;
use crate::health::HealthState;

const NAMESPACE: &str = "bws_client";

/// Client-side request, error, retry, breaker and health metrics.
#[derive(Clone)]
pub struct BwsMetrics {
    registry: Registry,
    requests: CounterVec,
    duration: HistogramVec,
    errors: CounterVec,
    retries: CounterVec,
    circuit_state: IntGauge,
    endpoint_switches: IntCounter,
    health_state: IntGauge,
}

impl BwsMetrics {
    /// Creates the metrics in a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns a prometheus error if a metric cannot be registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests = CounterVec::new(
            Opts::new("requests_total", "Total BWS requests").namespace(NAMESPACE),
            &["operation", "status"],
        )?;
        registry.register(Box::new(requests.clone()))?;

        let duration = HistogramVec::new(
            HistogramOpts::new("request_duration_seconds", "BWS request latency in seconds")
                .namespace(NAMESPACE)
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0]),
            &["operation"],
        )?;
        registry.register(Box::new(duration.clone()))?;

        let errors = CounterVec::new(
            Opts::new("errors_total", "BWS errors by code").namespace(NAMESPACE),
            &["operation", "code"],
        )?;
        registry.register(Box::new(errors.clone()))?;

        let retries = CounterVec::new(
            Opts::new("retries_total", "BWS retry attempts").namespace(NAMESPACE),
            &["operation"],
        )?;
        registry.register(Box::new(retries.clone()))?;

        let circuit_state = IntGauge::with_opts(
            Opts::new("circuit_state", "Circuit breaker state (0=closed, 1=open)")
                .namespace(NAMESPACE),
        )?;
        registry.register(Box::new(circuit_state.clone()))?;

        let endpoint_switches = IntCounter::with_opts(
            Opts::new("endpoint_switches_total", "Active endpoint changes").namespace(NAMESPACE),
        )?;
        registry.register(Box::new(endpoint_switches.clone()))?;

        let health_state = IntGauge::with_opts(
            Opts::new(
                "health_state",
                "Health verdict (0=healthy, 1=degraded, 2=unhealthy, -1=unknown)",
            )
            .namespace(NAMESPACE),
        )?;
        health_state.set(HealthState::Unknown.gauge_value());
        registry.register(Box::new(health_state.clone()))?;

        Ok(Self {
            registry,
            requests,
            duration,
            errors,
            retries,
            circuit_state,
            endpoint_switches,
            health_state,
        })
    }

    /// Records a completed request.
    pub fn record_success(&self, operation: &str, elapsed: Duration) {
        self.requests.with_label_values(&[operation, "ok"]).inc();
        self.duration
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    /// Records a failed request with its error code.
    pub fn record_failure(&self, operation: &str, code: &str, elapsed: Duration) {
        self.requests.with_label_values(&[operation, "error"]).inc();
        self.errors.with_label_values(&[operation, code]).inc();
        self.duration
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64());
    }

    /// Records one retry.
    pub fn record_retry(&self, operation: &str) {
        self.retries.with_label_values(&[operation]).inc();
    }

    /// Updates the breaker gauge.
    pub fn set_circuit_state(&self, state: CircuitState) {
        self.circuit_state.set(match state {
            CircuitState::Closed => 0,
            CircuitState::Open => 1,
        });
    }

    /// Counts an active endpoint change.
    pub fn record_endpoint_switch(&self) {
        self.endpoint_switches.inc();
    }

    /// Updates the health gauge.
    pub fn set_health_state(&self, state: HealthState) {
        self.health_state.set(state.gauge_value());
    }

    /// The registry holding these metrics.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders the registry in the text exposition format.
    #[must_use]
    pub fn gather_text(&self) -> String {
        let mut buffer = Vec::new();
        if TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl fmt::Debug for BwsMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BwsMetrics")
            .field("circuit_state", &self.circuit_state.get())
            .field("endpoint_switches", &self.endpoint_switches.get())
            .field("health_state", &self.health_state.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_do_not_clash() {
        let first = BwsMetrics::new();
        let second = BwsMetrics::new();
        assert!(first.is_ok());
        assert!(second.is_ok());
    }

    #[test]
    fn test_gather_text_contains_counters() {
        let metrics = BwsMetrics::new().unwrap();
        metrics.record_success("verify", Duration::from_millis(120));
        metrics.record_failure("enroll", "SERVICE_UNAVAILABLE", Duration::from_millis(40));
        metrics.record_retry("enroll");
        metrics.record_endpoint_switch();
        metrics.set_circuit_state(CircuitState::Open);
        metrics.set_health_state(HealthState::Degraded);

        let text = metrics.gather_text();
        assert!(text.contains("bws_client_requests_total{operation=\"verify\",status=\"ok\"} 1"));
        assert!(text.contains("code=\"SERVICE_UNAVAILABLE\""));
        assert!(text.contains("bws_client_retries_total{operation=\"enroll\"} 1"));
        assert!(text.contains("bws_client_endpoint_switches_total 1"));
        assert!(text.contains("bws_client_circuit_state 1"));
        assert!(text.contains("bws_client_health_state 1"));
    }
}
