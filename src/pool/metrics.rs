//! Pool status and metrics snapshots.

use serde::Serialize;

use crate::circuit_breaker::CircuitState;

/// Status of a single endpoint pool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStatus {
    /// Endpoint address
    pub endpoint: String,
    /// Number of channels
    pub channels: usize,
    /// Calls completed through this pool
    pub requests: u64,
    /// Calls that failed
    pub failures: u64,
    /// Mean latency of successful calls
    pub average_response_time_ms: f64,
    /// Whether the pool was shut down
    pub shut_down: bool,
}

/// Aggregated connection pool metrics across all endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionPoolMetrics {
    /// Endpoint currently receiving new work
    pub active_endpoint: String,
    /// Number of live pools
    pub pool_count: usize,
    /// Channels across all live pools
    pub total_channels: usize,
    /// Calls currently executing
    pub in_flight: usize,
    /// Calls completed since start
    pub total_requests: u64,
    /// Calls failed since start
    pub failed_requests: u64,
    /// `1 - failed / total`, 1.0 before any traffic
    pub success_rate: f64,
    /// In-flight calls per channel of the active pool, capped at 1.0
    pub utilization: f64,
    /// Mean latency of successful calls
    pub average_response_time_ms: f64,
    /// Circuit breaker state
    pub circuit_state: CircuitState,
    /// Consecutive failures counted by the breaker
    pub consecutive_failures: u32,
    /// Times the active endpoint changed
    pub endpoint_switches: u64,
    /// Whether the manager was shut down
    pub shut_down: bool,
    /// Per-endpoint detail
    pub pools: Vec<PoolStatus>,
}

impl ConnectionPoolMetrics {
    /// Failed / total requests, 0.0 before any traffic.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        1.0 - self.success_rate
    }
}
