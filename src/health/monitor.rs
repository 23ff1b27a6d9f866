//! Periodic and on-demand health checks with failover.
//!
//! The latest verdict lives in a single [`ArcSwapOption`] slot. Readers never
//! block; each check replaces the slot wholesale.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::BwsError;
use crate::health::status::{HealthState, HealthStatus, HealthThresholds};
use crate::observability::BwsMetrics;
use crate::pool::ConnectionPoolMetrics;

/// What the monitor needs from the client it watches.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
    /// Endpoint currently receiving new work.
    fn current_endpoint(&self) -> String;

    /// Region tag of an endpoint.
    fn region_of(&self, endpoint: &str) -> String;

    /// Every configured endpoint, preferred first.
    fn endpoints(&self) -> Vec<String>;

    /// One lightweight round trip to `endpoint`; returns its latency.
    ///
    /// Service-level answers (such as an unknown probe template) count as reachable.
    async fn probe(&self, endpoint: &str) -> Result<Duration, BwsError>;

    /// Current pool counters.
    fn pool_metrics(&self) -> ConnectionPoolMetrics;

    /// Marks `from` unhealthy and switches to the best alternate.
    ///
    /// Returns the new active endpoint, or `None` when no alternate is usable.
    fn fail_over(&self, from: &str) -> Option<String>;
}

#[derive(Debug)]
struct CachedStatus {
    status: HealthStatus,
    at: Instant,
}

/// Request totals at the previous check, for a per-window error rate.
#[derive(Debug, Default, Clone, Copy)]
struct Window {
    requests: u64,
    failures: u64,
}

/// Health monitor for one client.
pub struct HealthMonitor<P: HealthProbe> {
    probe: Arc<P>,
    thresholds: HealthThresholds,
    metrics: Arc<BwsMetrics>,
    latest: ArcSwapOption<CachedStatus>,
    window: Mutex<Window>,
}

impl<P: HealthProbe> HealthMonitor<P> {
    /// Creates a monitor with no verdict yet.
    pub fn new(probe: Arc<P>, thresholds: HealthThresholds, metrics: Arc<BwsMetrics>) -> Self {
        Self {
            probe,
            thresholds,
            metrics,
            latest: ArcSwapOption::empty(),
            window: Mutex::new(Window::default()),
        }
    }

    /// Cached verdict if younger than the cache TTL, otherwise a fresh check.
    pub async fn check_health(&self) -> HealthStatus {
        if let Some(cached) = self.latest.load_full() {
            if cached.at.elapsed() < self.thresholds.cache_ttl {
                return cached.status.clone();
            }
        }
        self.check_health_now().await
    }

    /// Probes the active endpoint and replaces the cached verdict.
    pub async fn check_health_now(&self) -> HealthStatus {
        let endpoint = self.probe.current_endpoint();
        let region = self.probe.region_of(&endpoint);
        let outcome = self.probe.probe(&endpoint).await;

        let status = match outcome {
            Ok(latency) => {
                let pool = self.probe.pool_metrics();
                let error_rate = self.window_error_rate(&pool);
                HealthStatus::evaluated(
                    endpoint,
                    region,
                    latency,
                    error_rate,
                    pool.utilization,
                    &self.thresholds,
                )
            }
            Err(err) => HealthStatus::failed(endpoint, region, &err.to_string()),
        };

        self.store(status.clone());
        status
    }

    /// Latest verdict without probing.
    pub fn latest(&self) -> Option<HealthStatus> {
        self.latest.load().as_ref().map(|c| c.status.clone())
    }

    /// Whether the active endpoint answers at all.
    pub async fn is_reachable(&self) -> bool {
        let endpoint = self.probe.current_endpoint();
        match self.probe.probe(&endpoint).await {
            Ok(_) => true,
            Err(err) => {
                debug!(endpoint = %endpoint, error = %err, "Endpoint not reachable");
                false
            }
        }
    }

    /// Switches region when the latest verdict is unhealthy.
    ///
    /// Returns whether the active endpoint changed.
    pub async fn trigger_failover_if_needed(&self) -> bool {
        let status = match self.latest() {
            Some(status) => status,
            None => self.check_health().await,
        };
        if status.state != HealthState::Unhealthy {
            return false;
        }

        match self.probe.fail_over(&status.endpoint) {
            Some(next) => {
                warn!(
                    from = %status.endpoint,
                    to = %next,
                    reason = %status.message,
                    "Failed over to alternate BWS region"
                );
                self.latest.store(None);
                true
            }
            None => {
                warn!(endpoint = %status.endpoint, "Endpoint unhealthy but no alternate available");
                false
            }
        }
    }

    /// Probes every endpoint other than the active one so recovered regions are noticed.
    pub async fn probe_standby(&self) {
        let active = self.probe.current_endpoint();
        let standby: Vec<String> = self
            .probe
            .endpoints()
            .into_iter()
            .filter(|e| *e != active)
            .collect();

        let results = join_all(standby.iter().map(|e| self.probe.probe(e))).await;
        for (endpoint, result) in standby.iter().zip(results) {
            if let Err(err) = result {
                debug!(endpoint = %endpoint, error = %err, "Standby endpoint probe failed");
            }
        }
    }

    /// Runs check, standby probing and failover every `interval` on a background task.
    pub fn spawn(self: &Arc<Self>, interval: Duration) -> MonitorHandle {
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let status = monitor.check_health_now().await;
                debug!(state = %status.state, endpoint = %status.endpoint, "Background health check");
                monitor.probe_standby().await;
                monitor.trigger_failover_if_needed().await;
            }
        });
        info!(interval_ms = interval.as_millis(), "Started BWS health monitor");
        MonitorHandle { handle }
    }

    fn window_error_rate(&self, pool: &ConnectionPoolMetrics) -> f64 {
        let mut window = self.window.lock();
        let requests = pool.total_requests.saturating_sub(window.requests);
        let failures = pool.failed_requests.saturating_sub(window.failures);
        *window = Window {
            requests: pool.total_requests,
            failures: pool.failed_requests,
        };

        if requests == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = failures as f64 / requests as f64;
        rate
    }

    fn store(&self, status: HealthStatus) {
        let previous = self.latest().map(|s| s.state);
        if previous != Some(status.state) {
            match status.state {
                HealthState::Healthy => info!(endpoint = %status.endpoint, "{}", status.message),
                _ => warn!(endpoint = %status.endpoint, "{}", status.message),
            }
        }
        self.metrics.set_health_state(status.state);
        self.latest.store(Some(Arc::new(CachedStatus {
            status,
            at: Instant::now(),
        })));
    }
}

/// Owns the background monitor task; aborts it when dropped.
#[derive(Debug)]
pub struct MonitorHandle {
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    /// Stops the task.
    pub fn stop(&self) {
        self.handle.abort();
    }

    /// Whether the task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use crate::error::{ErrorCategory, ErrorClassification, ErrorCode};

    const EU: &str = "grpcs://eu.bws.test:443";
    const US: &str = "grpcs://us.bws.test:443";

    fn pool_metrics(total: u64, failed: u64) -> ConnectionPoolMetrics {
        ConnectionPoolMetrics {
            active_endpoint: EU.to_string(),
            pool_count: 1,
            total_channels: 5,
            in_flight: 0,
            total_requests: total,
            failed_requests: failed,
            success_rate: 1.0,
            utilization: 0.0,
            average_response_time_ms: 0.0,
            circuit_state: CircuitState::Closed,
            consecutive_failures: 0,
            endpoint_switches: 0,
            shut_down: false,
            pools: Vec::new(),
        }
    }

    fn unavailable() -> BwsError {
        ErrorClassification::new(ErrorCode::ServiceUnavailable, true, 503, ErrorCategory::Service)
            .into_error("connection refused")
    }

    fn base_probe() -> MockHealthProbe {
        let mut probe = MockHealthProbe::new();
        probe.expect_current_endpoint().return_const(EU.to_string());
        probe.expect_region_of().returning(|_| "eu".to_string());
        probe
    }

    fn monitor(probe: MockHealthProbe) -> HealthMonitor<MockHealthProbe> {
        HealthMonitor::new(
            Arc::new(probe),
            HealthThresholds::default(),
            Arc::new(BwsMetrics::new().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_fast_probe_is_healthy() {
        let mut probe = base_probe();
        probe
            .expect_probe()
            .returning(|_| Ok(Duration::from_millis(500)));
        probe.expect_pool_metrics().returning(|| pool_metrics(50, 1));

        let status = monitor(probe).check_health_now().await;
        assert_eq!(status.state, HealthState::Healthy);
        assert_eq!(status.region, "eu");
        assert_eq!(status.response_time_ms, Some(500));
    }

    #[tokio::test]
    async fn test_probe_error_is_unhealthy() {
        let mut probe = base_probe();
        probe.expect_probe().returning(|_| Err(unavailable()));

        let status = monitor(probe).check_health_now().await;
        assert_eq!(status.state, HealthState::Unhealthy);
        assert_eq!(status.response_time_ms, None);
        assert!(status.message.starts_with("Health check failed:"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verdict_is_cached_within_ttl() {
        let mut probe = base_probe();
        probe
            .expect_probe()
            .times(2)
            .returning(|_| Ok(Duration::from_millis(100)));
        probe.expect_pool_metrics().returning(|| pool_metrics(0, 0));
        let monitor = monitor(probe);

        monitor.check_health().await;
        monitor.check_health().await;
        tokio::time::advance(Duration::from_secs(31)).await;
        monitor.check_health().await;
    }

    #[tokio::test]
    async fn test_error_rate_is_windowed() {
        let mut probe = base_probe();
        probe
            .expect_probe()
            .returning(|_| Ok(Duration::from_millis(100)));
        let mut seq = mockall::Sequence::new();
        probe
            .expect_pool_metrics()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| pool_metrics(10, 5));
        probe
            .expect_pool_metrics()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| pool_metrics(110, 5));
        let monitor = monitor(probe);

        assert_eq!(monitor.check_health_now().await.state, HealthState::Unhealthy);
        let second = monitor.check_health_now().await;
        assert_eq!(second.state, HealthState::Healthy);
        assert!(second.error_rate.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_failover_only_when_unhealthy() {
        let mut probe = base_probe();
        probe
            .expect_probe()
            .returning(|_| Ok(Duration::from_millis(100)));
        probe.expect_pool_metrics().returning(|| pool_metrics(0, 0));
        probe.expect_fail_over().never();

        let monitor = monitor(probe);
        monitor.check_health_now().await;
        assert!(!monitor.trigger_failover_if_needed().await);
    }

    #[tokio::test]
    async fn test_failover_switches_region() {
        let mut probe = base_probe();
        probe.expect_probe().returning(|_| Err(unavailable()));
        probe
            .expect_fail_over()
            .withf(|from| from == EU)
            .times(1)
            .returning(|_| Some(US.to_string()));

        let monitor = monitor(probe);
        monitor.check_health_now().await;
        assert!(monitor.trigger_failover_if_needed().await);
        assert!(monitor.latest().is_none());
    }

    #[tokio::test]
    async fn test_failover_without_alternate() {
        let mut probe = base_probe();
        probe.expect_probe().returning(|_| Err(unavailable()));
        probe.expect_fail_over().returning(|_| None);

        let monitor = monitor(probe);
        monitor.check_health_now().await;
        assert!(!monitor.trigger_failover_if_needed().await);
    }

    #[tokio::test]
    async fn test_standby_probes_skip_active() {
        let mut probe = base_probe();
        probe
            .expect_endpoints()
            .returning(|| vec![EU.to_string(), US.to_string()]);
        probe
            .expect_probe()
            .withf(|e| e == US)
            .times(1)
            .returning(|_| Ok(Duration::from_millis(80)));

        monitor(probe).probe_standby().await;
    }

    #[tokio::test]
    async fn test_is_reachable() {
        let mut probe = base_probe();
        probe.expect_probe().returning(|_| Err(unavailable()));
        assert!(!monitor(probe).is_reachable().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_loop_checks_and_stops() {
        let mut probe = base_probe();
        probe
            .expect_probe()
            .returning(|_| Ok(Duration::from_millis(50)));
        probe.expect_pool_metrics().returning(|| pool_metrics(0, 0));
        probe.expect_endpoints().returning(|| vec![EU.to_string()]);

        let monitor = Arc::new(monitor(probe));
        let handle = monitor.spawn(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(monitor.latest().map(|s| s.state), Some(HealthState::Healthy));

        handle.stop();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.is_finished());
    }
}
