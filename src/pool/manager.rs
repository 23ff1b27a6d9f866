//! Endpoint-keyed connection pool manager
//!
//! Holds one [`ConnectionPool`] per endpoint, the circuit breaker that gates
//! new work, and the currently active endpoint.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use crate::endpoint::{EndpointAddress, EndpointRegistry};
use crate::error::BwsError;
use crate::health::HealthState;
use crate::observability::BwsMetrics;
use crate::pool::channel_pool::{ConnectionPool, PooledChannel};
use crate::pool::metrics::ConnectionPoolMetrics;
use crate::transport::BwsTransport;

type PoolMap<C> = HashMap<String, Arc<ConnectionPool<C>>>;

/// Decrements the in-flight counter when a call finishes.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Owns the per-endpoint pools and the circuit breaker.
pub struct ConnectionPoolManager<T: BwsTransport> {
    transport: Arc<T>,
    registry: Arc<EndpointRegistry>,
    metrics: Arc<BwsMetrics>,
    pools: RwLock<PoolMap<T::Channel>>,
    pool_size: usize,
    breaker: CircuitBreaker,
    active: ArcSwap<EndpointAddress>,
    pinned: AtomicBool,
    shutdown: AtomicBool,
    in_flight: AtomicUsize,
    total_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_latency_ms: AtomicU64,
    switches: AtomicU64,
}

impl<T: BwsTransport> ConnectionPoolManager<T> {
    /// Creates a manager whose active endpoint is the registry's preferred one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero pool size or breaker threshold.
    pub fn new(
        transport: Arc<T>,
        registry: Arc<EndpointRegistry>,
        metrics: Arc<BwsMetrics>,
        pool_size: usize,
        breaker: CircuitBreakerConfig,
    ) -> Result<Self, BwsError> {
        if pool_size == 0 {
            return Err(BwsError::invalid_config("pool size must be greater than 0"));
        }
        if breaker.failure_threshold == 0 {
            return Err(BwsError::invalid_config(
                "circuit breaker threshold must be greater than 0",
            ));
        }

        let active = registry.preferred().clone();
        metrics.set_circuit_state(CircuitState::Closed);

        Ok(Self {
            transport,
            registry,
            metrics,
            pools: RwLock::new(HashMap::new()),
            pool_size,
            breaker: CircuitBreaker::new("bws", breaker),
            active: ArcSwap::from_pointee(active),
            pinned: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            total_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            switches: AtomicU64::new(0),
        })
    }

    /// Next channel for `endpoint`, or for the active endpoint when `None`.
    ///
    /// # Errors
    ///
    /// `PoolShutdown` after [`shutdown`](Self::shutdown); `CircuitOpen` while
    /// the breaker is open. Neither touches the network.
    pub fn get_channel(
        &self,
        endpoint: Option<&EndpointAddress>,
    ) -> Result<PooledChannel<T::Channel>, BwsError> {
        self.ensure_running()?;

        let endpoint = endpoint.map_or_else(|| self.active.load_full(), |e| Arc::new(e.clone()));

        if !self.breaker.allow_request() {
            return Err(BwsError::CircuitOpen {
                endpoint: endpoint.to_string(),
                retry_after: self.breaker.retry_after(),
            });
        }
        self.metrics.set_circuit_state(self.breaker.state());

        self.pool_for(&endpoint)?.get_channel()
    }

    /// Channel for a health probe. Skips the breaker so recovery can be observed.
    ///
    /// # Errors
    ///
    /// `PoolShutdown` after [`shutdown`](Self::shutdown).
    pub fn probe_channel(
        &self,
        endpoint: &EndpointAddress,
    ) -> Result<PooledChannel<T::Channel>, BwsError> {
        self.ensure_running()?;
        self.pool_for(endpoint)?.get_channel()
    }

    /// Channel on the endpoint the registry currently ranks best.
    ///
    /// An endpoint chosen with [`switch_endpoint`](Self::switch_endpoint) is
    /// kept until the registry marks it unhealthy.
    ///
    /// # Errors
    ///
    /// Same as [`get_channel`](Self::get_channel).
    pub fn get_channel_with_failover(&self) -> Result<PooledChannel<T::Channel>, BwsError> {
        self.ensure_running()?;

        if self.pinned.load(Ordering::Acquire) {
            let active = self.current_endpoint();
            let unhealthy = self
                .registry
                .health_of(active.as_str())
                .is_some_and(|h| h.state == HealthState::Unhealthy);
            if !unhealthy {
                return self.get_channel(Some(&active));
            }
            self.pinned.store(false, Ordering::Release);
        }

        let selected = self.registry.select_endpoint();
        if *self.active.load_full() != selected {
            self.activate(selected.clone(), "registry selection");
        }
        self.get_channel(Some(&selected))
    }

    /// Records a successful call on `endpoint`.
    pub fn record_success(&self, endpoint: &str, latency: Duration) {
        self.breaker.record_success();
        self.metrics.set_circuit_state(CircuitState::Closed);

        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        if let Some(pool) = self.pools.read().get(endpoint) {
            pool.record_success(latency);
        }
    }

    /// Records a failed call on `endpoint`; may open the breaker.
    pub fn record_failure(&self, endpoint: &str) {
        self.breaker.record_failure();
        self.metrics.set_circuit_state(self.breaker.state());

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
        if let Some(pool) = self.pools.read().get(endpoint) {
            pool.record_failure();
        }
    }

    /// Discards the pool for one endpoint; the next request recreates it.
    ///
    /// # Errors
    ///
    /// `PoolShutdown` after shutdown.
    pub fn refresh_pool(&self, endpoint: &str) -> Result<(), BwsError> {
        self.ensure_running()?;

        if let Some(pool) = self.pools.write().remove(endpoint) {
            pool.shutdown();
            info!(endpoint = %endpoint, channels = pool.size(), "Refreshed connection pool");
        } else {
            debug!(endpoint = %endpoint, "No pool to refresh");
        }
        Ok(())
    }

    /// Makes `endpoint` the active endpoint and keeps it there until it turns unhealthy.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for an empty or malformed address, `PoolShutdown` after shutdown.
    pub fn switch_endpoint(&self, endpoint: &str) -> Result<(), BwsError> {
        self.ensure_running()?;
        if endpoint.trim().is_empty() {
            return Err(BwsError::invalid_config("endpoint cannot be empty"));
        }
        let tls_default = self.active.load().is_tls();
        let address = EndpointAddress::parse(endpoint, tls_default)?;
        if *self.active.load_full() != address {
            self.activate(address, "explicit switch");
        }
        self.pinned.store(true, Ordering::Release);
        Ok(())
    }

    /// Moves new work to `endpoint` and returns to registry-driven selection.
    ///
    /// # Errors
    ///
    /// `PoolShutdown` after shutdown.
    pub fn fail_over_to(&self, endpoint: &EndpointAddress) -> Result<(), BwsError> {
        self.ensure_running()?;
        self.pinned.store(false, Ordering::Release);
        if *self.active.load_full() != *endpoint {
            self.activate(endpoint.clone(), "failover");
        }
        Ok(())
    }

    /// Shuts every pool down. Idempotent.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let pools: Vec<_> = self.pools.write().drain().map(|(_, pool)| pool).collect();
        for pool in &pools {
            pool.shutdown();
        }
        info!(pools = pools.len(), "Connection pool manager shut down");
    }

    /// Tracks one call in flight until the guard drops.
    pub fn begin_call(&self) -> InFlightGuard<'_> {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            counter: &self.in_flight,
        }
    }

    /// Endpoint currently receiving new work.
    pub fn current_endpoint(&self) -> EndpointAddress {
        EndpointAddress::clone(&self.active.load())
    }

    /// The circuit breaker.
    pub const fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Closes the breaker and clears its counter.
    pub fn reset_circuit(&self) {
        self.breaker.reset();
        self.metrics.set_circuit_state(CircuitState::Closed);
    }

    /// Whether [`shutdown`](Self::shutdown) was called.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// The endpoint registry driving failover.
    pub const fn registry(&self) -> &Arc<EndpointRegistry> {
        &self.registry
    }

    /// The transport used to create channels.
    pub const fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Point-in-time metrics snapshot.
    #[allow(clippy::cast_precision_loss)]
    pub fn metrics(&self) -> ConnectionPoolMetrics {
        let active = self.current_endpoint();
        let pools: Vec<_> = self.pools.read().values().map(|p| p.status()).collect();

        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let failed_requests = self.failed_requests.load(Ordering::Relaxed);
        let successes = total_requests.saturating_sub(failed_requests);
        let in_flight = self.in_flight.load(Ordering::Acquire);

        let success_rate = if total_requests == 0 {
            1.0
        } else {
            successes as f64 / total_requests as f64
        };
        let average_response_time_ms = if successes == 0 {
            0.0
        } else {
            self.total_latency_ms.load(Ordering::Relaxed) as f64 / successes as f64
        };
        let utilization = (in_flight as f64 / self.pool_size as f64).min(1.0);

        ConnectionPoolMetrics {
            active_endpoint: active.to_string(),
            pool_count: pools.len(),
            total_channels: pools.iter().map(|p| p.channels).sum(),
            in_flight,
            total_requests,
            failed_requests,
            success_rate,
            utilization,
            average_response_time_ms,
            circuit_state: self.breaker.state(),
            consecutive_failures: self.breaker.failure_count(),
            endpoint_switches: self.switches.load(Ordering::Relaxed),
            shut_down: self.is_shut_down(),
            pools,
        }
    }

    fn ensure_running(&self) -> Result<(), BwsError> {
        if self.is_shut_down() {
            return Err(BwsError::PoolShutdown);
        }
        Ok(())
    }

    fn activate(&self, endpoint: EndpointAddress, reason: &'static str) {
        let previous = self.active.swap(Arc::new(endpoint));
        self.switches.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_endpoint_switch();
        warn!(
            from = %previous,
            to = %self.active.load(),
            reason,
            "Switched active BWS endpoint"
        );
    }

    fn pool_for(&self, endpoint: &EndpointAddress) -> Result<Arc<ConnectionPool<T::Channel>>, BwsError> {
        if let Some(pool) = self.pools.read().get(endpoint.as_str()) {
            return Ok(Arc::clone(pool));
        }

        let mut pools = self.pools.write();
        self.ensure_running()?;
        if let Some(pool) = pools.get(endpoint.as_str()) {
            return Ok(Arc::clone(pool));
        }

        let pool = Arc::new(ConnectionPool::new(
            self.transport.as_ref(),
            endpoint.clone(),
            self.pool_size,
        )?);
        pools.insert(endpoint.as_str().to_string(), Arc::clone(&pool));
        info!(endpoint = %endpoint, channels = self.pool_size, "Created connection pool");
        Ok(pool)
    }
}
