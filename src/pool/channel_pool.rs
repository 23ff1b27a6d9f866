//! Fixed-size round-robin channel pool for one endpoint.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::endpoint::EndpointAddress;
use crate::error::BwsError;
use crate::pool::metrics::PoolStatus;
use crate::transport::BwsTransport;

/// A channel handed out by a pool.
#[derive(Debug, Clone)]
pub struct PooledChannel<C> {
    /// Endpoint the channel belongs to
    pub endpoint: EndpointAddress,
    /// Slot index inside the pool
    pub slot: usize,
    /// The channel itself
    pub channel: C,
}

/// Channels for one endpoint, served round-robin.
#[derive(Debug)]
pub struct ConnectionPool<C> {
    endpoint: EndpointAddress,
    channels: Vec<C>,
    cursor: AtomicUsize,
    shutdown: AtomicBool,
    requests: AtomicU64,
    failures: AtomicU64,
    total_latency_ms: AtomicU64,
}

impl<C: Clone> ConnectionPool<C> {
    /// Creates `size` channels eagerly.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero size or if the transport cannot address the endpoint.
    pub fn new<T>(transport: &T, endpoint: EndpointAddress, size: usize) -> Result<Self, BwsError>
    where
        T: BwsTransport<Channel = C>,
    {
        if size == 0 {
            return Err(BwsError::invalid_config("pool size must be greater than 0"));
        }
        let channels = (0..size)
            .map(|_| transport.connect(&endpoint))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            endpoint,
            channels,
            cursor: AtomicUsize::new(0),
            shutdown: AtomicBool::new(false),
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
        })
    }

    /// Next channel in round-robin order.
    ///
    /// # Errors
    ///
    /// Returns `PoolShutdown` once the pool is shut down.
    pub fn get_channel(&self) -> Result<PooledChannel<C>, BwsError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(BwsError::PoolShutdown);
        }
        let slot = self.cursor.fetch_add(1, Ordering::Relaxed) % self.channels.len();
        Ok(PooledChannel {
            endpoint: self.endpoint.clone(),
            slot,
            channel: self.channels[slot].clone(),
        })
    }
}

impl<C> ConnectionPool<C> {
    /// Records a completed call.
    pub fn record_success(&self, latency: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(
            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Stops handing out channels. Dropping the pool closes them.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Whether the pool was shut down.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Number of channels.
    pub fn size(&self) -> usize {
        self.channels.len()
    }

    /// Endpoint served by this pool.
    pub const fn endpoint(&self) -> &EndpointAddress {
        &self.endpoint
    }

    /// Point-in-time status.
    pub fn status(&self) -> PoolStatus {
        let requests = self.requests.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let successes = requests.saturating_sub(failures);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);

        #[allow(clippy::cast_precision_loss)]
        let average_response_time_ms = if successes == 0 {
            0.0
        } else {
            total_latency as f64 / successes as f64
        };

        PoolStatus {
            endpoint: self.endpoint.to_string(),
            channels: self.channels.len(),
            requests,
            failures,
            average_response_time_ms,
            shut_down: self.is_shut_down(),
        }
    }
}
