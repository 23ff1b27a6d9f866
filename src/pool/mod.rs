//! Connection pooling, circuit breaking and pool metrics.

pub mod channel_pool;
pub mod manager;
pub mod metrics;

pub use channel_pool::{ConnectionPool, PooledChannel};
pub use manager::{ConnectionPoolManager, InFlightGuard};
pub use metrics::{ConnectionPoolMetrics, PoolStatus};
