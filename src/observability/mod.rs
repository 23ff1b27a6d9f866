//! Tracing and Prometheus metrics.

pub mod logging;
pub mod metrics;

pub use logging::{TracingConfig, init_tracing};
pub use metrics::BwsMetrics;
