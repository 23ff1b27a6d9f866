//! Health verdicts, the background monitor and region failover.

pub mod monitor;
pub mod status;

pub use monitor::{HealthMonitor, HealthProbe, MonitorHandle};
pub use status::{HealthState, HealthStatus, HealthThresholds};
