//! Resilient client for the BioID Biometric Web Service (BWS).
//!
//! This crate provides:
//! - Face enrollment, verification and template maintenance over gRPC
//! - Passive, active and challenge-response liveness detection
//! - Per-endpoint channel pools with a circuit breaker
//! - Regional failover driven by a background health monitor
//! - Retries with exponential backoff for transient failures
//! - One error taxonomy for transport and service failures
//! - Prometheus metrics and `tracing` spans for every call

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod circuit_breaker;
pub mod classifier;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod health;
pub mod image;
pub mod liveness;
pub mod observability;
pub mod pool;
pub mod proto;
pub mod retry;
pub mod testing;
pub mod transport;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use client::{
    BwsClient, ClassId, EnrollmentAction, EnrollmentResult, TemplateStatus, VerificationOutcome,
};
pub use config::{ClientConfig, ConfigError};
pub use endpoint::{EndpointAddress, EndpointHealth};
pub use error::{BwsError, ErrorCategory, ErrorClassification, ErrorCode};
pub use health::{HealthState, HealthStatus, HealthThresholds};
pub use image::{ImageFormat, MAX_IMAGE_BYTES, MIN_IMAGE_BYTES};
pub use liveness::{ChallengeDirection, LivenessMode, LivenessRequest, LivenessResult};
pub use pool::ConnectionPoolMetrics;
pub use retry::{RetryConfig, RetryPolicy};
pub use transport::{BwsTransport, GrpcTransport};
