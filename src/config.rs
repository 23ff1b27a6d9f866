//! Client configuration loaded from `BWS_*` environment variables.
//!
//! Every option has a default; only malformed values fail loading.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

use crate::auth::token::RENEWAL_BUFFER_MINUTES;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::endpoint::{EndpointAddress, EndpointSpec};
use crate::error::BwsError;
use crate::health::HealthThresholds;
use crate::retry::RetryConfig;

/// Default BWS endpoint.
pub const DEFAULT_ENDPOINT: &str = "grpcs://grpc.bws-eu.bioid.com";

/// Region tag of the preferred endpoint when none is configured.
pub const DEFAULT_PREFERRED_REGION: &str = "primary";

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Invalid endpoint address
    #[error("Invalid endpoint for {field}: {reason}")]
    InvalidEndpoint {
        /// Variable or field name
        field: String,
        /// Parser message
        reason: String,
    },

    /// A value that must be positive is zero
    #[error("Invalid {field}: must be greater than 0")]
    MustBePositive {
        /// Field name
        field: &'static str,
    },

    /// Token lifetime inside the renewal buffer, so every call would re-sign
    #[error("Invalid jwt_expire_minutes {minutes}: must exceed the {buffer} minute renewal buffer")]
    TokenLifetimeTooShort {
        /// Configured lifetime
        minutes: u32,
        /// Renewal buffer in minutes
        buffer: i64,
    },

    /// Backoff multiplier below 1.0
    #[error("Invalid backoff multiplier {0}: must be at least 1.0")]
    InvalidMultiplier(f64),

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Variable name
        name: String,
        /// Parser message
        reason: String,
    },
}

impl From<ConfigError> for BwsError {
    fn from(err: ConfigError) -> Self {
        Self::invalid_config(err.to_string())
    }
}

/// BWS client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Preferred endpoint
    pub endpoint: String,
    /// Ordered fallbacks, each `address` or `region=address`
    pub fallback_endpoints: Vec<String>,
    /// Region tag of the preferred endpoint
    pub preferred_region: String,
    /// BWS client id
    pub client_id: String,
    /// Base64 BWS signing key
    pub secret_key: SecretString,
    /// JWT lifetime
    pub jwt_expire_minutes: u32,
    /// Channels per endpoint pool
    pub channel_pool_size: usize,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// HTTP/2 keep-alive interval
    pub keep_alive_time: Duration,
    /// HTTP/2 keep-alive ack timeout
    pub keep_alive_timeout: Duration,
    /// Budget for template maintenance and liveness calls
    pub request_timeout: Duration,
    /// Budget for a verification call
    pub verification_timeout: Duration,
    /// Budget per image for an enrollment call
    pub enrollment_timeout: Duration,
    /// Retries after the first attempt
    pub max_retry_attempts: u32,
    /// Delay before the first retry
    pub initial_retry_delay: Duration,
    /// Cap on any retry delay
    pub max_retry_delay: Duration,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
    /// Background health check period, also the health cache window
    pub health_check_interval: Duration,
    /// TLS for addresses without a scheme
    pub tls_enabled: bool,
    /// Consecutive failures that open the breaker
    pub circuit_failure_threshold: u32,
    /// Time an open breaker waits before closing
    pub circuit_cooldown: Duration,
    /// Consecutive failures that mark an endpoint unhealthy
    pub endpoint_failure_threshold: u32,
    /// PEM client certificate for mutual TLS
    pub client_cert_path: Option<PathBuf>,
    /// PEM client key for mutual TLS
    pub client_key_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            fallback_endpoints: Vec::new(),
            preferred_region: DEFAULT_PREFERRED_REGION.to_string(),
            client_id: String::new(),
            secret_key: SecretString::from(String::new()),
            jwt_expire_minutes: 60,
            channel_pool_size: 5,
            connect_timeout: Duration::from_millis(10_000),
            keep_alive_time: Duration::from_secs(30),
            keep_alive_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_millis(4000),
            verification_timeout: Duration::from_millis(4000),
            enrollment_timeout: Duration::from_millis(7000),
            max_retry_attempts: 3,
            initial_retry_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_millis(5000),
            backoff_multiplier: 2.0,
            health_check_interval: Duration::from_secs(30),
            tls_enabled: true,
            circuit_failure_threshold: 5,
            circuit_cooldown: Duration::from_secs(30),
            endpoint_failure_threshold: 3,
            client_cert_path: None,
            client_key_path: None,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from environment variables (and `.env`) with validation.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for malformed or out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for malformed or out-of-range values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = Source(&lookup);
        let defaults = Self::default();

        let config = Self {
            endpoint: source.string("BWS_ENDPOINT", &defaults.endpoint),
            fallback_endpoints: source.list("BWS_FALLBACK_ENDPOINTS"),
            preferred_region: source.string("BWS_PREFERRED_REGION", &defaults.preferred_region),
            client_id: source.string("BWS_CLIENT_ID", ""),
            secret_key: SecretString::from(source.string("BWS_SECRET_KEY", "")),
            jwt_expire_minutes: source.parse("BWS_JWT_EXPIRE_MINUTES", defaults.jwt_expire_minutes)?,
            channel_pool_size: source.parse("BWS_CHANNEL_POOL_SIZE", defaults.channel_pool_size)?,
            connect_timeout: source.millis("BWS_CONNECT_TIMEOUT_MS", defaults.connect_timeout)?,
            keep_alive_time: source.secs("BWS_KEEP_ALIVE_TIME_SECS", defaults.keep_alive_time)?,
            keep_alive_timeout: source
                .secs("BWS_KEEP_ALIVE_TIMEOUT_SECS", defaults.keep_alive_timeout)?,
            request_timeout: source.millis("BWS_REQUEST_TIMEOUT_MS", defaults.request_timeout)?,
            verification_timeout: source
                .millis("BWS_VERIFICATION_TIMEOUT_MS", defaults.verification_timeout)?,
            enrollment_timeout: source
                .millis("BWS_ENROLLMENT_TIMEOUT_MS", defaults.enrollment_timeout)?,
            max_retry_attempts: source.parse("BWS_MAX_RETRY_ATTEMPTS", defaults.max_retry_attempts)?,
            initial_retry_delay: source
                .millis("BWS_INITIAL_RETRY_DELAY_MS", defaults.initial_retry_delay)?,
            max_retry_delay: source.millis("BWS_MAX_RETRY_DELAY_MS", defaults.max_retry_delay)?,
            backoff_multiplier: source.parse("BWS_BACKOFF_MULTIPLIER", defaults.backoff_multiplier)?,
            health_check_interval: source
                .secs("BWS_HEALTH_CHECK_INTERVAL_SECS", defaults.health_check_interval)?,
            tls_enabled: source.parse("BWS_TLS_ENABLED", defaults.tls_enabled)?,
            circuit_failure_threshold: source
                .parse("BWS_CIRCUIT_FAILURE_THRESHOLD", defaults.circuit_failure_threshold)?,
            circuit_cooldown: source.secs("BWS_CIRCUIT_COOLDOWN_SECS", defaults.circuit_cooldown)?,
            endpoint_failure_threshold: source
                .parse("BWS_ENDPOINT_FAILURE_THRESHOLD", defaults.endpoint_failure_threshold)?,
            client_cert_path: source.path("BWS_CLIENT_CERT_PATH"),
            client_key_path: source.path("BWS_CLIENT_KEY_PATH"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates ranges and endpoint syntax.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("channel_pool_size", self.channel_pool_size > 0),
            ("jwt_expire_minutes", self.jwt_expire_minutes > 0),
            ("connect_timeout", !self.connect_timeout.is_zero()),
            ("request_timeout", !self.request_timeout.is_zero()),
            ("verification_timeout", !self.verification_timeout.is_zero()),
            ("enrollment_timeout", !self.enrollment_timeout.is_zero()),
            ("health_check_interval", !self.health_check_interval.is_zero()),
            ("circuit_failure_threshold", self.circuit_failure_threshold > 0),
            ("endpoint_failure_threshold", self.endpoint_failure_threshold > 0),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, ok)| !ok) {
            return Err(ConfigError::MustBePositive { field });
        }

        if i64::from(self.jwt_expire_minutes) <= RENEWAL_BUFFER_MINUTES {
            return Err(ConfigError::TokenLifetimeTooShort {
                minutes: self.jwt_expire_minutes,
                buffer: RENEWAL_BUFFER_MINUTES,
            });
        }

        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(ConfigError::InvalidMultiplier(self.backoff_multiplier));
        }

        self.endpoint_specs().map(|_| ())
    }

    /// Preferred endpoint and fallbacks with their region tags.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEndpoint` for an address that does not parse.
    pub fn endpoint_specs(&self) -> Result<(EndpointSpec, Vec<EndpointSpec>), ConfigError> {
        let preferred = EndpointSpec::new(
            self.parse_address("BWS_ENDPOINT", &self.endpoint)?,
            self.preferred_region.clone(),
        );

        let fallbacks = self
            .fallback_endpoints
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                let (region, address) = match raw.split_once('=') {
                    Some((region, address)) if !region.contains("://") => {
                        (region.trim().to_string(), address)
                    }
                    _ => (format!("fallback-{}", index + 1), raw.as_str()),
                };
                Ok(EndpointSpec::new(
                    self.parse_address("BWS_FALLBACK_ENDPOINTS", address)?,
                    region,
                ))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok((preferred, fallbacks))
    }

    /// Backoff settings.
    #[must_use]
    pub const fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retry_attempts,
            initial_delay: self.initial_retry_delay,
            max_delay: self.max_retry_delay,
            multiplier: self.backoff_multiplier,
            jitter: true,
        }
    }

    /// Breaker settings.
    #[must_use]
    pub const fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.circuit_failure_threshold,
            cooldown: self.circuit_cooldown,
        }
    }

    /// Health thresholds, cached for one check interval.
    #[must_use]
    pub fn health_thresholds(&self) -> HealthThresholds {
        HealthThresholds::default().with_cache_ttl(self.health_check_interval)
    }

    /// Whether both client id and secret key are set.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.secret_key.expose_secret().trim().is_empty()
    }

    fn parse_address(&self, field: &str, raw: &str) -> Result<EndpointAddress, ConfigError> {
        EndpointAddress::parse(raw, self.tls_enabled).map_err(|e| ConfigError::InvalidEndpoint {
            field: field.to_string(),
            reason: e.to_string(),
        })
    }
}

struct Source<'a, F>(&'a F);

impl<F> Source<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.get(name)
            .map_or_else(|| default.to_string(), |v| v.trim().to_string())
    }

    /// Parse a variable with a default value.
    fn parse<T: std::str::FromStr>(&self, name: &str, default: T) -> Result<T, ConfigError>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(val) => val.trim().parse().map_err(|e: T::Err| ConfigError::ParseError {
                name: name.to_string(),
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn millis(&self, name: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse(name, default.as_millis() as u64)
            .map(Duration::from_millis)
    }

    fn secs(&self, name: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse(name, default.as_secs()).map(Duration::from_secs)
    }

    /// Parse a comma-separated list.
    fn list(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn path(&self, name: &str) -> Option<PathBuf> {
        self.get(name).map(|v| PathBuf::from(v.trim()))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ClientConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.channel_pool_size, 5);
        assert_eq!(config.verification_timeout, Duration::from_millis(4000));
        assert_eq!(config.enrollment_timeout, Duration::from_millis(7000));
        assert_eq!(config.keep_alive_timeout, Duration::from_secs(30));
        assert!((config.backoff_multiplier - 2.0).abs() < f64::EPSILON);
        assert!(config.tls_enabled);
        assert!(!config.has_credentials());
    }

    #[test]
    fn test_values_are_parsed() {
        let config = load(&[
            ("BWS_CHANNEL_POOL_SIZE", "8"),
            ("BWS_VERIFICATION_TIMEOUT_MS", "2500"),
            ("BWS_TLS_ENABLED", "false"),
            ("BWS_CLIENT_ID", "client-1"),
            ("BWS_SECRET_KEY", "c2VjcmV0"),
        ])
        .unwrap();
        assert_eq!(config.channel_pool_size, 8);
        assert_eq!(config.verification_timeout, Duration::from_millis(2500));
        assert!(!config.tls_enabled);
        assert!(config.has_credentials());
    }

    #[test]
    fn test_malformed_value_is_error() {
        let err = load(&[("BWS_CHANNEL_POOL_SIZE", "many")]).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { ref name, .. } if name == "BWS_CHANNEL_POOL_SIZE"));
    }

    #[test]
    fn test_validation_rejects_zero_and_low_multiplier() {
        assert_eq!(
            load(&[("BWS_CHANNEL_POOL_SIZE", "0")]).unwrap_err(),
            ConfigError::MustBePositive {
                field: "channel_pool_size"
            }
        );
        assert!(matches!(
            load(&[("BWS_BACKOFF_MULTIPLIER", "0.5")]).unwrap_err(),
            ConfigError::InvalidMultiplier(_)
        ));
    }

    #[test]
    fn test_token_lifetime_must_outlast_renewal_buffer() {
        assert_eq!(
            load(&[("BWS_JWT_EXPIRE_MINUTES", "5")]).unwrap_err(),
            ConfigError::TokenLifetimeTooShort {
                minutes: 5,
                buffer: 5
            }
        );
        assert_eq!(load(&[("BWS_JWT_EXPIRE_MINUTES", "6")]).unwrap().jwt_expire_minutes, 6);
    }

    #[test]
    fn test_fallback_regions() {
        let config = load(&[
            ("BWS_PREFERRED_REGION", "eu"),
            (
                "BWS_FALLBACK_ENDPOINTS",
                "us=grpcs://grpc.bws-us.bioid.com, grpcs://grpc.bws-ap.bioid.com",
            ),
        ])
        .unwrap();
        let (preferred, fallbacks) = config.endpoint_specs().unwrap();
        assert_eq!(preferred.region, "eu");
        assert_eq!(preferred.address.as_str(), "grpcs://grpc.bws-eu.bioid.com:443");
        assert_eq!(fallbacks[0].region, "us");
        assert_eq!(fallbacks[1].region, "fallback-2");
    }

    #[test]
    fn test_invalid_endpoint_rejected() {
        let err = load(&[("BWS_ENDPOINT", "ftp://bws.test")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = load(&[("BWS_SECRET_KEY", "super-secret-value")]).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret-value"));
    }
}
