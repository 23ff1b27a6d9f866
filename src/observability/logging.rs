//! Tracing subscriber setup

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_filter: "info,bws_client=debug".to_string(),
            json: false,
        }
    }
}

impl TracingConfig {
    /// Reads `LOG_FORMAT=json` from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
        Self {
            json,
            ..Self::default()
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &TracingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    }
}
