//! Structured logging.
//!
//! # Responsibilities
//! - Install the global tracing subscriber once at startup
//! - Pick the output format (pretty for terminals, JSON for collectors)
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - Installing twice is an error, not a panic, so tests can call it freely

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

pub use tracing_subscriber::util::TryInitError;

/// Filter used when `RUST_LOG` is unset.
fn default_filter(level: &str) -> String {
    format!("forward_proxy={level},tower_http={level}")
}

/// Install the global subscriber described by `config`.
pub fn init(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter(&config.log_level).into());

    match config.log_format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    }
}
