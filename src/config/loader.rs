//! Configuration loading from disk, environment and command line.
//!
//! Precedence, lowest first: built-in defaults, the optional TOML file,
//! then environment variables / flags.

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Startup options for the `forward-proxy` binary.
///
/// Every option can also be supplied through the environment; malformed
/// values are rejected by the parser before the proxy starts.
#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "forward-proxy",
    version,
    about = "Bounded-concurrency HTTP forwarding proxy"
)]
pub struct CliArgs {
    /// Optional TOML configuration file.
    ///
    /// Environment variable: `PROXY_CONFIG`
    #[arg(short, long, env = "PROXY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of concurrent forwarding workers.
    ///
    /// Environment variable: `MAX_REQUEST`
    #[arg(long, env = "MAX_REQUEST")]
    pub max_request: Option<usize>,

    /// Per-attempt upstream timeout in milliseconds.
    ///
    /// Environment variable: `REQ_TIMEOUT`
    #[arg(long, env = "REQ_TIMEOUT")]
    pub req_timeout: Option<u64>,

    /// Listen address, either "host:port", ":port" or a bare port.
    ///
    /// Environment variable: `LISTEN_PORT`
    #[arg(long, env = "LISTEN_PORT")]
    pub listen_port: Option<String>,
}

/// Parse configuration from a TOML file. Validation waits until the
/// overrides in [`load`] have been applied.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Build the effective configuration from parsed startup options.
pub fn load(args: &CliArgs) -> Result<ProxyConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    if let Some(workers) = args.max_request {
        config.workers.max_concurrent = workers;
    }
    if let Some(timeout_ms) = args.req_timeout {
        config.timeouts.attempt_ms = timeout_ms;
    }
    if let Some(listen) = &args.listen_port {
        config.listener.bind_address = normalize_bind_address(listen);
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Expand the short listen forms (":8080", "8080") to a full socket address.
pub fn normalize_bind_address(value: &str) -> String {
    let value = value.trim();
    if let Some(port) = value.strip_prefix(':') {
        format!("0.0.0.0:{}", port)
    } else if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        format!("0.0.0.0:{}", value)
    } else {
        value.to_string()
    }
}
