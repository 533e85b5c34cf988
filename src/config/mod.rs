//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! defaults
//!     → optional TOML file (loader.rs)
//!     → environment / flags (MAX_REQUEST, REQ_TIMEOUT, LISTEN_PORT)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is read once at startup; there is no reload
//! - All fields have defaults to allow minimal configs
//! - Any invalid value is fatal before the listener binds

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{CliArgs, ConfigError};
pub use schema::{
    AdminConfig, LimitsConfig, ListenerConfig, LogFormat, ObservabilityConfig, ProxyConfig,
    RetryConfig, TimeoutConfig, WorkerConfig,
};
