//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → main triggers Shutdown
//!
//! Shutdown (shutdown.rs):
//!     trigger → HTTP server stops accepting → dispatcher refuses new work
//!             → queued work drains → workers joined → exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config, logging, metrics, then listeners
//! - Ordered shutdown: stop accept, drain, join

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
