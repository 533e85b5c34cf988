//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! dispatch / forward / http produce:
//!     → logging.rs (structured log events, request ID on every line)
//!     → metrics.rs (counters, gauge, histogram)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape, opt-in)
//! ```

pub mod logging;
pub mod metrics;
