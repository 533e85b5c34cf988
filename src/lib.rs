//! Bounded-concurrency HTTP forwarding proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────▶ http (request ID, body, url parameter)
//!                   │
//!                   ▼
//!                 dispatch::admission ──full──▶ 423 {"status":423,"message":"Server is busy"}
//!                   │
//!                   ▼
//!                 dispatch::pool (bounded queue, N workers)
//!                   │
//!                   ▼
//!                 forward (rebuild request, per-attempt timeout, retries) ───▶ Target
//!                   │
//!                   ▼
//!                 dispatch::router (per-request one-shot, or discard)
//!     ◀──────────   │
//!     Client Response
//!
//!     Cross-cutting: config, observability, resilience, lifecycle, admin
//! ```

pub mod admin;
pub mod config;
pub mod dispatch;
pub mod forward;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use dispatch::Dispatcher;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
