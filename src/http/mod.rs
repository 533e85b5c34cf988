//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, handler)
//!     → request.rs (request ID, body, form fields, cookies → WorkItem)
//!     → dispatch (admission, worker pool)
//!     → response.rs (relay upstream response or envelope)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{MakeProxyRequestId, X_REQUEST_ID};
pub use response::Envelope;
pub use server::HttpServer;
