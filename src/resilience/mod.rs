//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Forward of one work item:
//!     → retries.rs (attempt loop, retryable classification)
//!     → timeouts.rs (deadline on every attempt)
//!     → backoff.rs (optional delay between attempts)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every outbound attempt has a deadline
//! - Only transport failures are retried, never upstream statuses
//! - The policy is independent of the network so it can be tested alone

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::{RetryError, RetryPolicy, Retryable};
pub use timeouts::AttemptTimeout;
