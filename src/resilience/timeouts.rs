//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap a single outbound attempt with a deadline
//! - Cancel the attempt cleanly on timeout (the future is dropped)
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors

use std::future::Future;
use std::time::Duration;

/// An attempt ran past its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptTimeout(pub Duration);

impl std::fmt::Display for AttemptTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "attempt timed out after {}ms", self.0.as_millis())
    }
}

impl std::error::Error for AttemptTimeout {}

/// Run `fut` to completion or give up after `deadline`.
pub async fn with_deadline<F>(deadline: Duration, fut: F) -> Result<F::Output, AttemptTimeout>
where
    F: Future,
{
    tokio::time::timeout(deadline, fut)
        .await
        .map_err(|_| AttemptTimeout(deadline))
}
