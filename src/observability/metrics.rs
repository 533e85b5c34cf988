//! Metrics collection and exposition.
//!
//! # Metrics
//! - `forward_requests_total` (counter): finished forwards by outcome
//! - `forward_attempts_total` (counter): outbound attempts, first or retry
//! - `forward_admission_rejected_total` (counter): submissions refused at capacity
//! - `forward_in_flight` (gauge): forwards currently held by a worker
//! - `forward_duration_seconds` (histogram): worker time per forward, retries included
//!
//! Recording is a no-op until [`init_metrics`] installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::dispatch::types::ForwardOutcome;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_admission(admitted: bool) {
    if !admitted {
        ::metrics::counter!("forward_admission_rejected_total").increment(1);
    }
}

pub fn record_attempt(attempt: u32) {
    let kind = if attempt <= 1 { "first" } else { "retry" };
    ::metrics::counter!("forward_attempts_total", "result" => kind).increment(1);
}

/// Record a finished forward and how long the worker spent on it.
pub fn record_outcome(outcome: &ForwardOutcome, started: Instant) {
    let label = match outcome {
        Ok(result) if result.status.is_success() => "success",
        Ok(_) => "upstream_error",
        Err(e) => e.kind(),
    };
    ::metrics::counter!("forward_requests_total", "outcome" => label).increment(1);
    ::metrics::histogram!("forward_duration_seconds").record(started.elapsed().as_secs_f64());
}

/// Holds the in-flight gauge up for as long as it lives.
pub struct InFlightGuard(());

impl InFlightGuard {
    pub fn new() -> Self {
        ::metrics::gauge!("forward_in_flight").increment(1.0);
        Self(())
    }
}

impl Default for InFlightGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        ::metrics::gauge!("forward_in_flight").decrement(1.0);
    }
}
