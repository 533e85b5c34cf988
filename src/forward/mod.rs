//! Forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! WorkItem (target already resolved by target.rs)
//!     → outbound.rs (rebuild request: headers, cookies, body)
//!     → RetryPolicy (per-attempt deadline, up to N attempts)
//!     → hyper client (one fresh connection per attempt)
//!     → ForwardResult (status, headers, cookies, body)
//! ```
//!
//! # Design Decisions
//! - Upstream status codes are relayed, never retried
//! - Transport failures are retried; exhaustion is an explicit error
//! - No idle connections are kept: the proxy is a single-hop forwarder

pub mod outbound;
pub mod target;

use std::error::Error as StdError;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header::SET_COOKIE, Response};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tracing::Instrument;

use crate::dispatch::types::{Cookie, ForwardError, ForwardOutcome, ForwardResult, TransportError, WorkItem};
use crate::observability::metrics;
use crate::resilience::RetryPolicy;

/// Performs the outbound side of one work item.
#[async_trait]
pub trait Forward: Send + Sync {
    async fn forward(&self, item: &WorkItem) -> ForwardOutcome;
}

/// [`Forward`] implementation over a plain HTTP/1.1 client.
pub struct HttpForwarder {
    client: Client<HttpConnector, Body>,
    policy: RetryPolicy,
    max_body_bytes: usize,
}

impl HttpForwarder {
    pub fn new(policy: RetryPolicy, max_body_bytes: usize) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(policy.attempt_timeout()));

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(connector);

        Self {
            client,
            policy,
            max_body_bytes,
        }
    }

    /// One outbound exchange, body included.
    async fn attempt(&self, item: &WorkItem, body: Bytes) -> Result<ForwardResult, TransportError> {
        let request = outbound::build_request(item, body)?;

        let response: Response<Incoming> = self
            .client
            .request(request)
            .await
            .map_err(|e| TransportError::Connect(describe(&e)))?;

        let (parts, body) = response.into_parts();
        let body = axum::body::to_bytes(Body::new(body), self.max_body_bytes)
            .await
            .map_err(|e| TransportError::BodyRead(describe(&e)))?;

        let cookies = parts
            .headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(Cookie::parse_set_cookie)
            .collect();

        Ok(ForwardResult {
            status: parts.status,
            headers: parts.headers,
            cookies,
            body,
        })
    }
}

#[async_trait]
impl Forward for HttpForwarder {
    async fn forward(&self, item: &WorkItem) -> ForwardOutcome {
        let body = item.payload.to_bytes();

        let span = tracing::info_span!("forward", request_id = %item.id, target = %item.target);
        self.policy
            .run(|attempt| {
                metrics::record_attempt(attempt);
                self.attempt(item, body.clone())
            })
            .instrument(span)
            .await
            .map_err(ForwardError::from)
    }
}

/// Flatten an error and its sources into one line.
fn describe(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
