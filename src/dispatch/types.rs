//! Work item, forward result and error definitions.

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use thiserror::Error;

use crate::resilience::{AttemptTimeout, RetryError, Retryable};

/// A single `name=value` cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse a request `Cookie` header ("a=1; b=2").
    pub fn parse_header(value: &str) -> Vec<Cookie> {
        value
            .split(';')
            .filter_map(Self::parse_pair)
            .collect()
    }

    /// Parse the leading `name=value` of a `Set-Cookie` header, ignoring attributes.
    pub fn parse_set_cookie(value: &str) -> Option<Cookie> {
        value.split(';').next().and_then(Self::parse_pair)
    }

    fn parse_pair(pair: &str) -> Option<Cookie> {
        let (name, value) = pair.trim().split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let value = value.trim().trim_matches('"');
        Some(Cookie::new(name, value))
    }
}

/// Outbound body of a forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Form fields (minus the target parameter), re-encoded on the way out.
    Form(Vec<(String, String)>),
    /// A non-form inbound body, passed through untouched.
    Raw(Bytes),
}

impl Payload {
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Payload::Form(fields) if fields.is_empty() => Bytes::new(),
            Payload::Form(fields) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields.iter())
                    .finish();
                Bytes::from(encoded)
            }
            Payload::Raw(bytes) => bytes.clone(),
        }
    }

    pub fn is_form(&self) -> bool {
        matches!(self, Payload::Form(_))
    }
}

/// One admitted inbound request, carrying everything needed to rebuild it
/// against the target.
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Request ID of the inbound call, for log correlation.
    pub id: String,
    pub method: Method,
    /// Decoded and validated forwarding target.
    pub target: Uri,
    pub payload: Payload,
    /// Inbound headers, still including the control header.
    pub headers: HeaderMap,
    /// Cookies sent by the caller.
    pub cookies: Vec<Cookie>,
    /// The caller does not wait for the outcome.
    pub fire_and_forget: bool,
}

/// What came back from the target.
#[derive(Debug, Clone)]
pub struct ForwardResult {
    pub status: StatusCode,
    /// Response headers; repeated names keep their order.
    pub headers: HeaderMap,
    /// Cookies set by the target.
    pub cookies: Vec<Cookie>,
    pub body: Bytes,
}

/// Failure of a single outbound attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Connection could not be established or the exchange broke.
    #[error("connection failed: {0}")]
    Connect(String),

    /// The attempt exceeded its deadline.
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    BodyRead(String),

    /// The outbound request could not be constructed.
    #[error("failed to build request: {0}")]
    Request(String),
}

impl Retryable for TransportError {
    fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Request(_))
    }
}

impl From<AttemptTimeout> for TransportError {
    fn from(timeout: AttemptTimeout) -> Self {
        TransportError::Timeout(timeout.0)
    }
}

/// Terminal failure of a forward.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ForwardError {
    /// The `url` parameter was missing, undecodable or not a usable target.
    #[error("invalid target url: {0}")]
    InvalidTarget(String),

    /// Every attempt failed at the transport level.
    #[error("upstream unreachable after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: TransportError },

    /// An attempt failed in a way retrying cannot fix.
    #[error("upstream request failed: {0}")]
    Aborted(TransportError),

    /// The forward never produced an outcome (worker fault).
    #[error("forward failed internally: {0}")]
    Internal(String),
}

impl ForwardError {
    /// Status synthesized for the caller when no upstream response exists.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ForwardError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            ForwardError::Exhausted { last: TransportError::Timeout(_), .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ForwardError::Exhausted { .. } | ForwardError::Aborted(_) => StatusCode::BAD_GATEWAY,
            ForwardError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::InvalidTarget(_) => "invalid_target",
            ForwardError::Exhausted { .. } => "exhausted",
            ForwardError::Aborted(_) => "aborted",
            ForwardError::Internal(_) => "internal",
        }
    }
}

impl From<RetryError<TransportError>> for ForwardError {
    fn from(err: RetryError<TransportError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, last } => ForwardError::Exhausted { attempts, last },
            RetryError::Aborted { error, .. } => ForwardError::Aborted(error),
        }
    }
}

/// Exactly one of these reaches every synchronous caller.
pub type ForwardOutcome = Result<ForwardResult, ForwardError>;

/// Reasons a work item could not be handed to the pool or answered.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Every worker slot is taken.
    #[error("server is busy")]
    SaturatedCapacity,

    /// The dispatcher has been shut down.
    #[error("dispatcher is shutting down")]
    ShuttingDown,

    /// The worker dropped the correlation channel without answering.
    #[error("worker ended without producing a result")]
    WorkerGone,
}
