//! Response handling.
//!
//! # Responsibilities
//! - Relay an upstream response (status, headers, body) to the caller
//! - Map forward and dispatch failures to HTTP status codes
//! - Encode the JSON envelope used for busy, shutdown and accepted replies
//!
//! # Design Decisions
//! - Framing headers from upstream are dropped; the body is re-framed here
//! - Upstream cookies are also exposed as `name: value` headers

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::dispatch::types::{DispatchError, ForwardError, ForwardResult};

/// JSON envelope returned when there is no upstream response to relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    pub status: u16,
    pub message: String,
    pub data: String,
}

impl Envelope {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            message: message.into(),
            data: String::new(),
        }
    }

    /// Default success reply, used for fire-and-forget callers.
    pub fn accepted() -> Self {
        Self::new(StatusCode::OK, "")
    }

    pub fn busy() -> Self {
        Self::new(StatusCode::LOCKED, "Server is busy")
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

fn is_framing(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "content-length" | "transfer-encoding" | "connection" | "keep-alive"
    )
}

impl IntoResponse for ForwardResult {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        for (name, value) in self.headers.iter() {
            if !is_framing(name) {
                headers.append(name.clone(), value.clone());
            }
        }

        for cookie in &self.cookies {
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(cookie.name.as_bytes()),
                HeaderValue::from_str(&cookie.value),
            ) else {
                continue;
            };
            if !is_framing(&name) && !headers.contains_key(&name) {
                headers.insert(name, value);
            }
        }

        response
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let message = match &self {
            ForwardError::InvalidTarget(_) => "Invalid url".to_string(),
            other => other.to_string(),
        };
        (
            self.status_code(),
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            message,
        )
            .into_response()
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        match self {
            DispatchError::SaturatedCapacity => Envelope::busy().into_response(),
            DispatchError::ShuttingDown => {
                Envelope::new(StatusCode::SERVICE_UNAVAILABLE, "Server is shutting down").into_response()
            }
            DispatchError::WorkerGone => {
                Envelope::new(StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
            }
        }
    }
}
