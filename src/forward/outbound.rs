//! Outbound request construction.
//!
//! # Responsibilities
//! - Rebuild the caller's request against the target URI
//! - Copy caller headers, minus the control header and connection-level ones
//! - Copy caller cookies as `name: value` headers
//! - Label a re-encoded form body as urlencoded, whatever form the caller sent

use axum::body::{Body, Bytes};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::Request;

use crate::dispatch::types::{Cookie, TransportError, WorkItem};

/// Header selecting fire-and-forget mode.
pub const NO_WAIT: HeaderName = HeaderName::from_static("no-wait");

/// Headers that describe the inbound connection rather than the request.
const NOT_FORWARDED: [HeaderName; 8] = [
    NO_WAIT,
    header::HOST,
    header::CONTENT_LENGTH,
    header::CONNECTION,
    header::TRANSFER_ENCODING,
    header::TE,
    header::TRAILER,
    header::UPGRADE,
];

/// True if the caller asked not to wait for the forward.
pub fn is_fire_and_forget(headers: &HeaderMap) -> bool {
    headers
        .get(&NO_WAIT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "1")
}

fn is_forwardable(name: &HeaderName) -> bool {
    !NOT_FORWARDED.contains(name) && name.as_str() != "keep-alive" && name.as_str() != "proxy-connection"
}

/// Build one attempt's request. Called afresh for every retry.
pub fn build_request(item: &WorkItem, body: Bytes) -> Result<Request<Body>, TransportError> {
    let mut request = Request::builder()
        .method(item.method.clone())
        .uri(item.target.clone())
        .body(Body::from(body.clone()))
        .map_err(|e| TransportError::Request(e.to_string()))?;

    let headers = request.headers_mut();
    for (name, value) in item.headers.iter() {
        if is_forwardable(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    append_cookies(headers, &item.cookies);

    if item.payload.is_form() {
        headers.remove(header::CONTENT_TYPE);
        if !body.is_empty() {
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/x-www-form-urlencoded"),
            );
        }
    }

    Ok(request)
}

/// Append each cookie as its own header. Cookies whose name or value cannot
/// be a header, or that would shadow a connection-level header, are skipped.
pub fn append_cookies(headers: &mut HeaderMap, cookies: &[Cookie]) {
    for cookie in cookies {
        let name = match HeaderName::from_bytes(cookie.name.as_bytes()) {
            Ok(name) if is_forwardable(&name) => name,
            _ => {
                tracing::debug!(cookie = %cookie.name, "Skipping cookie not representable as header");
                continue;
            }
        };
        match HeaderValue::from_str(&cookie.value) {
            Ok(value) => {
                headers.append(name, value);
            }
            Err(_) => {
                tracing::debug!(cookie = %cookie.name, "Skipping cookie with invalid value");
            }
        }
    }
}
