//! Inbound request handling.
//!
//! # Responsibilities
//! - Generate a request ID (UUID v4) for every inbound call
//! - Read the body within the configured limit
//! - Collect form fields, the target parameter and caller cookies
//! - Produce a [`WorkItem`] ready for admission
//!
//! # Design Decisions
//! - Urlencoded and multipart body fields come before query fields, like a merged form
//! - The first `url` value wins; every `url` field is removed from the payload
//! - Multipart file parts are not form fields and are dropped
//! - A body that is not a form is forwarded untouched; the remaining query
//!   fields then move onto the target's query string

use std::error::Error as StdError;

use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart};
use axum::http::{header, HeaderMap, HeaderValue, Request};
use http_body_util::LengthLimitError;
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::dispatch::types::{Cookie, ForwardError, Payload, WorkItem};
use crate::forward::{outbound, target};

/// Header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request IDs.
#[derive(Clone, Copy, Debug, Default)]
pub struct MakeProxyRequestId;

impl MakeRequestId for MakeProxyRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}

/// Read the request ID set by the request ID layer.
pub fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Why an inbound request could not become a work item.
#[derive(Debug)]
pub enum InboundError {
    /// The body exceeded the configured limit.
    TooLarge(String),
    /// The connection broke while reading the body.
    Body(String),
    /// The target parameter was unusable.
    Target(ForwardError),
}

/// Turn an inbound request into a work item.
pub async fn into_work_item(
    request: Request<Body>,
    request_id: String,
    max_body_bytes: usize,
) -> Result<WorkItem, InboundError> {
    let (parts, body) = request.into_parts();

    let body = axum::body::to_bytes(body, max_body_bytes)
        .await
        .map_err(|e| {
            if exceeds_limit(&e) {
                InboundError::TooLarge(e.to_string())
            } else {
                InboundError::Body(e.to_string())
            }
        })?;

    let body_fields = match form_kind(&parts.headers) {
        Some(FormKind::UrlEncoded) => Some(url::form_urlencoded::parse(&body).into_owned().collect()),
        Some(FormKind::Multipart(content_type)) => Some(multipart_fields(content_type, body.clone()).await),
        None => None,
    };

    let split = split_form(body_fields, parts.uri.query(), body);
    let target = target::resolve(split.raw_target.as_deref())
        .and_then(|uri| target::append_query(uri, &split.query_fields))
        .map_err(InboundError::Target)?;
    let payload = split.payload;

    let cookies = parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::parse_header)
        .collect();

    Ok(WorkItem {
        id: request_id,
        method: parts.method,
        target,
        payload,
        fire_and_forget: outbound::is_fire_and_forget(&parts.headers),
        headers: parts.headers,
        cookies,
    })
}

/// True if reading the body failed on the length limit rather than on I/O.
fn exceeds_limit(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

enum FormKind<'a> {
    UrlEncoded,
    Multipart(&'a HeaderValue),
}

fn form_kind(headers: &HeaderMap) -> Option<FormKind<'_>> {
    let value = headers.get(header::CONTENT_TYPE)?;
    let mime = value.to_str().ok()?.split(';').next()?.trim();

    if mime.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
        Some(FormKind::UrlEncoded)
    } else if mime.eq_ignore_ascii_case("multipart/form-data") {
        Some(FormKind::Multipart(value))
    } else {
        None
    }
}

/// Text fields of a multipart body, in order. A malformed body yields the
/// fields read before the error.
async fn multipart_fields(content_type: &HeaderValue, body: Bytes) -> Vec<(String, String)> {
    let mut fields = Vec::new();

    let Ok(request) = Request::builder()
        .header(header::CONTENT_TYPE, content_type.clone())
        .body(Body::from(body))
    else {
        return fields;
    };
    let mut multipart = match Multipart::from_request(request, &()).await {
        Ok(multipart) => multipart,
        Err(e) => {
            tracing::debug!(error = %e, "Unreadable multipart form");
            return fields;
        }
    };

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Multipart form ended early");
                break;
            }
        };
        if field.file_name().is_some() {
            continue;
        }
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match field.text().await {
            Ok(value) => fields.push((name, value)),
            Err(e) => {
                tracing::debug!(field = %name, error = %e, "Unreadable multipart field");
                break;
            }
        }
    }

    fields
}

/// The target parameter and the outbound body, separated from an inbound form.
#[derive(Debug, PartialEq, Eq)]
struct FormSplit {
    raw_target: Option<String>,
    payload: Payload,
    /// Fields that could not go into the body and belong on the target URI.
    query_fields: Vec<(String, String)>,
}

/// Separate the target parameter from the fields that make up the outbound
/// body. `body_fields` is `None` when the body is not a form.
fn split_form(body_fields: Option<Vec<(String, String)>>, query: Option<&str>, body: Bytes) -> FormSplit {
    let body_is_form = body_fields.is_some();

    let mut fields = body_fields.unwrap_or_default();
    if let Some(query) = query {
        fields.extend(url::form_urlencoded::parse(query.as_bytes()).into_owned());
    }

    let raw_target = fields
        .iter()
        .find(|(k, _)| k == target::TARGET_PARAM)
        .map(|(_, v)| v.clone());
    fields.retain(|(k, _)| k != target::TARGET_PARAM);

    if body_is_form || body.is_empty() {
        FormSplit {
            raw_target,
            payload: Payload::Form(fields),
            query_fields: Vec::new(),
        }
    } else {
        FormSplit {
            raw_target,
            payload: Payload::Raw(body),
            query_fields: fields,
        }
    }
}
