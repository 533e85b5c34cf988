//! Target URL resolution.
//!
//! The `url` parameter arrives form-decoded and is then unescaped once more,
//! so callers may send it either raw or percent-escaped. Anything that does
//! not end up as an absolute `http` URL is rejected before a worker slot is
//! spent on it.

use axum::http::Uri;

use crate::dispatch::types::ForwardError;

/// Name of the form/query parameter naming the target.
pub const TARGET_PARAM: &str = "url";

/// Turn the raw `url` parameter into an outbound URI.
pub fn resolve(raw: Option<&str>) -> Result<Uri, ForwardError> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ForwardError::InvalidTarget("missing url parameter".to_string()))?;

    let decoded = unescape(raw)?;
    if decoded.is_empty() {
        return Err(ForwardError::InvalidTarget("empty url parameter".to_string()));
    }

    let parsed = url::Url::parse(&decoded)
        .map_err(|e| ForwardError::InvalidTarget(format!("'{}': {}", decoded, e)))?;

    if parsed.scheme() != "http" {
        return Err(ForwardError::InvalidTarget(format!(
            "unsupported scheme '{}'",
            parsed.scheme()
        )));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ForwardError::InvalidTarget(format!("'{}' has no host", decoded)));
    }

    parsed
        .as_str()
        .parse::<Uri>()
        .map_err(|e| ForwardError::InvalidTarget(format!("'{}': {}", decoded, e)))
}

/// Append form fields to the query of an already resolved target.
pub fn append_query(uri: Uri, fields: &[(String, String)]) -> Result<Uri, ForwardError> {
    if fields.is_empty() {
        return Ok(uri);
    }

    let encoded = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields.iter())
        .finish();
    let joined = match uri.query() {
        Some(existing) if !existing.is_empty() => format!("{}&{}", uri, encoded),
        Some(_) => format!("{}{}", uri, encoded),
        None => format!("{}?{}", uri, encoded),
    };

    joined
        .parse::<Uri>()
        .map_err(|e| ForwardError::InvalidTarget(format!("'{}': {}", joined, e)))
}

/// Query-style unescaping: `+` becomes a space and `%XX` a byte. A stray
/// `%` or a result that is not UTF-8 is an error.
fn unescape(input: &str) -> Result<String, ForwardError> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| {
                        ForwardError::InvalidTarget(format!("bad escape at offset {} in '{}'", i, input))
                    })?;
                out.push(hex);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8(out)
        .map_err(|_| ForwardError::InvalidTarget("url parameter is not valid UTF-8".to_string()))
}
