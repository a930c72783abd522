//! Request body materialization.
//!
//! Fingerprinting needs the parsed body, but axum bodies are streams that can
//! be read once. This layer buffers the body, parses it into a JSON value,
//! stores it as a [`ParsedBody`] extension and hands the original bytes back
//! to the request so downstream extractors still see them.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use serde_json::{Map, Value, map::Entry};
use tracing::debug;

use super::error::{codes, error_response};
use super::request::ParsedBody;

pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Key under which opaque bodies are stored, base64 encoded.
pub const RAW_BODY_FIELD: &str = "_raw";

#[derive(Debug, Clone, Copy)]
pub struct BodyLimit(pub usize);

impl Default for BodyLimit {
    fn default() -> Self {
        Self(DEFAULT_MAX_BODY_BYTES)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum BodyParseError {
    MalformedJson,
}

pub async fn materialize_body(
    State(limit): State<BodyLimit>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let bytes = match Limited::new(body, limit.0).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            debug!(error = %err, limit = limit.0, "request body rejected");
            return error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                codes::BODY_TOO_LARGE,
                "request body exceeds the configured limit",
            );
        }
    };

    let parsed = match parse_body(&parts.headers, &bytes) {
        Ok(parsed) => parsed,
        Err(BodyParseError::MalformedJson) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                codes::MALFORMED_BODY,
                "request body is not valid JSON",
            );
        }
    };

    parts.extensions.insert(ParsedBody(parsed));
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Parse a buffered body according to its content type.
///
/// - empty body: `{}`
/// - `application/json` and `+json` types: the JSON document
/// - `application/x-www-form-urlencoded`: an object of strings; repeated
///   keys collect into arrays
/// - anything else: `{"_raw": "<base64>"}`
pub fn parse_body(headers: &HeaderMap, bytes: &Bytes) -> Result<Value, BodyParseError> {
    if bytes.is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if mime == "application/json" || mime.ends_with("+json") {
        return serde_json::from_slice(bytes).map_err(|_| BodyParseError::MalformedJson);
    }

    if mime == "application/x-www-form-urlencoded" {
        return Ok(parse_form(bytes));
    }

    let mut raw = Map::new();
    raw.insert(RAW_BODY_FIELD.into(), Value::from(STANDARD.encode(bytes)));
    Ok(Value::Object(raw))
}

fn parse_form(bytes: &[u8]) -> Value {
    let mut fields = Map::new();
    for (key, value) in url::form_urlencoded::parse(bytes) {
        let value = Value::from(value.into_owned());
        match fields.entry(key.into_owned()) {
            Entry::Vacant(slot) => {
                slot.insert(value);
            }
            Entry::Occupied(mut slot) => match slot.get_mut() {
                Value::Array(values) => values.push(value),
                existing => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
            },
        }
    }
    Value::Object(fields)
}
