//! Error types for the idempotency engine.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

pub mod codes {
    pub const KEY_TOO_LONG: &str = "idempotency_key_too_long";
    pub const KEY_MISMATCH: &str = "idempotency_key_mismatch";
    pub const BODY_NOT_MATERIALIZED: &str = "body_not_materialized";
    pub const CACHE: &str = "idempotency_cache_error";
    pub const RESPONSE_BODY: &str = "response_body_error";
    pub const MALFORMED_BODY: &str = "malformed_body";
    pub const BODY_TOO_LARGE: &str = "body_too_large";
}

/// Failure reported by a cache collaborator.
///
/// The engine never interprets these beyond propagating them; "absent" is
/// expressed as `Ok(None)` from `get`, never as an error.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend failure: {message}")]
    Backend { message: String },
}

impl CacheError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Per-request failures of the engine.
#[derive(Debug, Error)]
pub enum IdempotencyError {
    /// Fingerprinting ran before the request body was parsed. This is a
    /// pipeline wiring defect, not something a client can fix by retrying.
    #[error(
        "request body has not been materialized; install `materialize_body` before the idempotency layer"
    )]
    BodyNotMaterialized,
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("failed to buffer response body: {message}")]
    ResponseBody { message: String },
}

impl IdempotencyError {
    pub fn response_body(message: impl Into<String>) -> Self {
        Self::ResponseBody {
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BodyNotMaterialized => codes::BODY_NOT_MATERIALIZED,
            Self::Cache(_) => codes::CACHE,
            Self::ResponseBody { .. } => codes::RESPONSE_BODY,
        }
    }
}

/// Invalid engine options, raised once when the options are built.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionsError {
    #[error("a cache implementation is required")]
    MissingCache,
    #[error("unsupported HTTP method `{0}` in supported_methods")]
    InvalidMethod(String),
    #[error("invalid header name `{0}` in ignored_response_headers")]
    InvalidHeaderName(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorMessage,
}

#[derive(Debug, Serialize)]
pub struct ErrorMessage {
    pub code: &'static str,
    pub message: &'static str,
}

/// Build a JSON error response in the shape shared by every rejection.
pub(crate) fn error_response(
    status: StatusCode,
    code: &'static str,
    message: &'static str,
) -> Response {
    let body = ErrorBody {
        error: ErrorMessage { code, message },
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for IdempotencyError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::BodyNotMaterialized => "request body was not available for idempotency checks",
            Self::Cache(_) => "idempotency cache is unavailable",
            Self::ResponseBody { .. } => "response could not be captured",
        };
        error_response(StatusCode::INTERNAL_SERVER_ERROR, self.code(), message)
    }
}
