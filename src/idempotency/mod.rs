//! Idempotency keys for mutating HTTP requests.
//!
//! A client attaches an `Idempotency-Key` header to a `POST` or `PUT`. The
//! first request with a given key runs the handler and its response is
//! stored; retries with the same key get the stored response back without
//! running the handler again. Reusing a key for a structurally different
//! request is rejected with 400.
//!
//! ## Pipeline
//!
//! 1. [`materialize_body`] buffers and parses the request body.
//! 2. [`idempotency_layer`] asks the [`IdempotencyEngine`] for a
//!    [`Decision`]:
//!    - no key: pass through
//!    - key too long or reused for a different request: 400
//!    - stored response: replay it
//!    - nothing stored: run the handler and capture its response
//!
//! Storage is delegated to an [`IdempotencyCache`]; [`MemoryStore`] is a
//! bounded in-process implementation.

mod body;
mod capture;
mod engine;
mod error;
mod fingerprint;
mod keys;
pub(crate) mod lock;
mod matching;
mod middleware;
mod options;
mod replay;
mod request;
mod snapshot;
mod store;
mod telemetry;
mod ttl;

pub use body::{
    BodyLimit, BodyParseError, DEFAULT_MAX_BODY_BYTES, RAW_BODY_FIELD, materialize_body, parse_body,
};
pub use capture::PendingCapture;
pub use engine::{Decision, IdempotencyEngine, Rejection};
pub use error::{CacheError, ErrorBody, ErrorMessage, IdempotencyError, OptionsError, codes};
pub use fingerprint::{Fingerprint, canonical_bytes, fingerprint};
pub use keys::{
    CacheKeyBuilder, DEFAULT_NAMESPACE, HeaderKeyExtractor, IDEMPOTENCY_KEY_HEADER, KeyExtractor,
    ScopedCacheKeyBuilder,
};
pub use matching::{FingerprintMatch, MatchChecker};
pub use middleware::idempotency_layer;
pub use options::{
    DEFAULT_IGNORED_RESPONSE_HEADERS, DEFAULT_MAX_KEY_LENGTH, DEFAULT_MAX_RESPONSE_BYTES,
    DEFAULT_SUPPORTED_METHODS, IdempotencyOptions, IdempotencyOptionsBuilder,
};
pub use replay::{ORIGINAL_HEADER_PREFIX, REPLAYED_HEADER, apply as apply_snapshot, replay};
pub use request::{ParsedBody, RequestFacts};
pub use snapshot::{CachedSnapshot, SnapshotCookie};
pub use store::{CacheKey, IdempotencyCache, MemoryStore};
pub use telemetry::{
    Event, EventMetadata, METRIC_CACHE_ERRORS_TOTAL, METRIC_CACHE_GET_MS, METRIC_CACHE_PUT_MS,
    METRIC_REQUESTS_TOTAL, TelemetrySink, TracingSink,
};
pub use ttl::{DEFAULT_TTL, TtlPolicy, ttl_millis};
