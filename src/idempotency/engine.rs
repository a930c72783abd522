//! Decision engine.
//!
//! Classifies each request into one of five outcomes:
//!
//! ```text
//! START ─┬─ no key ───────────────────────────────► Passthrough
//!        ├─ key longer than limit ────────────────► Reject(KeyTooLong)
//!        └─ LOOKUP ─┬─ miss ── FINGERPRINT ───────► Capture(PendingCapture)
//!                   └─ hit ── MATCH_CHECK ─┬─ ok ─► Replay(snapshot)
//!                                          └─ ✗ ──► Reject(Mismatch)
//! ```
//!
//! Two requests racing on the same key may both observe a miss; both run
//! their handlers and the last `put` wins. The cache contract has no
//! compare-and-set, so no single-flight coordination happens here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, info};

use super::capture::PendingCapture;
use super::error::{IdempotencyError, codes, error_response};
use super::fingerprint::fingerprint;
use super::options::IdempotencyOptions;
use super::request::RequestFacts;
use super::snapshot::CachedSnapshot;
use super::store::CacheKey;
use super::telemetry::{Event, EventMetadata};
use super::ttl;

/// Client-facing rejections. Always answered with 400 and a JSON body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    KeyTooLong,
    Mismatch,
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        match self {
            Self::KeyTooLong => error_response(
                StatusCode::BAD_REQUEST,
                codes::KEY_TOO_LONG,
                "idempotency key exceeds the maximum allowed length",
            ),
            Self::Mismatch => error_response(
                StatusCode::BAD_REQUEST,
                codes::KEY_MISMATCH,
                "idempotency key was already used with a different request",
            ),
        }
    }
}

#[derive(Debug)]
pub enum Decision {
    /// No key: the request proceeds untouched.
    Passthrough,
    /// Halt with a 400; the handler never runs.
    Reject(Rejection),
    /// Run the handler, then hand its response to the capture.
    Capture(PendingCapture),
    /// Halt and answer from the stored snapshot.
    Replay(CachedSnapshot),
}

impl Decision {
    /// Metric label for the final classification of a request.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Passthrough => "key_not_set",
            Self::Reject(Rejection::KeyTooLong) => "key_too_long",
            Self::Reject(Rejection::Mismatch) => "mismatch",
            Self::Capture(_) => "miss",
            Self::Replay(_) => "hit",
        }
    }
}

#[derive(Clone)]
pub struct IdempotencyEngine {
    options: Arc<IdempotencyOptions>,
}

impl IdempotencyEngine {
    pub fn new(options: IdempotencyOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &IdempotencyOptions {
        &self.options
    }

    pub fn decide(&self, request: &RequestFacts) -> Result<Decision, IdempotencyError> {
        let started = Instant::now();
        let base = EventMetadata::new(request.method.as_str(), request.path.as_str());
        self.emit(Event::RequestStart, Duration::ZERO, &base);

        let result = self.classify(request, started);

        match &result {
            Ok(decision) => self.emit(
                Event::RequestStop,
                started.elapsed(),
                &EventMetadata {
                    outcome: Some(decision.outcome()),
                    ..base
                },
            ),
            Err(err) => self.emit(
                Event::RequestException,
                started.elapsed(),
                &EventMetadata {
                    error: Some(err),
                    outcome: Some("error"),
                    ..base
                },
            ),
        }
        result
    }

    fn classify(
        &self,
        request: &RequestFacts,
        started: Instant,
    ) -> Result<Decision, IdempotencyError> {
        let options = &*self.options;
        let base = EventMetadata::new(request.method.as_str(), request.path.as_str());

        let key = if options.supported_methods.contains(&request.method) {
            options.key_extractor.extract(request)
        } else {
            None
        };
        let Some(key) = key else {
            self.emit(Event::KeyNotSet, started.elapsed(), &base);
            return Ok(Decision::Passthrough);
        };

        let meta = EventMetadata {
            idempotency_key: Some(&key),
            ..base
        };

        if options.key_too_long(&key) {
            info!(
                key_length = key.len(),
                max_key_length = options.max_key_length,
                "rejecting oversized idempotency key"
            );
            self.emit(Event::KeyTooLong, started.elapsed(), &meta);
            return Ok(Decision::Reject(Rejection::KeyTooLong));
        }

        let cache_key = options.cache_key_builder.build(request, &key);
        let meta = EventMetadata {
            cache_key: Some(&cache_key),
            ..meta
        };

        let Some(cached) = self.cache_get(&cache_key, &meta)? else {
            // Fails before the handler runs when the body was never parsed.
            let request_hash = fingerprint(request)?;
            debug!(cache_key = %cache_key, outcome = "miss", "no stored response");
            self.emit(Event::CacheMiss, started.elapsed(), &meta);
            let ttl = ttl::resolve(options.ttl, options.ttl_policy.as_deref(), request, &key);
            return Ok(Decision::Capture(PendingCapture::new(
                request.clone(),
                cache_key,
                request_hash,
                ttl,
            )));
        };

        let meta = EventMetadata {
            cached_response: Some(&cached),
            ..meta
        };
        self.emit(Event::CacheHit, started.elapsed(), &meta);

        let matches = !options.request_matching_checks_enabled
            || options.match_checker.matches(request, &cached)?;
        if !matches {
            info!(
                cache_key = %cache_key,
                "idempotency key reused with a different request"
            );
            self.emit(Event::RequestMismatch, started.elapsed(), &meta);
            return Ok(Decision::Reject(Rejection::Mismatch));
        }

        debug!(
            cache_key = %cache_key,
            outcome = "hit",
            status = cached.status,
            "replaying stored response"
        );
        Ok(Decision::Replay(cached))
    }

    fn cache_get(
        &self,
        key: &CacheKey,
        meta: &EventMetadata<'_>,
    ) -> Result<Option<CachedSnapshot>, IdempotencyError> {
        let started = Instant::now();
        self.emit(Event::CacheGetStart, Duration::ZERO, meta);

        match self.options.cache.get(key) {
            Ok(found) => {
                self.emit(Event::CacheGetStop, started.elapsed(), meta);
                Ok(found)
            }
            Err(err) => {
                self.emit(
                    Event::CacheGetException,
                    started.elapsed(),
                    &EventMetadata {
                        error: Some(&err),
                        ..*meta
                    },
                );
                Err(err.into())
            }
        }
    }

    /// Persist a snapshot produced by a capture.
    pub(crate) fn cache_put(
        &self,
        request: &RequestFacts,
        key: &CacheKey,
        snapshot: CachedSnapshot,
        ttl: Duration,
    ) -> Result<(), IdempotencyError> {
        let started = Instant::now();
        let meta = EventMetadata {
            cache_key: Some(key),
            ..EventMetadata::new(request.method.as_str(), request.path.as_str())
        };
        self.emit(Event::CachePutStart, Duration::ZERO, &meta);

        match self.options.cache.put(key, snapshot, ttl) {
            Ok(()) => {
                self.emit(Event::CachePutStop, started.elapsed(), &meta);
                Ok(())
            }
            Err(err) => {
                self.emit(
                    Event::CachePutException,
                    started.elapsed(),
                    &EventMetadata {
                        error: Some(&err),
                        ..meta
                    },
                );
                Err(err.into())
            }
        }
    }

    fn emit(&self, event: Event, duration: Duration, meta: &EventMetadata<'_>) {
        self.options.telemetry.emit(event, duration, meta);
    }
}
