//! Miss path: snapshot the handler's response and store it.

use std::time::Duration;

use axum::{
    body::{Body, HttpBody},
    response::Response,
};
use http_body_util::{BodyExt, Limited};
use tracing::{debug, warn};

use super::engine::IdempotencyEngine;
use super::error::IdempotencyError;
use super::fingerprint::Fingerprint;
use super::request::RequestFacts;
use super::snapshot::CachedSnapshot;
use super::store::CacheKey;
use super::ttl::ttl_millis;

/// Finalizer registered on a miss.
///
/// Consumed by [`finalize`](Self::finalize), so it runs at most once per
/// request. Dropping it (for example when the request future is cancelled)
/// writes nothing.
#[derive(Debug)]
pub struct PendingCapture {
    request: RequestFacts,
    cache_key: CacheKey,
    request_hash: Fingerprint,
    ttl: Duration,
}

impl PendingCapture {
    pub(crate) fn new(
        request: RequestFacts,
        cache_key: CacheKey,
        request_hash: Fingerprint,
        ttl: Duration,
    ) -> Self {
        Self {
            request,
            cache_key,
            request_hash,
            ttl,
        }
    }

    pub fn cache_key(&self) -> &CacheKey {
        &self.cache_key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn request_hash(&self) -> &Fingerprint {
        &self.request_hash
    }

    /// Capture the fully built response and hand it back for transmission.
    ///
    /// The snapshot carries the fingerprint taken at decision time. 4xx
    /// responses are returned without being stored.
    pub async fn finalize(
        self,
        engine: &IdempotencyEngine,
        response: Response,
    ) -> Result<Response, IdempotencyError> {
        let limit = engine.options().max_response_bytes();
        let (parts, body) = response.into_parts();

        if body.size_hint().exact().is_some_and(|len| len > limit as u64) {
            warn!(
                cache_key = %self.cache_key,
                limit,
                "response exceeds capture limit; passing through uncached"
            );
            return Ok(Response::from_parts(parts, body));
        }

        let bytes = Limited::new(body, limit)
            .collect()
            .await
            .map_err(|err| IdempotencyError::response_body(err.to_string()))?
            .to_bytes();

        let snapshot = CachedSnapshot::from_parts(
            self.request_hash,
            parts.status,
            &parts.headers,
            bytes.clone(),
        );

        if snapshot.is_cacheable() {
            engine.cache_put(&self.request, &self.cache_key, snapshot, self.ttl)?;
            debug!(
                cache_key = %self.cache_key,
                status = parts.status.as_u16(),
                ttl_ms = ttl_millis(self.ttl),
                "stored idempotent response"
            );
        } else {
            debug!(
                cache_key = %self.cache_key,
                status = parts.status.as_u16(),
                "client error response left uncached"
            );
        }

        Ok(Response::from_parts(parts, Body::from(bytes)))
    }
}
