//! Idempotency key extraction and cache key construction.

use serde_json::Value;

use super::request::RequestFacts;
use super::store::CacheKey;

/// Header clients use to name an idempotent operation.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Default namespace for cache keys.
pub const DEFAULT_NAMESPACE: &str = "idemgate";

/// Derives the idempotency key from a request.
///
/// Only consulted for requests whose method is in the supported set.
pub trait KeyExtractor: Send + Sync {
    fn extract(&self, request: &RequestFacts) -> Option<String>;
}

impl<F> KeyExtractor for F
where
    F: Fn(&RequestFacts) -> Option<String> + Send + Sync,
{
    fn extract(&self, request: &RequestFacts) -> Option<String> {
        self(request)
    }
}

/// Reads the first `idempotency-key` header value.
///
/// The raw header bytes are decoded as UTF-8, so non-ASCII keys are kept.
/// Invalid sequences are replaced with U+FFFD rather than dropping the key.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeaderKeyExtractor;

impl KeyExtractor for HeaderKeyExtractor {
    fn extract(&self, request: &RequestFacts) -> Option<String> {
        request
            .headers
            .get(IDEMPOTENCY_KEY_HEADER)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
    }
}

/// Maps a request and its idempotency key to the key used for storage.
pub trait CacheKeyBuilder: Send + Sync {
    fn build(&self, request: &RequestFacts, idempotency_key: &str) -> CacheKey;
}

impl<F> CacheKeyBuilder for F
where
    F: Fn(&RequestFacts, &str) -> CacheKey + Send + Sync,
{
    fn build(&self, request: &RequestFacts, idempotency_key: &str) -> CacheKey {
        self(request, idempotency_key)
    }
}

/// Scopes keys by namespace, method and path.
///
/// The same raw key on another method or path is a separate entry. The
/// components are encoded as a JSON array so separators inside a path or key
/// cannot make two different tuples collide.
#[derive(Debug, Clone)]
pub struct ScopedCacheKeyBuilder {
    namespace: String,
}

impl ScopedCacheKeyBuilder {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl Default for ScopedCacheKeyBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl CacheKeyBuilder for ScopedCacheKeyBuilder {
    fn build(&self, request: &RequestFacts, idempotency_key: &str) -> CacheKey {
        let parts = Value::from(vec![
            self.namespace.as_str(),
            request.method.as_str(),
            request.path.as_str(),
            idempotency_key,
        ]);
        CacheKey::new(parts.to_string())
    }
}
