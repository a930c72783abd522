//! Engine options.
//!
//! Built once at startup and shared by reference with every request. Invalid
//! options fail the build, never an individual request.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, Method};

use super::error::OptionsError;
use super::keys::{CacheKeyBuilder, HeaderKeyExtractor, KeyExtractor, ScopedCacheKeyBuilder};
use super::matching::{FingerprintMatch, MatchChecker};
use super::store::IdempotencyCache;
use super::telemetry::{TelemetrySink, TracingSink};
use super::ttl::{DEFAULT_TTL, TtlPolicy};

pub const DEFAULT_MAX_KEY_LENGTH: usize = 255;
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 1024 * 1024;
pub const DEFAULT_SUPPORTED_METHODS: [&str; 2] = ["POST", "PUT"];
pub const DEFAULT_IGNORED_RESPONSE_HEADERS: [&str; 1] = ["x-request-id"];

pub struct IdempotencyOptions {
    pub(crate) cache: Arc<dyn IdempotencyCache>,
    pub(crate) ttl: Duration,
    pub(crate) ttl_policy: Option<Arc<dyn TtlPolicy>>,
    pub(crate) supported_methods: Vec<Method>,
    pub(crate) ignored_response_headers: Vec<HeaderName>,
    pub(crate) key_extractor: Arc<dyn KeyExtractor>,
    pub(crate) cache_key_builder: Arc<dyn CacheKeyBuilder>,
    pub(crate) request_matching_checks_enabled: bool,
    pub(crate) match_checker: Arc<dyn MatchChecker>,
    /// Zero disables the bound.
    pub(crate) max_key_length: usize,
    pub(crate) max_response_bytes: usize,
    pub(crate) telemetry: Arc<dyn TelemetrySink>,
}

impl IdempotencyOptions {
    pub fn builder() -> IdempotencyOptionsBuilder {
        IdempotencyOptionsBuilder::default()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn supported_methods(&self) -> &[Method] {
        &self.supported_methods
    }

    pub fn ignored_response_headers(&self) -> &[HeaderName] {
        &self.ignored_response_headers
    }

    pub fn request_matching_checks_enabled(&self) -> bool {
        self.request_matching_checks_enabled
    }

    pub fn max_key_length(&self) -> usize {
        self.max_key_length
    }

    pub fn max_response_bytes(&self) -> usize {
        self.max_response_bytes
    }

    pub(crate) fn key_too_long(&self, key: &str) -> bool {
        self.max_key_length > 0 && key.len() > self.max_key_length
    }
}

impl fmt::Debug for IdempotencyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdempotencyOptions")
            .field("ttl", &self.ttl)
            .field("ttl_policy", &self.ttl_policy.is_some())
            .field("supported_methods", &self.supported_methods)
            .field("ignored_response_headers", &self.ignored_response_headers)
            .field(
                "request_matching_checks_enabled",
                &self.request_matching_checks_enabled,
            )
            .field("max_key_length", &self.max_key_length)
            .field("max_response_bytes", &self.max_response_bytes)
            .finish_non_exhaustive()
    }
}

pub struct IdempotencyOptionsBuilder {
    cache: Option<Arc<dyn IdempotencyCache>>,
    ttl: Duration,
    ttl_policy: Option<Arc<dyn TtlPolicy>>,
    supported_methods: Vec<String>,
    ignored_response_headers: Vec<String>,
    key_extractor: Arc<dyn KeyExtractor>,
    cache_key_builder: Arc<dyn CacheKeyBuilder>,
    request_matching_checks_enabled: bool,
    match_checker: Arc<dyn MatchChecker>,
    max_key_length: usize,
    max_response_bytes: usize,
    telemetry: Arc<dyn TelemetrySink>,
}

impl Default for IdempotencyOptionsBuilder {
    fn default() -> Self {
        Self {
            cache: None,
            ttl: DEFAULT_TTL,
            ttl_policy: None,
            supported_methods: DEFAULT_SUPPORTED_METHODS.map(String::from).to_vec(),
            ignored_response_headers: DEFAULT_IGNORED_RESPONSE_HEADERS
                .map(String::from)
                .to_vec(),
            key_extractor: Arc::new(HeaderKeyExtractor),
            cache_key_builder: Arc::new(ScopedCacheKeyBuilder::default()),
            request_matching_checks_enabled: true,
            match_checker: Arc::new(FingerprintMatch),
            max_key_length: DEFAULT_MAX_KEY_LENGTH,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            telemetry: Arc::new(TracingSink),
        }
    }
}

impl IdempotencyOptionsBuilder {
    pub fn cache(mut self, cache: Arc<dyn IdempotencyCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl_policy(mut self, policy: impl TtlPolicy + 'static) -> Self {
        self.ttl_policy = Some(Arc::new(policy));
        self
    }

    pub fn supported_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_methods = methods.into_iter().map(Into::into).collect();
        self
    }

    pub fn ignored_response_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_response_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    pub fn key_extractor(mut self, extractor: impl KeyExtractor + 'static) -> Self {
        self.key_extractor = Arc::new(extractor);
        self
    }

    pub fn cache_key_builder(mut self, builder: impl CacheKeyBuilder + 'static) -> Self {
        self.cache_key_builder = Arc::new(builder);
        self
    }

    pub fn request_matching_checks_enabled(mut self, enabled: bool) -> Self {
        self.request_matching_checks_enabled = enabled;
        self
    }

    pub fn match_checker(mut self, checker: impl MatchChecker + 'static) -> Self {
        self.match_checker = Arc::new(checker);
        self
    }

    pub fn max_key_length(mut self, max: usize) -> Self {
        self.max_key_length = max;
        self
    }

    pub fn max_response_bytes(mut self, max: usize) -> Self {
        self.max_response_bytes = max;
        self
    }

    pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = sink;
        self
    }

    pub fn build(self) -> Result<IdempotencyOptions, OptionsError> {
        let cache = self.cache.ok_or(OptionsError::MissingCache)?;

        let supported_methods = self
            .supported_methods
            .iter()
            .map(|raw| parse_method(raw))
            .collect::<Result<Vec<_>, _>>()?;

        let ignored_response_headers = self
            .ignored_response_headers
            .iter()
            .map(|raw| {
                HeaderName::from_bytes(raw.trim().to_ascii_lowercase().as_bytes())
                    .map_err(|_| OptionsError::InvalidHeaderName(raw.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(IdempotencyOptions {
            cache,
            ttl: self.ttl,
            ttl_policy: self.ttl_policy,
            supported_methods,
            ignored_response_headers,
            key_extractor: self.key_extractor,
            cache_key_builder: self.cache_key_builder,
            request_matching_checks_enabled: self.request_matching_checks_enabled,
            match_checker: self.match_checker,
            max_key_length: self.max_key_length,
            max_response_bytes: self.max_response_bytes,
            telemetry: self.telemetry,
        })
    }
}

fn parse_method(raw: &str) -> Result<Method, OptionsError> {
    let upper = raw.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Err(OptionsError::InvalidMethod(raw.to_string()));
    }
    Method::from_bytes(upper.as_bytes()).map_err(|_| OptionsError::InvalidMethod(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::*;
    use crate::idempotency::store::MemoryStore;

    fn cache() -> Arc<dyn IdempotencyCache> {
        Arc::new(MemoryStore::new(NonZeroUsize::new(8).unwrap()))
    }

    #[test]
    fn defaults_follow_documented_values() {
        let options = IdempotencyOptions::builder().cache(cache()).build().unwrap();

        assert_eq!(options.ttl(), Duration::from_millis(86_400_000));
        assert_eq!(options.supported_methods(), [Method::POST, Method::PUT]);
        assert_eq!(
            options.ignored_response_headers(),
            [HeaderName::from_static("x-request-id")]
        );
        assert!(options.request_matching_checks_enabled());
        assert_eq!(options.max_key_length(), 255);
        assert_eq!(options.max_response_bytes(), 1024 * 1024);
    }

    #[test]
    fn missing_cache_is_rejected() {
        let err = IdempotencyOptions::builder().build().unwrap_err();
        assert_eq!(err, OptionsError::MissingCache);
    }

    #[test]
    fn methods_and_headers_are_normalized() {
        let options = IdempotencyOptions::builder()
            .cache(cache())
            .supported_methods(["post", " patch "])
            .ignored_response_headers(["X-Trace-Id"])
            .build()
            .unwrap();

        assert_eq!(options.supported_methods(), [Method::POST, Method::PATCH]);
        assert_eq!(
            options.ignored_response_headers(),
            [HeaderName::from_static("x-trace-id")]
        );
    }

    #[test]
    fn invalid_entries_fail_the_build() {
        let err = IdempotencyOptions::builder()
            .cache(cache())
            .supported_methods(["PO ST"])
            .build()
            .unwrap_err();
        assert_eq!(err, OptionsError::InvalidMethod("PO ST".into()));

        let err = IdempotencyOptions::builder()
            .cache(cache())
            .ignored_response_headers(["bad header"])
            .build()
            .unwrap_err();
        assert_eq!(err, OptionsError::InvalidHeaderName("bad header".into()));
    }

    #[test]
    fn zero_length_limit_disables_the_bound() {
        let options = IdempotencyOptions::builder()
            .cache(cache())
            .max_key_length(0)
            .build()
            .unwrap();
        assert!(!options.key_too_long(&"k".repeat(10_000)));

        let options = IdempotencyOptions::builder()
            .cache(cache())
            .max_key_length(3)
            .build()
            .unwrap();
        assert!(!options.key_too_long("abc"));
        assert!(options.key_too_long("abcd"));
    }
}
