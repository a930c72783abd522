//! Decides whether a hit belongs to the same logical request.

use super::error::IdempotencyError;
use super::fingerprint::fingerprint;
use super::request::RequestFacts;
use super::snapshot::CachedSnapshot;

pub trait MatchChecker: Send + Sync {
    fn matches(
        &self,
        request: &RequestFacts,
        cached: &CachedSnapshot,
    ) -> Result<bool, IdempotencyError>;
}

impl<F> MatchChecker for F
where
    F: Fn(&RequestFacts, &CachedSnapshot) -> Result<bool, IdempotencyError> + Send + Sync,
{
    fn matches(
        &self,
        request: &RequestFacts,
        cached: &CachedSnapshot,
    ) -> Result<bool, IdempotencyError> {
        self(request, cached)
    }
}

/// Compares the request fingerprint with the one stored alongside the
/// snapshot.
#[derive(Debug, Default, Clone, Copy)]
pub struct FingerprintMatch;

impl MatchChecker for FingerprintMatch {
    fn matches(
        &self,
        request: &RequestFacts,
        cached: &CachedSnapshot,
    ) -> Result<bool, IdempotencyError> {
        Ok(fingerprint(request)? == cached.request_hash)
    }
}
