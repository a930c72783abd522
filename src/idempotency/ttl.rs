//! Expiry for newly captured snapshots.

use std::time::Duration;

use super::request::RequestFacts;

/// Default lifetime of a snapshot: 24 hours.
pub const DEFAULT_TTL: Duration = Duration::from_millis(86_400_000);

/// Per-request TTL override, in milliseconds.
///
/// Returning `None` falls back to the static TTL.
pub trait TtlPolicy: Send + Sync {
    fn ttl_ms(&self, request: &RequestFacts, idempotency_key: &str) -> Option<u64>;
}

impl<F> TtlPolicy for F
where
    F: Fn(&RequestFacts, &str) -> Option<u64> + Send + Sync,
{
    fn ttl_ms(&self, request: &RequestFacts, idempotency_key: &str) -> Option<u64> {
        self(request, idempotency_key)
    }
}

/// Whole milliseconds in `ttl`, saturating at `u64::MAX`.
pub fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

/// Resolve the TTL for a capture.
pub(crate) fn resolve(
    static_ttl: Duration,
    policy: Option<&dyn TtlPolicy>,
    request: &RequestFacts,
    idempotency_key: &str,
) -> Duration {
    policy
        .and_then(|policy| policy.ttl_ms(request, idempotency_key))
        .map(Duration::from_millis)
        .unwrap_or(static_ttl)
}
