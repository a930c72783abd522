//! Cache collaborator contract and an in-memory implementation.

use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::CacheError;
use super::lock::mutex_lock;
use super::snapshot::CachedSnapshot;

const SOURCE: &str = "idempotency::store";

/// Opaque key under which a snapshot is stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage backing the idempotency engine.
///
/// `get` returns `Ok(None)` for absent or expired entries. Expiry is the
/// store's responsibility; the engine never deletes entries. Calls are
/// expected to be bounded in time, since the engine adds no timeout.
pub trait IdempotencyCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedSnapshot>, CacheError>;

    fn put(
        &self,
        key: &CacheKey,
        snapshot: CachedSnapshot,
        ttl: Duration,
    ) -> Result<(), CacheError>;
}

struct Entry {
    snapshot: CachedSnapshot,
    expires_at: Instant,
}

/// Bounded in-process store with per-entry expiry.
///
/// Least recently used entries are evicted once `capacity` is reached.
pub struct MemoryStore {
    entries: Mutex<LruCache<CacheKey, Entry>>,
}

impl MemoryStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of stored entries, expired ones included until next touched.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdempotencyCache for MemoryStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedSnapshot>, CacheError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        let now = Instant::now();

        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Ok(Some(entry.snapshot.clone())),
            Some(_) => {
                entries.pop(key);
                debug!(cache_key = %key, "dropped expired idempotency entry");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put(
        &self,
        key: &CacheKey,
        snapshot: CachedSnapshot,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::backend(format!("ttl of {ttl:?} overflows the clock")))?;

        let evicted = mutex_lock(&self.entries, SOURCE, "put").push(
            key.clone(),
            Entry {
                snapshot,
                expires_at,
            },
        );

        if let Some((evicted_key, _)) = evicted.filter(|(evicted_key, _)| evicted_key != key) {
            debug!(cache_key = %evicted_key, "evicted idempotency entry at capacity");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use bytes::Bytes;

    use super::*;

    fn snapshot(status: u16) -> CachedSnapshot {
        CachedSnapshot {
            request_hash: serde_json::from_str("\"hash\"").unwrap(),
            status,
            body: Bytes::from_static(b"{}"),
            cookies: Vec::new(),
            headers: Vec::new(),
        }
    }

    fn store(capacity: usize) -> MemoryStore {
        MemoryStore::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn absent_key_reads_as_none() {
        let store = store(4);
        assert!(store.get(&CacheKey::new("missing")).unwrap().is_none());
    }

    #[test]
    fn put_then_get_returns_snapshot() {
        let store = store(4);
        let key = CacheKey::new("k");
        store
            .put(&key, snapshot(201), Duration::from_secs(60))
            .unwrap();

        assert_eq!(store.get(&key).unwrap().unwrap().status, 201);
    }

    #[test]
    fn later_put_overwrites_earlier() {
        let store = store(4);
        let key = CacheKey::new("k");
        store
            .put(&key, snapshot(201), Duration::from_secs(60))
            .unwrap();
        store
            .put(&key, snapshot(500), Duration::from_secs(60))
            .unwrap();

        assert_eq!(store.get(&key).unwrap().unwrap().status, 500);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn expired_entries_read_as_absent() {
        let store = store(4);
        let key = CacheKey::new("k");
        store
            .put(&key, snapshot(201), Duration::from_millis(10))
            .unwrap();

        thread::sleep(Duration::from_millis(30));

        assert!(store.get(&key).unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn least_recently_used_entry_is_evicted() {
        let store = store(2);
        let ttl = Duration::from_secs(60);
        store.put(&CacheKey::new("a"), snapshot(200), ttl).unwrap();
        store.put(&CacheKey::new("b"), snapshot(200), ttl).unwrap();
        store.get(&CacheKey::new("a")).unwrap();
        store.put(&CacheKey::new("c"), snapshot(200), ttl).unwrap();

        assert!(store.get(&CacheKey::new("a")).unwrap().is_some());
        assert!(store.get(&CacheKey::new("b")).unwrap().is_none());
        assert!(store.get(&CacheKey::new("c")).unwrap().is_some());
    }
}
