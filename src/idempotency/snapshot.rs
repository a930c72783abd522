//! Stored responses.

use axum::http::{HeaderMap, StatusCode, header};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::fingerprint::Fingerprint;

/// A `Set-Cookie` header captured from a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotCookie {
    pub name: String,
    /// Full `Set-Cookie` header value, attributes included.
    pub set_cookie: String,
}

impl SnapshotCookie {
    pub fn parse(set_cookie: &str) -> Option<Self> {
        let name = cookie_name(set_cookie)?;
        Some(Self {
            name: name.to_string(),
            set_cookie: set_cookie.to_string(),
        })
    }
}

/// Name of the cookie carried by a `Set-Cookie` value.
pub(crate) fn cookie_name(set_cookie: &str) -> Option<&str> {
    let (pair, _) = set_cookie.split_once(';').unwrap_or((set_cookie, ""));
    let (name, _) = pair.split_once('=')?;
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}

/// Response captured on a miss, replayed on later hits.
///
/// Never mutated after it is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSnapshot {
    pub request_hash: Fingerprint,
    pub status: u16,
    pub body: Bytes,
    pub cookies: Vec<SnapshotCookie>,
    pub headers: Vec<(String, String)>,
}

impl CachedSnapshot {
    /// Split response headers into cookies and plain headers.
    ///
    /// Header values that are not visible ASCII are skipped.
    pub fn from_parts(
        request_hash: Fingerprint,
        status: StatusCode,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Self {
        let mut cookies = Vec::new();
        let mut stored = Vec::new();

        for (name, value) in headers {
            let Ok(value) = value.to_str() else {
                continue;
            };
            if name == header::SET_COOKIE {
                if let Some(cookie) = SnapshotCookie::parse(value) {
                    cookies.push(cookie);
                }
            } else {
                stored.push((name.as_str().to_string(), value.to_string()));
            }
        }

        Self {
            request_hash,
            status: status.as_u16(),
            body,
            cookies,
            headers: stored,
        }
    }

    /// 4xx responses are never stored; a client error under a reused key
    /// must stay retriable. 5xx responses are stored like successes.
    pub fn is_cacheable(&self) -> bool {
        !(400..500).contains(&self.status)
    }
}
