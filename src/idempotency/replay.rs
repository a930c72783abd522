//! Hit path: rebuild a response from a stored snapshot.

use std::collections::HashSet;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use tracing::warn;

use super::snapshot::{CachedSnapshot, cookie_name};

pub const REPLAYED_HEADER: &str = "idempotent-replayed";
pub const ORIGINAL_HEADER_PREFIX: &str = "original-";

/// Apply a snapshot onto a live response.
///
/// Stored cookies replace live cookies of the same name. Stored headers
/// overwrite live ones, except headers in `ignored`: those keep their live
/// value and the stored value is exposed as `original-<name>`.
pub fn apply(snapshot: &CachedSnapshot, response: &mut Response, ignored: &[HeaderName]) {
    apply_cookies(snapshot, response);
    apply_headers(snapshot, response, ignored);

    response
        .headers_mut()
        .insert(REPLAYED_HEADER, HeaderValue::from_static("true"));

    *response.status_mut() = StatusCode::from_u16(snapshot.status).unwrap_or_else(|_| {
        warn!(status = snapshot.status, "stored status is invalid; replaying as 500");
        StatusCode::INTERNAL_SERVER_ERROR
    });
    *response.body_mut() = Body::from(snapshot.body.clone());
}

/// Fresh response carrying a replayed snapshot.
pub fn replay(snapshot: &CachedSnapshot, ignored: &[HeaderName]) -> Response {
    let mut response = Response::new(Body::empty());
    apply(snapshot, &mut response, ignored);
    response
}

fn apply_cookies(snapshot: &CachedSnapshot, response: &mut Response) {
    if snapshot.cookies.is_empty() {
        return;
    }
    let headers = response.headers_mut();
    let stored: HashSet<&str> = snapshot.cookies.iter().map(|c| c.name.as_str()).collect();

    let kept: Vec<HeaderValue> = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter(|value| {
            value
                .to_str()
                .ok()
                .and_then(cookie_name)
                .is_none_or(|name| !stored.contains(name))
        })
        .cloned()
        .collect();

    headers.remove(header::SET_COOKIE);
    for value in kept {
        headers.append(header::SET_COOKIE, value);
    }
    for cookie in &snapshot.cookies {
        match HeaderValue::from_str(&cookie.set_cookie) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(_) => warn!(cookie = %cookie.name, "skipping unreplayable cookie"),
        }
    }
}

fn apply_headers(snapshot: &CachedSnapshot, response: &mut Response, ignored: &[HeaderName]) {
    let headers = response.headers_mut();
    // Overwrite each live header once, then append every stored value so
    // multi-valued headers survive.
    let mut cleared: HashSet<HeaderName> = HashSet::new();

    for (name, value) in &snapshot.headers {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            warn!(header = %name, "skipping unreplayable header");
            continue;
        };

        let target = if ignored.contains(&name) {
            match HeaderName::from_bytes(format!("{ORIGINAL_HEADER_PREFIX}{name}").as_bytes()) {
                Ok(prefixed) => prefixed,
                Err(_) => continue,
            }
        } else {
            name
        };

        if cleared.insert(target.clone()) {
            headers.remove(&target);
        }
        headers.append(target, value);
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http_body_util::BodyExt;

    use super::*;
    use crate::idempotency::snapshot::SnapshotCookie;

    fn snapshot() -> CachedSnapshot {
        CachedSnapshot {
            request_hash: serde_json::from_str("\"hash\"").unwrap(),
            status: 201,
            body: Bytes::from_static(br#"{"id":1}"#),
            cookies: vec![SnapshotCookie::parse("session=stored; Path=/").unwrap()],
            headers: vec![
                ("content-type".into(), "application/json".into()),
                ("x-request-id".into(), "req-original".into()),
                ("vary".into(), "accept".into()),
                ("vary".into(), "origin".into()),
            ],
        }
    }

    fn ignored() -> Vec<HeaderName> {
        vec![HeaderName::from_static("x-request-id")]
    }

    #[tokio::test]
    async fn replay_restores_status_body_and_marker() {
        let response = replay(&snapshot(), &ignored());

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[REPLAYED_HEADER], "true");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let vary: Vec<_> = response.headers().get_all("vary").iter().collect();
        assert_eq!(vary, ["accept", "origin"]);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"id":1}"#);
    }

    #[test]
    fn ignored_headers_keep_live_value() {
        let mut live = Response::new(Body::empty());
        live.headers_mut()
            .insert("x-request-id", HeaderValue::from_static("req-fresh"));

        apply(&snapshot(), &mut live, &ignored());

        assert_eq!(live.headers()["x-request-id"], "req-fresh");
        assert_eq!(live.headers()["original-x-request-id"], "req-original");
    }

    #[test]
    fn ignored_header_without_live_value_is_only_exposed_as_original() {
        let response = replay(&snapshot(), &ignored());
        assert!(response.headers().get("x-request-id").is_none());
        assert_eq!(response.headers()["original-x-request-id"], "req-original");
    }

    #[test]
    fn stored_headers_overwrite_live_ones() {
        let mut live = Response::new(Body::empty());
        live.headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        apply(&snapshot(), &mut live, &ignored());

        let values: Vec<_> = live.headers().get_all(header::CONTENT_TYPE).iter().collect();
        assert_eq!(values, ["application/json"]);
    }

    #[test]
    fn stored_cookies_replace_same_named_live_cookies() {
        let mut live = Response::new(Body::empty());
        live.headers_mut()
            .append(header::SET_COOKIE, HeaderValue::from_static("session=live"));
        live.headers_mut()
            .append(header::SET_COOKIE, HeaderValue::from_static("theme=dark"));

        apply(&snapshot(), &mut live, &ignored());

        let cookies: Vec<_> = live.headers().get_all(header::SET_COOKIE).iter().collect();
        assert_eq!(cookies, ["theme=dark", "session=stored; Path=/"]);
    }
}
