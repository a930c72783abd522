//! Read-only view of an inbound request used by every engine strategy.

use axum::{
    body::Body,
    extract::OriginalUri,
    http::{HeaderMap, Method, Request, Uri, header},
};
use serde_json::Value;

/// Parsed request body, inserted into request extensions by
/// [`materialize_body`](super::body::materialize_body).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody(pub Value);

/// Snapshot of the request fields the engine reads.
///
/// Built once per request before the handler runs, so the same view feeds
/// the lookup and, on a miss, the finalizer.
#[derive(Debug, Clone)]
pub struct RequestFacts {
    pub method: Method,
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
    pub query_string: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl RequestFacts {
    pub fn from_request(request: &Request<Body>) -> Self {
        // Nested routers strip their prefix from `uri()`; the original keeps it.
        let uri = request
            .extensions()
            .get::<OriginalUri>()
            .map(|original| &original.0)
            .unwrap_or_else(|| request.uri());

        let scheme = uri.scheme_str().unwrap_or("http").to_ascii_lowercase();
        let (host, port) = authority(uri, request.headers(), &scheme);

        Self {
            method: request.method().clone(),
            scheme,
            host,
            port,
            path: uri.path().to_string(),
            query_string: uri.query().unwrap_or("").to_string(),
            headers: request.headers().clone(),
            body: request
                .extensions()
                .get::<ParsedBody>()
                .map(|parsed| parsed.0.clone()),
        }
    }

    /// First value of a header, if it is valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

fn default_port(scheme: &str) -> u16 {
    if scheme == "https" { 443 } else { 80 }
}

fn authority(uri: &Uri, headers: &HeaderMap, scheme: &str) -> (String, u16) {
    if let Some(host) = uri.host() {
        let port = uri.port_u16().unwrap_or_else(|| default_port(scheme));
        return (host.to_ascii_lowercase(), port);
    }

    let Some(raw) = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
    else {
        return (String::new(), default_port(scheme));
    };

    match raw.parse::<axum::http::uri::Authority>() {
        Ok(parsed) => (
            parsed.host().to_ascii_lowercase(),
            parsed.port_u16().unwrap_or_else(|| default_port(scheme)),
        ),
        Err(_) => (raw.to_ascii_lowercase(), default_port(scheme)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn host_and_port_come_from_host_header() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/orders?expand=items")
            .header(header::HOST, "API.example.com:8443")
            .body(Body::empty())
            .unwrap();

        let facts = RequestFacts::from_request(&request);
        assert_eq!(facts.host, "api.example.com");
        assert_eq!(facts.port, 8443);
        assert_eq!(facts.scheme, "http");
        assert_eq!(facts.path, "/orders");
        assert_eq!(facts.query_string, "expand=items");
        assert!(facts.body.is_none());
    }

    #[test]
    fn absolute_uri_wins_over_host_header() {
        let request = Request::builder()
            .uri("https://shop.test/orders")
            .header(header::HOST, "other.test")
            .body(Body::empty())
            .unwrap();

        let facts = RequestFacts::from_request(&request);
        assert_eq!(facts.host, "shop.test");
        assert_eq!(facts.port, 443);
        assert_eq!(facts.scheme, "https");
    }

    #[test]
    fn parsed_body_is_read_from_extensions() {
        let mut request = Request::builder()
            .uri("/orders")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ParsedBody(json!({"item": "x"})));

        let facts = RequestFacts::from_request(&request);
        assert_eq!(facts.body, Some(json!({"item": "x"})));
    }
}
