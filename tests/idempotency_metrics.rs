use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use idemgate::application::orders::OrderBook;
use idemgate::idempotency::{
    BodyLimit, IdempotencyEngine, IdempotencyOptions, METRIC_CACHE_GET_MS, METRIC_CACHE_PUT_MS,
    METRIC_REQUESTS_TOTAL, MemoryStore,
};
use idemgate::infra::http::{HttpState, build_router};
use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use tower::ServiceExt;

fn order(key: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/orders")
        .header(header::CONTENT_TYPE, "application/json")
        .header("idempotency-key", key)
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn request_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let store = Arc::new(MemoryStore::new(NonZeroUsize::new(16).unwrap()));
    let options = IdempotencyOptions::builder()
        .cache(store)
        .build()
        .expect("valid options");
    let router = build_router(
        HttpState {
            orders: Arc::new(OrderBook::new()),
        },
        IdempotencyEngine::new(options),
        BodyLimit::default(),
    );

    let requests = [
        order("m1", r#"{"item":"a","quantity":1}"#),
        order("m1", r#"{"item":"a","quantity":1}"#),
        order("m1", r#"{"item":"b","quantity":1}"#),
        order(&"x".repeat(256), r#"{"item":"a","quantity":1}"#),
    ];
    for request in requests {
        let response = router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        assert_ne!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    let snapshot = snapshotter.snapshot().into_vec();

    let names: HashSet<String> = snapshot
        .iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();
    for metric in [METRIC_REQUESTS_TOTAL, METRIC_CACHE_GET_MS, METRIC_CACHE_PUT_MS] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let outcomes: HashMap<String, u64> = snapshot
        .iter()
        .filter(|(composite_key, _, _, _)| composite_key.key().name() == METRIC_REQUESTS_TOTAL)
        .filter_map(|(composite_key, _, _, value)| {
            let outcome = composite_key
                .key()
                .labels()
                .find(|label| label.key() == "outcome")?
                .value()
                .to_string();
            match value {
                DebugValue::Counter(count) => Some((outcome, *count)),
                _ => None,
            }
        })
        .collect();
    // One count per request: the mismatch is not also counted as a hit.
    for outcome in ["miss", "hit", "mismatch", "key_too_long"] {
        assert_eq!(outcomes.get(outcome), Some(&1), "outcome {outcome}");
    }
}
