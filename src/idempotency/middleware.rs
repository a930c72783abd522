//! Axum middleware driving the idempotency engine.
//!
//! Install after [`materialize_body`](super::body::materialize_body) so the
//! parsed body is available when the request is fingerprinted:
//!
//! ```ignore
//! Router::new()
//!     .route("/orders", post(create_order))
//!     .layer(middleware::from_fn_with_state(engine, idempotency_layer))
//!     .layer(middleware::from_fn_with_state(BodyLimit::default(), materialize_body));
//! ```

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, instrument};

use super::engine::{Decision, IdempotencyEngine};
use super::error::IdempotencyError;
use super::replay::replay;
use super::request::RequestFacts;

#[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
pub async fn idempotency_layer(
    State(engine): State<IdempotencyEngine>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let facts = RequestFacts::from_request(&request);

    let decision = match engine.decide(&facts) {
        Ok(decision) => decision,
        Err(err) => return failure(err),
    };

    match decision {
        Decision::Passthrough => next.run(request).await,
        Decision::Reject(rejection) => rejection.into_response(),
        Decision::Replay(snapshot) => {
            replay(&snapshot, engine.options().ignored_response_headers())
        }
        Decision::Capture(pending) => {
            let response = next.run(request).await;
            pending
                .finalize(&engine, response)
                .await
                .unwrap_or_else(failure)
        }
    }
}

fn failure(err: IdempotencyError) -> Response {
    error!(code = err.code(), error = %err, "idempotency handling failed");
    err.into_response()
}
