//! HTTP surface: demo order routes behind the idempotency layers.

mod middleware;
mod orders;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post, put},
};

use crate::application::orders::OrderBook;
use crate::config::{IdempotencySettings, Settings};
use crate::idempotency::{
    BodyLimit, IdempotencyCache, IdempotencyEngine, IdempotencyOptions, MemoryStore,
    OptionsError, ScopedCacheKeyBuilder, idempotency_layer, materialize_body,
};

pub use middleware::{REQUEST_ID_HEADER, RequestContext};

#[derive(Clone)]
pub struct HttpState {
    pub orders: Arc<OrderBook>,
}

/// Build an engine from validated settings and a cache backend.
pub fn build_engine(
    settings: &IdempotencySettings,
    cache: Arc<dyn IdempotencyCache>,
) -> Result<IdempotencyEngine, OptionsError> {
    let options = IdempotencyOptions::builder()
        .cache(cache)
        .ttl(settings.ttl)
        .supported_methods(settings.supported_methods.iter().cloned())
        .ignored_response_headers(settings.ignored_response_headers.iter().cloned())
        .request_matching_checks_enabled(settings.request_matching_checks_enabled)
        .max_key_length(settings.max_key_length)
        .max_response_bytes(settings.max_response_bytes)
        .cache_key_builder(ScopedCacheKeyBuilder::new(settings.namespace.clone()))
        .build()?;
    Ok(IdempotencyEngine::new(options))
}

/// Layer order, outermost first: request id, response log, body
/// materialization, idempotency.
pub fn build_router(state: HttpState, engine: IdempotencyEngine, body_limit: BodyLimit) -> Router {
    Router::new()
        .route("/orders", post(orders::create_order))
        .route("/orders/{id}", put(orders::replace_order))
        .route("/_health", get(orders::health))
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(engine, idempotency_layer))
        .layer(axum_middleware::from_fn_with_state(body_limit, materialize_body))
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

/// Router backed by a fresh [`MemoryStore`] sized from `settings`.
pub fn build_app(settings: &Settings, orders: Arc<OrderBook>) -> Result<Router, OptionsError> {
    let store = Arc::new(MemoryStore::new(settings.store.capacity));
    let engine = build_engine(&settings.idempotency, store)?;
    Ok(build_router(
        HttpState { orders },
        engine,
        BodyLimit(settings.body.max_request_bytes),
    ))
}
