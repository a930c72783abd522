use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};

use crate::application::{
    error::HttpError,
    orders::{OrderError, OrderInput},
};

use super::HttpState;
use super::middleware::{REQUEST_ID_HEADER, RequestContext};

const SOURCE: &str = "infra::http::orders";
const INVALID_ORDER: &str = "invalid_order";

pub async fn create_order(
    State(state): State<HttpState>,
    Extension(ctx): Extension<RequestContext>,
    payload: Result<Json<OrderInput>, JsonRejection>,
) -> Result<Response, HttpError> {
    let Json(input) = payload.map_err(rejection_to_http)?;
    let order = state.orders.create(input).map_err(order_error_to_http)?;

    let mut response = (StatusCode::CREATED, Json(&order)).into_response();
    if let Ok(location) = HeaderValue::from_str(&format!("/orders/{}", order.id)) {
        response.headers_mut().insert(LOCATION, location);
    }
    echo_request_id(&mut response, &ctx);
    Ok(response)
}

pub async fn replace_order(
    State(state): State<HttpState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<u64>,
    payload: Result<Json<OrderInput>, JsonRejection>,
) -> Result<Response, HttpError> {
    let Json(input) = payload.map_err(rejection_to_http)?;
    let order = state.orders.upsert(id, input).map_err(order_error_to_http)?;

    let mut response = Json(&order).into_response();
    echo_request_id(&mut response, &ctx);
    Ok(response)
}

pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

// Handlers report the id they ran under so replays can expose it as
// `original-x-request-id`.
fn echo_request_id(response: &mut Response, ctx: &RequestContext) {
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
}

fn order_error_to_http(err: OrderError) -> HttpError {
    HttpError::new(
        SOURCE,
        StatusCode::UNPROCESSABLE_ENTITY,
        INVALID_ORDER,
        "order is invalid",
        err.to_string(),
    )
}

fn rejection_to_http(rejection: JsonRejection) -> HttpError {
    HttpError::new(
        SOURCE,
        StatusCode::UNPROCESSABLE_ENTITY,
        INVALID_ORDER,
        "order payload could not be read",
        rejection.body_text(),
    )
}
