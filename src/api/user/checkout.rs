use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::Duration;

use crate::api::{json_body, AppState};
use crate::core::{
    checkout::{self, CheckoutRequest},
    identity::Identity,
};
use crate::errors::Result;
use crate::middleware::logging::to_response;

pub fn checkout_router() -> Router {
    Router::new()
        .route("/checkout/create/", post(create_order))
        .route("/checkout/order/:order_id/", get(get_order))
        .route("/checkout/orders/", get(user_orders))
        .route("/checkout/track/:order_id/", get(track_order))
}

async fn create_order(
    Extension(state): Extension<AppState>,
    Extension(identity): Extension<Identity>,
    payload: std::result::Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Response> {
    let new_order = json_body(payload)?.validate()?;
    let window = Duration::days(state.config.delivery_window_days);

    let order = checkout::create_order(&state.db, &identity, new_order, window).await?;

    Ok(to_response((StatusCode::CREATED, Json(order)), Ok(())))
}

async fn get_order(
    Path(order_id): Path<String>,
    Extension(state): Extension<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response> {
    let order = checkout::get_order(&state.db, &identity, &order_id).await?;

    Ok(to_response((StatusCode::OK, Json(order)), Ok(())))
}

async fn user_orders(
    Extension(state): Extension<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response> {
    let orders = checkout::list_orders(&state.db, &identity).await?;

    Ok(to_response((StatusCode::OK, Json(orders)), Ok(())))
}

async fn track_order(
    Path(order_id): Path<String>,
    Extension(state): Extension<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response> {
    let tracking = checkout::track_order(&state.db, &identity, &order_id).await?;

    Ok(to_response((StatusCode::OK, Json(tracking)), Ok(())))
}
