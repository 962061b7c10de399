use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::{json_body, AppState};
use crate::core::{cart, identity::Identity};
use crate::errors::{Error, Result};
use crate::middleware::logging::to_response;

pub fn cart_router() -> Router {
    Router::new()
        .route("/cart/", get(get_cart))
        .route("/cart/add/", post(add_product))
        .route("/cart/update/:item_id/", put(update_entry))
        .route("/cart/remove/:item_id/", delete(remove_product))
        .route("/cart/clear/", delete(clear_cart))
}

#[derive(Deserialize, Debug)]
struct AddProduct {
    product_id: Option<i32>,
    quantity: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct UpdateEntry {
    quantity: Option<Value>,
}

/// Accepts a JSON integer or a numeric string.
fn parse_quantity(value: &Value) -> Result<i64> {
    let parsed = match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| Error::Validation("Invalid quantity".to_owned()))
}

fn to_u32(quantity: i64) -> Result<u32> {
    u32::try_from(quantity).map_err(|_| Error::Validation("Invalid quantity".to_owned()))
}

async fn get_cart(
    Extension(state): Extension<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response> {
    let summary = cart::cart_summary(&state.db, &identity).await?;

    Ok(to_response((StatusCode::OK, Json(summary)), Ok(())))
}

async fn add_product(
    Extension(state): Extension<AppState>,
    Extension(identity): Extension<Identity>,
    payload: std::result::Result<Json<AddProduct>, JsonRejection>,
) -> Result<Response> {
    let payload = json_body(payload)?;

    let product_id = payload
        .product_id
        .filter(|id| *id != 0)
        .ok_or_else(|| Error::Validation("Product ID is required".to_owned()))?;

    let quantity = match &payload.quantity {
        Some(value) => parse_quantity(value)?,
        None => 1,
    };
    if quantity <= 0 {
        return Err(Error::Validation("Quantity must be positive".to_owned()));
    }

    let line = cart::add_item(&state.db, &identity, product_id, to_u32(quantity)?).await?;

    Ok(to_response((StatusCode::CREATED, Json(line)), Ok(())))
}

async fn update_entry(
    Path(item_id): Path<i32>,
    Extension(state): Extension<AppState>,
    Extension(identity): Extension<Identity>,
    payload: std::result::Result<Json<UpdateEntry>, JsonRejection>,
) -> Result<Response> {
    let payload = json_body(payload)?;

    let quantity = payload
        .quantity
        .as_ref()
        .ok_or_else(|| Error::Validation("Quantity is required".to_owned()))
        .and_then(parse_quantity)?;
    if quantity < 0 {
        return Err(Error::Validation("Quantity cannot be negative".to_owned()));
    }

    let response = match cart::update_item(&state.db, &identity, item_id, to_u32(quantity)?).await? {
        Some(line) => to_response((StatusCode::OK, Json(line)), Ok(())),
        None => to_response(
            (
                StatusCode::OK,
                Json(json!({
                    "message": "Item removed from cart"
                })),
            ),
            Ok(()),
        ),
    };

    Ok(response)
}

async fn remove_product(
    Path(item_id): Path<i32>,
    Extension(state): Extension<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response> {
    cart::remove_item(&state.db, &identity, item_id).await?;

    Ok(to_response(
        (
            StatusCode::OK,
            Json(json!({
                "message": "Item removed from cart"
            })),
        ),
        Ok(()),
    ))
}

async fn clear_cart(
    Extension(state): Extension<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response> {
    cart::clear(&state.db, &identity).await?;

    Ok(to_response(
        (
            StatusCode::OK,
            Json(json!({
                "message": "Cart cleared"
            })),
        ),
        Ok(()),
    ))
}
