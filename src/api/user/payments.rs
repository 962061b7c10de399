use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::api::{json_body, AppState};
use crate::core::{identity::Identity, payment};
use crate::entities::order::PaymentMethod;
use crate::errors::{Error, Result};
use crate::middleware::logging::to_response;

pub fn payments_router() -> Router {
    Router::new()
        .route("/payments/create/", post(create_payment))
        .route("/payments/process/", post(process_payment))
        .route("/payments/status/:payment_id/", get(payment_status))
        .route("/payments/refund/", post(refund_payment))
}

#[derive(Deserialize, Debug)]
struct CreatePayment {
    order_id: Option<String>,
    payment_method: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ProcessPayment {
    payment_id: Option<String>,
    #[serde(default)]
    gateway_data: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct RefundPayment {
    payment_id: Option<String>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    refund_amount: Option<Decimal>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn require_payment_id(value: Option<String>) -> Result<String> {
    non_empty(value).ok_or_else(|| Error::Validation("Payment ID is required".to_owned()))
}

async fn create_payment(
    Extension(state): Extension<AppState>,
    Extension(identity): Extension<Identity>,
    payload: std::result::Result<Json<CreatePayment>, JsonRejection>,
) -> Result<Response> {
    let payload = json_body(payload)?;

    let (Some(order_id), Some(method)) = (
        non_empty(payload.order_id),
        non_empty(payload.payment_method),
    ) else {
        return Err(Error::Validation(
            "Order ID and payment method are required".to_owned(),
        ));
    };
    let method = method
        .parse::<PaymentMethod>()
        .map_err(|_| Error::Validation("Invalid payment method".to_owned()))?;

    let created = payment::create_payment(&state.db, &identity, &order_id, method).await?;

    Ok(to_response((StatusCode::CREATED, Json(created)), Ok(())))
}

async fn process_payment(
    Extension(state): Extension<AppState>,
    Extension(identity): Extension<Identity>,
    payload: std::result::Result<Json<ProcessPayment>, JsonRejection>,
) -> Result<Response> {
    let payload = json_body(payload)?;
    let payment_id = require_payment_id(payload.payment_id)?;
    let gateway_data = match payload.gateway_data {
        Some(Value::Null) | None => Value::Object(Default::default()),
        Some(data) => data,
    };

    let processed = payment::process_payment(
        &state.db,
        state.gateway.as_ref(),
        &identity,
        &payment_id,
        gateway_data,
    )
    .await?;

    Ok(to_response((StatusCode::OK, Json(processed)), Ok(())))
}

async fn payment_status(
    Path(payment_id): Path<String>,
    Extension(state): Extension<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Response> {
    let status = payment::get_status(&state.db, &identity, &payment_id).await?;

    Ok(to_response((StatusCode::OK, Json(status)), Ok(())))
}

async fn refund_payment(
    Extension(state): Extension<AppState>,
    Extension(identity): Extension<Identity>,
    payload: std::result::Result<Json<RefundPayment>, JsonRejection>,
) -> Result<Response> {
    let payload = json_body(payload)?;
    let payment_id = require_payment_id(payload.payment_id)?;

    let receipt =
        payment::refund_payment(&state.db, &identity, &payment_id, payload.refund_amount).await?;

    Ok(to_response((StatusCode::OK, Json(receipt)), Ok(())))
}
