pub mod public;
pub mod user;

use axum::{extract::rejection::JsonRejection, middleware::from_fn, Extension, Json, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::core::gateway::PaymentGateway;
use crate::errors::{Error, Result};
use crate::middleware::logging::logging_middleware;

use public::public_api_router;
use user::user_api_router;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub config: Arc<AppConfig>,
}

pub fn create_api_router(state: AppState) -> Router {
    let api = public_api_router().merge(user_api_router(&state));

    Router::new()
        .nest("/api", api)
        .layer(Extension(state))
        .layer(from_fn(logging_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Unwraps a JSON body, reporting a malformed one through the usual error shape.
pub(crate) fn json_body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| Error::Validation(rejection.body_text()))
}
