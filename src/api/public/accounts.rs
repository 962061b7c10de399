use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::Response,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::{json_body, AppState};
use crate::core::accounts::{self, Credentials};
use crate::errors::Result;
use crate::middleware::logging::to_response;

pub fn accounts_router() -> Router {
    Router::new()
        .route("/accounts/register/", post(register_user))
        .route("/accounts/login/", post(login))
}

async fn register_user(
    Extension(state): Extension<AppState>,
    payload: std::result::Result<Json<Credentials>, JsonRejection>,
) -> Result<Response> {
    let credentials = json_body(payload)?;
    let user = accounts::register(&state.db, credentials).await?;

    Ok(to_response(
        (
            StatusCode::CREATED,
            Json(json!({
                "message": "User registered successfully",
                "user_id": user.id
            })),
        ),
        Ok(()),
    ))
}

#[derive(Deserialize)]
struct UserLogin {
    username: String,
    password: String,
}

async fn login(
    Extension(state): Extension<AppState>,
    payload: std::result::Result<Json<UserLogin>, JsonRejection>,
) -> Result<Response> {
    let payload = json_body(payload)?;
    let token = accounts::login(
        &state.db,
        &state.config.secret,
        &payload.username,
        &payload.password,
    )
    .await?;

    Ok(to_response(
        (StatusCode::OK, Json(json!({ "token": token }))),
        Ok(()),
    ))
}
