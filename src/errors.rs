use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::DbErr;
use serde_json::json;
use thiserror::Error;

use crate::middleware::logging::to_response;

#[derive(Clone, Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("{0}")]
    NotFound(String),

    #[error("Payment already exists for this order")]
    DuplicatePayment,

    #[error("{0}")]
    InvalidState(String),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Failed to hash password: {0}")]
    PasswordHash(String),

    #[error("Failed to generate token: {0}")]
    TokenGeneration(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::EmptyCart
            | Self::DuplicatePayment
            | Self::InvalidState(_) => StatusCode::BAD_REQUEST,
            Self::AuthenticationRequired | Self::InvalidCredentials | Self::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_)
            | Self::PasswordHash(_)
            | Self::TokenGeneration(_)
            | Self::Config(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Server-side failures are never echoed back.
    fn public_message(&self) -> String {
        if self.status_code().is_server_error() {
            "Internal server error".to_owned()
        } else {
            self.to_string()
        }
    }
}

impl From<DbErr> for Error {
    fn from(value: DbErr) -> Self {
        Error::Database(value.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let body = (
            self.status_code(),
            Json(json!({
                "error": self.public_message()
            })),
        );

        to_response(body, Err(self))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
