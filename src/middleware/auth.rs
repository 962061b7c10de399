use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::{identity::Identity, ids};
use crate::entities::user;
use crate::errors::{Error, Result};

pub const SESSION_HEADER: HeaderName = HeaderName::from_static("x-session-key");

const TOKEN_LIFETIME_HOURS: i64 = 24;

#[derive(Clone)]
pub struct IdentityState {
    pub db: Arc<DatabaseConnection>,
    pub secret: Arc<str>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i32,
    pub exp: usize,
}

/// Resolves the caller once per request and stores an `Identity` in the request extensions.
///
/// A bearer token must be valid and name an existing user, otherwise the request is rejected.
/// Without one the `X-Session-Key` header identifies an anonymous session; a fresh key is
/// minted and returned in the same header when the client sent none.
pub async fn identity_middleware(
    State(state): State<IdentityState>,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let bearer = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);

    if let Some(token) = bearer {
        let claims = validate_token(token, &state.secret)?;
        if user::Entity::find_by_id(claims.user_id)
            .one(&*state.db)
            .await?
            .is_none()
        {
            warn!(user_id = claims.user_id, "Token names a missing user");
            return Err(Error::InvalidToken);
        }

        req.extensions_mut()
            .insert(Identity::AuthenticatedUser(claims.user_id));
        return Ok(next.run(req).await);
    }

    let presented = req
        .headers()
        .get(&SESSION_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_owned);

    match presented {
        Some(key) => {
            req.extensions_mut().insert(Identity::AnonymousSession(key));
            Ok(next.run(req).await)
        }
        None => {
            let key = ids::session_key();
            debug!(session_key = %key, "Minted session key");
            let header = HeaderValue::from_str(&key)
                .map_err(|err| Error::Validation(err.to_string()))?;

            req.extensions_mut().insert(Identity::AnonymousSession(key));
            let mut response = next.run(req).await;
            response.headers_mut().insert(SESSION_HEADER, header);
            Ok(response)
        }
    }
}

pub fn generate_token(user_id: i32, secret: &str) -> Result<String> {
    let exp = Utc::now()
        .checked_add_signed(Duration::hours(TOKEN_LIFETIME_HOURS))
        .ok_or_else(|| Error::TokenGeneration("expiry out of range".to_owned()))?
        .timestamp() as usize;

    let claims = Claims { user_id, exp };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| Error::TokenGeneration(err.to_string()))
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|err| {
        debug!(error = %err, "Rejected token");
        Error::InvalidToken
    })
}
