pub mod cart;
pub mod checkout;
pub mod payments;

use axum::{middleware::from_fn_with_state, Router};

use crate::api::AppState;
use crate::middleware::auth::{identity_middleware, IdentityState};
use cart::cart_router;
use checkout::checkout_router;
use payments::payments_router;

/// Routes that act on behalf of a caller. Each request carries an `Identity` extension.
pub fn user_api_router(state: &AppState) -> Router {
    Router::new()
        .merge(cart_router())
        .merge(checkout_router())
        .merge(payments_router())
        .layer(from_fn_with_state(
            IdentityState {
                db: state.db.clone(),
                secret: state.config.secret.as_str().into(),
            },
            identity_middleware,
        ))
}
