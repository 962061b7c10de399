pub mod accounts;

use axum::Router;

use accounts::accounts_router;

pub fn public_api_router() -> Router {
    Router::new().merge(accounts_router())
}
