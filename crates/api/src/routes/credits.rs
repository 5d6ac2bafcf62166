//! Route definitions for the `/credits` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::credits;
use crate::state::AppState;

/// Routes mounted at `/credits`.
///
/// ```text
/// POST   /purchase        -> purchase
/// GET    /balance         -> balance
/// GET    /transactions    -> transactions
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/purchase", post(credits::purchase))
        .route("/balance", get(credits::balance))
        .route("/transactions", get(credits::transactions))
}
