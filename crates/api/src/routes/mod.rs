pub mod batches;
pub mod credits;
pub mod health;
pub mod jobs;
pub mod subjects;
pub mod users;
pub mod videos;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /users                                    provision user (POST)
///
/// /credits/purchase                         purchase credits (POST)
/// /credits/balance                          current balance (GET)
/// /credits/transactions                     ledger history (GET)
///
/// /subjects                                 list, create
/// /subjects/{id}                            get
/// /subjects/{id}/train                      launch training (POST)
///
/// /batches                                  list, create
/// /batches/{id}                             batch + rows + entitlements (GET)
/// /batches/{id}/rows/{index}/remake         remake row (POST)
/// /batches/{id}/rows/{index}/upscale        upscale row (POST)
///
/// /videos                                   list, create
/// /videos/{id}                              get
///
/// /jobs                                     list (?state=&limit=&offset=)
/// /jobs/{id}                                get
/// /jobs/{id}/check                          re-attach poll (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/users", users::router())
        .nest("/credits", credits::router())
        .nest("/subjects", subjects::router())
        .nest("/batches", batches::router())
        .nest("/videos", videos::router())
        .nest("/jobs", jobs::router())
}
