//! Route definitions for the `/batches` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::batches;
use crate::state::AppState;

/// Routes mounted at `/batches`.
///
/// ```text
/// GET    /                              -> list_batches
/// POST   /                              -> create_batch
/// GET    /{id}                          -> get_batch
/// POST   /{id}/rows/{index}/remake      -> remake_row
/// POST   /{id}/rows/{index}/upscale     -> upscale_row
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(batches::list_batches).post(batches::create_batch))
        .route("/{id}", get(batches::get_batch))
        .route("/{id}/rows/{index}/remake", post(batches::remake_row))
        .route("/{id}/rows/{index}/upscale", post(batches::upscale_row))
}
