//! Route definitions for the `/subjects` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::subjects;
use crate::state::AppState;

/// Routes mounted at `/subjects`.
///
/// ```text
/// GET    /                -> list_subjects
/// POST   /                -> create_subject
/// GET    /{id}            -> get_subject
/// POST   /{id}/train      -> train_subject
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(subjects::list_subjects).post(subjects::create_subject))
        .route("/{id}", get(subjects::get_subject))
        .route("/{id}/train", post(subjects::train_subject))
}
