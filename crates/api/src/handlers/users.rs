//! User provisioning.
//!
//! Identity lives upstream; this endpoint exists so the gateway can
//! materialize the local row (and its credit account) when a new user
//! first reaches photoloom.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use photoloom_core::error::CoreError;
use photoloom_db::models::user::CreateUser;
use photoloom_db::repositories::{LedgerRepo, UserRepo};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/users
///
/// Provision a user record with a zero-balance credit account. Returns
/// 201, or 409 when the email is already taken.
pub async fn provision(
    State(state): State<AppState>,
    Json(input): Json<CreateUser>,
) -> AppResult<impl IntoResponse> {
    if !input.email.contains('@') {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Not a usable email address: {}",
            input.email
        ))));
    }

    let user = UserRepo::create(&state.pool, &input).await?;
    LedgerRepo::ensure_account(&state.pool, user.id).await?;

    tracing::info!(user_id = user.id, "User provisioned");
    Ok((StatusCode::CREATED, Json(DataResponse { data: user })))
}
