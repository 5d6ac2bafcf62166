//! Identity extractor for Axum handlers.
//!
//! Authentication happens upstream: the gateway terminates the session
//! and forwards the caller's user id in the `x-photoloom-user` header.
//! This service trusts that header and must never be exposed without the
//! gateway in front of it.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use photoloom_core::types::DbId;

use crate::error::AppError;
use crate::state::AppState;

/// Name of the gateway-injected identity header.
pub const USER_HEADER: &str = "x-photoloom-user";

/// Authenticated user extracted from the `x-photoloom-user` header.
///
/// Use as an extractor parameter in any handler that requires identity:
///
/// ```ignore
/// async fn my_handler(auth: AuthUser) -> AppResult<Json<()>> {
///     tracing::info!(user_id = auth.user_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    /// The caller's internal database id.
    pub user_id: DbId,
}

/// Parse the identity header value into a user id.
pub fn parse_user_header(value: Option<&str>) -> Result<DbId, AppError> {
    let value = value.ok_or_else(|| {
        AppError::Unauthorized(format!("Missing {USER_HEADER} header"))
    })?;
    value.trim().parse::<DbId>().map_err(|_| {
        AppError::Unauthorized(format!("Invalid {USER_HEADER} header: expected a numeric id"))
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok());
        let user_id = parse_user_header(value)?;
        Ok(AuthUser { user_id })
    }
}
