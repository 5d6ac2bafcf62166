use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use photoloom_core::error::CoreError;
use photoloom_db::repositories::LedgerError;
use photoloom_orchestrator::OrchestratorError;

/// Application-level error type for HTTP handlers.
///
/// Wraps the domain errors from the lower crates and implements
/// [`IntoResponse`] to produce consistent JSON error bodies of the shape
/// `{ "error": <message>, "code": <CODE> }`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// An error from a job operation.
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),

    /// A domain-level error from `photoloom_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A ledger error from a direct credit operation.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A database error from a repository read.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The request carried no usable identity.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Orchestrator(err) => classify_orchestrator_error(err),

            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
                CoreError::Internal(msg) => internal(msg),
            },

            AppError::Ledger(err) => match err {
                LedgerError::InvalidAmount { .. } => (
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    err.to_string(),
                ),
                LedgerError::InsufficientCredits { .. } => (
                    StatusCode::PAYMENT_REQUIRED,
                    "INSUFFICIENT_CREDITS",
                    err.to_string(),
                ),
                LedgerError::Db(db) => classify_sqlx_error(db),
            },

            AppError::Database(err) => classify_sqlx_error(err),

            AppError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Map a job-operation error to an HTTP status, error code, and message.
///
/// - Insufficient credits maps to 402.
/// - Submission and remote failures map to 502: by the time either is
///   returned the job is already failed and refunded, and the body says
///   why the provider let the caller down.
fn classify_orchestrator_error(err: &OrchestratorError) -> (StatusCode, &'static str, String) {
    match err {
        OrchestratorError::InsufficientCredits { .. } => (
            StatusCode::PAYMENT_REQUIRED,
            "INSUFFICIENT_CREDITS",
            err.to_string(),
        ),
        OrchestratorError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        OrchestratorError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
        }
        OrchestratorError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        OrchestratorError::Submission(_) => {
            (StatusCode::BAD_GATEWAY, "SUBMISSION_FAILED", err.to_string())
        }
        OrchestratorError::Remote(_) => (StatusCode::BAD_GATEWAY, "JOB_FAILED", err.to_string()),
        OrchestratorError::Database(db) => classify_sqlx_error(db),
        OrchestratorError::Internal(msg) => internal(msg),
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                return (
                    StatusCode::CONFLICT,
                    "CONFLICT",
                    format!("Duplicate value violates unique constraint: {constraint}"),
                );
            }
            tracing::error!(error = %db_err, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}

fn internal(msg: &str) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %msg, "Internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_credits_maps_to_402() {
        let err = AppError::from(OrchestratorError::InsufficientCredits {
            required: 5,
            available: 3,
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = AppError::from(OrchestratorError::Conflict("already training".into()));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn not_found_maps_to_404() {
        let err = AppError::from(OrchestratorError::NotFound {
            entity: "subject",
            id: 7,
        });
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn validation_maps_to_400() {
        let err = AppError::from(OrchestratorError::Validation("rows out of range".into()));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn remote_failures_map_to_502() {
        let submission = AppError::from(OrchestratorError::Submission("400 bad input".into()));
        assert_eq!(submission.into_response().status(), StatusCode::BAD_GATEWAY);

        let remote = AppError::from(OrchestratorError::Remote("worker crashed".into()));
        assert_eq!(remote.into_response().status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn internal_details_never_leak() {
        let err = AppError::from(OrchestratorError::Internal(
            "poll returned a non-terminal status".into(),
        ));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn invalid_purchase_amount_maps_to_400() {
        let err = AppError::from(LedgerError::InvalidAmount { amount: -5 });
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_identity_maps_to_401() {
        let err = AppError::Unauthorized("Missing x-photoloom-user header".into());
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
