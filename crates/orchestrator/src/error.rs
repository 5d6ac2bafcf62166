use photoloom_core::error::CoreError;
use photoloom_core::types::{Credits, DbId};
use photoloom_db::store::StoreError;
use thiserror::Error;

/// Errors surfaced by orchestrator operations.
///
/// `Submission` and `Remote` mean the job itself is over: the row is
/// marked failed and any reservation has been refunded before the error
/// is returned. `Database` means the local write failed and the job row
/// was left untouched for a later check or sweep to finish.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: Credits, available: Credits },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    /// The provider rejected the submission outright.
    #[error("submission failed: {0}")]
    Submission(String),

    /// The provider reported the job failed, or returned a result the
    /// reconciler could not use.
    #[error("job failed remotely: {0}")]
    Remote(String),

    #[error(transparent)]
    Database(sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for OrchestratorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientCredits {
                required,
                available,
            } => Self::InsufficientCredits {
                required,
                available,
            },
            StoreError::InvalidAmount { amount } => {
                Self::Validation(format!("Credit amount must be positive, got {amount}"))
            }
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Conflict(message) => Self::Conflict(message),
            StoreError::Db(err) => Self::Database(err),
        }
    }
}

impl From<CoreError> for OrchestratorError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            CoreError::Validation(message) => Self::Validation(message),
            CoreError::Conflict(message) => Self::Conflict(message),
            CoreError::Forbidden(message) => Self::Conflict(message),
            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}
