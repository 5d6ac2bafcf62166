use crate::types::DbId;

/// Domain-level error shared across crates.
///
/// HTTP mapping lives in `photoloom-api`; everything below the API layer
/// returns these (or a more specific crate-local error that wraps them).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
