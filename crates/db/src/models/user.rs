//! Minimal user identity row.
//!
//! Authentication and session management live upstream; this table exists
//! only as the foreign-key target for accounts, jobs, and artifacts, plus
//! the email address the notifier delivers to.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use photoloom_core::types::{DbId, Timestamp};

/// A row from the `users` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub email: String,
    pub created_at: Timestamp,
}

/// DTO for provisioning a user record.
#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub email: String,
}
