//! Job entity: one unit of external asynchronous compute work.
//!
//! The orchestrator is the only writer of `state`. `payload` carries the
//! opaque provider payload plus the bookkeeping references reconciliation
//! needs (it must be sufficient to resume the job from `external_handle`
//! in a fresh process). `result` holds the artifact refs once succeeded.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use photoloom_core::types::{Credits, DbId, Timestamp};

use super::status::CodeId;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub user_id: DbId,
    /// `JobKind` code.
    pub kind: CodeId,
    /// `JobState` code.
    pub state: CodeId,
    /// Provider-assigned handle; set once submission succeeds and never
    /// changed afterwards. The resumable poll is keyed on this.
    pub external_handle: Option<String>,
    /// Credits debited when the job was authorized; the exact amount a
    /// failure refunds.
    pub credits_reserved: Credits,
    pub payload: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub submitted_at: Option<Timestamp>,
    pub terminal_at: Option<Timestamp>,
}

/// Fields for inserting a new job row in `created` state.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: DbId,
    pub kind: CodeId,
    pub credits_reserved: Credits,
    pub payload: serde_json::Value,
}

/// Query parameters for the job listing endpoint.
#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    /// Optional `JobState` code filter.
    pub state: Option<CodeId>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
