//! Trainable subject and its permanent model record.
//!
//! A subject starts `pending`, moves to `training` while a train job is
//! in flight (`pending_job_id` points at it), and becomes `ready` once
//! reconciliation materializes `model_handle` -- at which point the train
//! job row itself is deleted (terminal bookkeeping; the refund trail for
//! failures lives in the transaction log, not the job row).

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use photoloom_core::types::{DbId, Timestamp};

use super::status::CodeId;

/// A row from the `subjects` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Subject {
    pub id: DbId,
    pub user_id: DbId,
    pub name: String,
    /// `SubjectStatus` code.
    pub status: CodeId,
    /// Provider reference to the trained model; the "permanent Model
    /// record" generation requests are made against.
    pub model_handle: Option<String>,
    /// In-flight train job, if any. Cleared by reconciliation.
    pub pending_job_id: Option<DbId>,
    pub created_at: Timestamp,
    pub trained_at: Option<Timestamp>,
}

/// DTO for creating a subject.
#[derive(Debug, Deserialize)]
pub struct CreateSubject {
    pub name: String,
}

/// DTO for launching a training run: the opaque payload the provider
/// receives (upload refs, options). Forwarded unmodified.
#[derive(Debug, Deserialize)]
pub struct TrainSubject {
    pub input: serde_json::Value,
}
