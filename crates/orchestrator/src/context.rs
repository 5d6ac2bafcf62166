//! Durable per-job context.
//!
//! The context is serialized into `jobs.payload` inside the authorizing
//! transaction. After a crash it is the only record of what a job was
//! doing: resume paths deserialize it, poll the provider through
//! `external_handle`, and reconcile from the fields stored here. Nothing
//! a resumed process needs may live only in memory.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use photoloom_core::types::DbId;

/// Context persisted with every job row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobContext {
    /// Idempotency key fixed at authorization. A retried submission
    /// after a crash reuses it, so the provider sees one logical job.
    pub idempotency_key: String,
    #[serde(flatten)]
    pub op: JobOp,
}

/// Kind-specific parameters, tagged so a resumed process can tell what
/// it is finishing without consulting anything but the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JobOp {
    Train {
        subject_id: DbId,
        /// Opaque provider payload (upload refs, options).
        input: serde_json::Value,
    },
    Batch {
        subject_id: DbId,
        model_handle: String,
        /// Scene prompts in request order; the planner assigns one per row.
        scenes: Vec<String>,
        rows: u32,
        aspect_ratio: String,
    },
    /// Free post-training batch with stock scenes.
    Sample {
        subject_id: DbId,
        model_handle: String,
    },
    Video {
        subject_id: DbId,
        source_row_id: Option<DbId>,
        /// Provider-ready payload assembled at authorization (model
        /// handle, source images, caller options).
        input: serde_json::Value,
    },
    Remake {
        batch_id: DbId,
        row_id: DbId,
        model_handle: String,
        prompt: String,
        aspect_ratio: String,
    },
    Upscale {
        batch_id: DbId,
        row_id: DbId,
        /// Source images at submission time.
        image_urls: Vec<String>,
    },
}

impl JobContext {
    pub fn new(op: JobOp) -> Self {
        Self {
            idempotency_key: Uuid::new_v4().to_string(),
            op,
        }
    }
}
