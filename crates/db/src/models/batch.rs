//! Generation batch and row models.
//!
//! A batch is created atomically with all of its rows once generation
//! succeeds -- there is never a half-persisted batch. Rows are mutated in
//! place afterwards: a remake replaces `image_urls`, an upscale fills
//! `upscaled_urls`. The two entitlement flags are only ever written by
//! the compare-and-set store operations.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use photoloom_core::entitlement::EntitlementState;
use photoloom_core::types::{Credits, DbId, Timestamp};

/// Images rendered per row (all sharing one prompt).
pub const IMAGES_PER_ROW: usize = 4;

/// A row from the `generation_batches` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GenerationBatch {
    pub id: DbId,
    pub user_id: DbId,
    pub subject_id: DbId,
    pub aspect_ratio: String,
    pub credits_used: Credits,
    pub remake_used: bool,
    pub upscale_used: bool,
    pub created_at: Timestamp,
}

impl GenerationBatch {
    /// Entitlement state derived from the two persisted flags.
    pub fn entitlements(&self) -> EntitlementState {
        EntitlementState::from_flags(self.remake_used, self.upscale_used)
    }
}

/// A row from the `batch_rows` table: four images sharing one prompt.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BatchRow {
    pub id: DbId,
    pub batch_id: DbId,
    pub row_index: i32,
    pub prompt: String,
    pub image_urls: Vec<String>,
    pub upscaled_urls: Option<Vec<String>>,
    pub created_at: Timestamp,
}

/// One rendered row waiting to be persisted with its batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBatchRow {
    pub prompt: String,
    pub image_urls: Vec<String>,
}

/// Everything needed to persist a successful generation atomically.
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub user_id: DbId,
    pub subject_id: DbId,
    pub aspect_ratio: String,
    pub credits_used: Credits,
    pub rows: Vec<NewBatchRow>,
}

/// DTO for the generate-batch endpoint. Shape limits are checked by
/// [`photoloom_core::plan::validate_batch_shape`] before any credits move.
#[derive(Debug, Deserialize)]
pub struct GenerateBatchRequest {
    pub subject_id: DbId,
    /// Ordered scene prompts distributed across the rows by the planner.
    pub scenes: Vec<String>,
    pub rows: u32,
    pub aspect_ratio: Option<String>,
}
