//! Generated video clip model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use photoloom_core::types::{Credits, DbId, Timestamp};

/// A row from the `generated_videos` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct GeneratedVideo {
    pub id: DbId,
    pub user_id: DbId,
    pub subject_id: DbId,
    /// Batch row the clip was animated from, when applicable.
    pub source_row_id: Option<DbId>,
    pub video_url: String,
    pub credits_used: Credits,
    pub created_at: Timestamp,
}

/// Fields for persisting a successfully generated video.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub user_id: DbId,
    pub subject_id: DbId,
    pub source_row_id: Option<DbId>,
    pub video_url: String,
    pub credits_used: Credits,
}

/// DTO for the generate-video endpoint.
#[derive(Debug, Deserialize)]
pub struct GenerateVideoRequest {
    pub subject_id: DbId,
    /// Row to animate; optional because a video can also be prompted
    /// directly against the subject model.
    pub source_row_id: Option<DbId>,
    /// Opaque provider payload (motion prompt, duration, ...).
    pub input: serde_json::Value,
}
