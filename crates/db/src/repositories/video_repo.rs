//! Repository for the `generated_videos` table.

use sqlx::{PgConnection, PgPool};

use photoloom_core::types::DbId;

use crate::models::video::{GeneratedVideo, NewVideo};

/// Column list for `generated_videos` queries.
const COLUMNS: &str =
    "id, user_id, subject_id, source_row_id, video_url, credits_used, created_at";

/// Provides CRUD operations for generated video clips.
pub struct VideoRepo;

impl VideoRepo {
    /// Insert a finished video, inside an existing transaction.
    pub async fn create_on(
        conn: &mut PgConnection,
        input: &NewVideo,
    ) -> Result<GeneratedVideo, sqlx::Error> {
        let query = format!(
            "INSERT INTO generated_videos \
                 (user_id, subject_id, source_row_id, video_url, credits_used) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(input.user_id)
            .bind(input.subject_id)
            .bind(input.source_row_id)
            .bind(&input.video_url)
            .bind(input.credits_used)
            .fetch_one(conn)
            .await
    }

    /// Find a video by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<GeneratedVideo>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM generated_videos WHERE id = $1");
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's videos, newest first.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<GeneratedVideo>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM generated_videos \
             WHERE user_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, GeneratedVideo>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }
}
