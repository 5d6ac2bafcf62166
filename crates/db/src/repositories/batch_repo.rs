//! Repository for `generation_batches` and `batch_rows`.
//!
//! A batch and its rows are always inserted together; readers never see a
//! batch with a partial row set. The entitlement flags (`remake_used`,
//! `upscale_used`) are only ever flipped by the compare-and-set updates
//! below, whose `WHERE` guards are the whole concurrency story: a lost
//! race is zero rows affected, not a double grant.

use sqlx::{PgConnection, PgPool};

use photoloom_core::types::DbId;

use crate::models::batch::{BatchRow, GenerationBatch, NewBatch};

/// Column list for `generation_batches` queries.
const BATCH_COLUMNS: &str = "\
    id, user_id, subject_id, aspect_ratio, credits_used, \
    remake_used, upscale_used, created_at";

/// Column list for `batch_rows` queries.
const ROW_COLUMNS: &str =
    "id, batch_id, row_index, prompt, image_urls, upscaled_urls, created_at";

/// Provides CRUD and entitlement operations for generation batches.
pub struct BatchRepo;

impl BatchRepo {
    /// Insert a batch and all of its rows, inside an existing transaction.
    /// Row indexes follow the input order, starting at zero.
    pub async fn create_on(
        conn: &mut PgConnection,
        input: &NewBatch,
    ) -> Result<GenerationBatch, sqlx::Error> {
        let query = format!(
            "INSERT INTO generation_batches (user_id, subject_id, aspect_ratio, credits_used) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {BATCH_COLUMNS}"
        );
        let batch = sqlx::query_as::<_, GenerationBatch>(&query)
            .bind(input.user_id)
            .bind(input.subject_id)
            .bind(&input.aspect_ratio)
            .bind(input.credits_used)
            .fetch_one(&mut *conn)
            .await?;

        for (index, row) in input.rows.iter().enumerate() {
            sqlx::query(
                "INSERT INTO batch_rows (batch_id, row_index, prompt, image_urls) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(batch.id)
            .bind(index as i32)
            .bind(&row.prompt)
            .bind(&row.image_urls)
            .execute(&mut *conn)
            .await?;
        }

        Ok(batch)
    }

    /// Find a batch by its ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<GenerationBatch>, sqlx::Error> {
        let query = format!("SELECT {BATCH_COLUMNS} FROM generation_batches WHERE id = $1");
        sqlx::query_as::<_, GenerationBatch>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's batches, newest first.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Vec<GenerationBatch>, sqlx::Error> {
        let query = format!(
            "SELECT {BATCH_COLUMNS} FROM generation_batches \
             WHERE user_id = $1 ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, GenerationBatch>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// All rows of a batch in row-index order.
    pub async fn rows(pool: &PgPool, batch_id: DbId) -> Result<Vec<BatchRow>, sqlx::Error> {
        let query = format!(
            "SELECT {ROW_COLUMNS} FROM batch_rows WHERE batch_id = $1 ORDER BY row_index ASC"
        );
        sqlx::query_as::<_, BatchRow>(&query)
            .bind(batch_id)
            .fetch_all(pool)
            .await
    }

    /// Find one row of a batch by its index within the batch.
    pub async fn find_row(
        pool: &PgPool,
        batch_id: DbId,
        row_index: i32,
    ) -> Result<Option<BatchRow>, sqlx::Error> {
        let query = format!(
            "SELECT {ROW_COLUMNS} FROM batch_rows WHERE batch_id = $1 AND row_index = $2"
        );
        sqlx::query_as::<_, BatchRow>(&query)
            .bind(batch_id)
            .bind(row_index)
            .fetch_optional(pool)
            .await
    }

    /// Find a row by its own ID.
    pub async fn find_row_by_id(
        pool: &PgPool,
        row_id: DbId,
    ) -> Result<Option<BatchRow>, sqlx::Error> {
        let query = format!("SELECT {ROW_COLUMNS} FROM batch_rows WHERE id = $1");
        sqlx::query_as::<_, BatchRow>(&query)
            .bind(row_id)
            .fetch_optional(pool)
            .await
    }

    /// Replace a row's images with freshly remade ones, inside an existing
    /// transaction.
    pub async fn replace_row_images_on(
        conn: &mut PgConnection,
        row_id: DbId,
        image_urls: &[String],
    ) -> Result<Option<BatchRow>, sqlx::Error> {
        let query = format!(
            "UPDATE batch_rows SET image_urls = $2 WHERE id = $1 RETURNING {ROW_COLUMNS}"
        );
        sqlx::query_as::<_, BatchRow>(&query)
            .bind(row_id)
            .bind(image_urls)
            .fetch_optional(conn)
            .await
    }

    /// Store a row's upscaled outputs, inside an existing transaction.
    pub async fn set_row_upscaled_on(
        conn: &mut PgConnection,
        row_id: DbId,
        upscaled_urls: &[String],
    ) -> Result<Option<BatchRow>, sqlx::Error> {
        let query = format!(
            "UPDATE batch_rows SET upscaled_urls = $2 WHERE id = $1 RETURNING {ROW_COLUMNS}"
        );
        sqlx::query_as::<_, BatchRow>(&query)
            .bind(row_id)
            .bind(upscaled_urls)
            .fetch_optional(conn)
            .await
    }

    // ---- entitlement compare-and-set ----

    /// Consume the per-batch remake, inside an existing transaction.
    ///
    /// Succeeds only while BOTH flags are still clear: once any upscale
    /// has happened the remake is permanently foreclosed, and a remake
    /// can happen at most once. Returns `false` when the race (or the
    /// foreclosure) was lost -- nothing is written in that case.
    pub async fn apply_remake_on(
        conn: &mut PgConnection,
        batch_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_batches SET remake_used = TRUE \
             WHERE id = $1 AND remake_used = FALSE AND upscale_used = FALSE",
        )
        .bind(batch_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Claim the one free upscale for a batch.
    ///
    /// Returns `true` for exactly one caller per batch; everyone after
    /// that pays. The flag is claimed up front and never restored, even
    /// when the upscale job later fails: it doubles as the permanent
    /// remake foreclosure.
    pub async fn try_consume_free_upscale(
        pool: &PgPool,
        batch_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE generation_batches SET upscale_used = TRUE \
             WHERE id = $1 AND upscale_used = FALSE",
        )
        .bind(batch_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
