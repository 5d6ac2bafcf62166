//! Repository for the `jobs` table.
//!
//! Uses the `JobState` enum from `models::status` for all state
//! transitions; every guard is expressed against a named code, never a
//! magic number. State transitions are guarded `UPDATE ... WHERE state = X`
//! so a lost race shows up as zero rows affected rather than a silent
//! overwrite.
//!
//! The `*_on` variants run against a caller-supplied connection so a job
//! transition can be composed with ledger and artifact writes in one
//! database transaction (see `store`).

use sqlx::{PgConnection, PgPool};

use photoloom_core::types::{DbId, Timestamp};

use crate::models::job::{Job, JobListQuery, NewJob};
use crate::models::status::JobState;

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, user_id, kind, state, external_handle, credits_reserved, \
    payload, result, error, created_at, submitted_at, terminal_at";

/// Maximum page size for job listing.
const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides CRUD operations for compute jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job row in `created` state, inside an existing
    /// transaction (authorization pairs this with the ledger debit).
    pub async fn create_on(conn: &mut PgConnection, input: &NewJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (user_id, kind, state, credits_reserved, payload) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.user_id)
            .bind(input.kind)
            .bind(JobState::Created.id())
            .bind(input.credits_reserved)
            .bind(&input.payload)
            .fetch_one(conn)
            .await
    }

    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a job and lock its row for the rest of the transaction.
    ///
    /// Every terminal transition goes through this lock, which is what
    /// makes fail-and-refund exactly-once under concurrent observers.
    pub async fn find_for_update_on(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Record a successful submission: set the provider handle and move
    /// `created -> submitted`.
    ///
    /// Returns `None` when the job was not in `created` state (already
    /// submitted, or failed by the sweeper in the meantime).
    pub async fn mark_submitted(
        pool: &PgPool,
        job_id: DbId,
        external_handle: &str,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs \
             SET state = $2, external_handle = $3, submitted_at = NOW() \
             WHERE id = $1 AND state = $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(job_id)
            .bind(JobState::Submitted.id())
            .bind(external_handle)
            .bind(JobState::Created.id())
            .fetch_optional(pool)
            .await
    }

    /// Record the first observed poll: move `submitted -> polling`.
    /// A no-op when the job has already moved on.
    pub async fn mark_polling(pool: &PgPool, job_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET state = $2 WHERE id = $1 AND state = $3")
            .bind(job_id)
            .bind(JobState::Polling.id())
            .bind(JobState::Submitted.id())
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Mark a job as succeeded with its result payload, inside an existing
    /// transaction. The caller must hold the row lock.
    pub async fn mark_succeeded_on(
        conn: &mut PgConnection,
        job_id: DbId,
        result: &serde_json::Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE jobs SET state = $2, result = $3, terminal_at = NOW() WHERE id = $1",
        )
        .bind(job_id)
        .bind(JobState::Succeeded.id())
        .bind(result)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Mark a job as failed with an error message, inside an existing
    /// transaction. The caller must hold the row lock.
    pub async fn mark_failed_on(
        conn: &mut PgConnection,
        job_id: DbId,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE jobs SET state = $2, error = $3, terminal_at = NOW() WHERE id = $1")
            .bind(job_id)
            .bind(JobState::Failed.id())
            .bind(error)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Delete a job row, inside an existing transaction. Training success
    /// uses this once the subject carries the model handle.
    pub async fn delete_on(conn: &mut PgConnection, job_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(job_id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// List jobs for a user with optional state filter, newest first.
    pub async fn list_by_user(
        pool: &PgPool,
        user_id: DbId,
        params: &JobListQuery,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);
        match params.state {
            Some(state) => {
                let query = format!(
                    "SELECT {COLUMNS} FROM jobs \
                     WHERE user_id = $1 AND state = $2 \
                     ORDER BY created_at DESC LIMIT $3 OFFSET $4"
                );
                sqlx::query_as::<_, Job>(&query)
                    .bind(user_id)
                    .bind(state)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
            }
            None => {
                let query = format!(
                    "SELECT {COLUMNS} FROM jobs \
                     WHERE user_id = $1 \
                     ORDER BY created_at DESC LIMIT $2 OFFSET $3"
                );
                sqlx::query_as::<_, Job>(&query)
                    .bind(user_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(pool)
                    .await
            }
        }
    }

    /// In-flight jobs (submitted or polling) last touched before the
    /// cutoff. The sweeper resumes these after a crash or caller timeout.
    pub async fn list_resumable(
        pool: &PgPool,
        stale_before: Timestamp,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE state IN ($1, $2) AND COALESCE(submitted_at, created_at) < $3 \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobState::Submitted.id())
            .bind(JobState::Polling.id())
            .bind(stale_before)
            .fetch_all(pool)
            .await
    }

    /// Jobs still in `created` state past the cutoff: authorized but never
    /// submitted (a crash between debit and submission). The sweeper fails
    /// and refunds these -- there is no provider handle to resume from.
    pub async fn list_stale_unsubmitted(
        pool: &PgPool,
        stale_before: Timestamp,
    ) -> Result<Vec<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE state = $1 AND created_at < $2 \
             ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(JobState::Created.id())
            .bind(stale_before)
            .fetch_all(pool)
            .await
    }
}
