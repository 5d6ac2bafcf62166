//! Repository for the `subjects` table.

use sqlx::{PgConnection, PgPool};

use photoloom_core::types::DbId;

use crate::models::status::SubjectStatus;
use crate::models::subject::{CreateSubject, Subject};

/// Column list for `subjects` queries.
const COLUMNS: &str =
    "id, user_id, name, status, model_handle, pending_job_id, created_at, trained_at";

/// Provides CRUD operations for trainable subjects.
pub struct SubjectRepo;

impl SubjectRepo {
    /// Insert a new subject in `pending` status.
    pub async fn create(
        pool: &PgPool,
        user_id: DbId,
        input: &CreateSubject,
    ) -> Result<Subject, sqlx::Error> {
        let query = format!(
            "INSERT INTO subjects (user_id, name, status) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Subject>(&query)
            .bind(user_id)
            .bind(&input.name)
            .bind(SubjectStatus::Pending.id())
            .fetch_one(pool)
            .await
    }

    /// Find a subject by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Subject>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM subjects WHERE id = $1");
        sqlx::query_as::<_, Subject>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's subjects, newest first.
    pub async fn list_by_user(pool: &PgPool, user_id: DbId) -> Result<Vec<Subject>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM subjects WHERE user_id = $1 ORDER BY created_at DESC");
        sqlx::query_as::<_, Subject>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Move a subject into `training` and point it at the train job,
    /// inside an existing transaction.
    ///
    /// Guarded so only `pending` or `failed` subjects can start training;
    /// returns `false` when the subject was in any other status (already
    /// training, or already trained).
    pub async fn begin_training_on(
        conn: &mut PgConnection,
        subject_id: DbId,
        job_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE subjects SET status = $2, pending_job_id = $3 \
             WHERE id = $1 AND status IN ($4, $5)",
        )
        .bind(subject_id)
        .bind(SubjectStatus::Training.id())
        .bind(job_id)
        .bind(SubjectStatus::Pending.id())
        .bind(SubjectStatus::Failed.id())
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Materialize a finished training run: store the permanent model
    /// handle, move to `ready`, and detach the train job. Runs inside an
    /// existing transaction together with the job-row delete.
    pub async fn complete_training_on(
        conn: &mut PgConnection,
        subject_id: DbId,
        model_handle: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE subjects \
             SET status = $2, model_handle = $3, trained_at = NOW(), pending_job_id = NULL \
             WHERE id = $1",
        )
        .bind(subject_id)
        .bind(SubjectStatus::Ready.id())
        .bind(model_handle)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Record a failed training run: move to `failed` and detach the train
    /// job so the user can retrain. Keyed by the job so the generic
    /// fail-and-refund path needs no payload knowledge; a no-op when no
    /// subject points at the job.
    pub async fn fail_training_by_job_on(
        conn: &mut PgConnection,
        job_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE subjects SET status = $2, pending_job_id = NULL \
             WHERE pending_job_id = $1 AND status = $3",
        )
        .bind(job_id)
        .bind(SubjectStatus::Failed.id())
        .bind(SubjectStatus::Training.id())
        .execute(conn)
        .await?;
        Ok(())
    }
}
