//! The persistence seam the orchestrator drives jobs through.
//!
//! [`Store`] collects every multi-table mutation of the job lifecycle
//! behind one trait so the orchestrator can be exercised against an
//! in-memory implementation in tests. Each method is atomic: either all
//! of its writes commit or none do. [`PgStore`] is the production
//! implementation, composing the repositories' `*_on` primitives into
//! single Postgres transactions.
//!
//! The atomicity pairings that matter:
//! - authorization debits the ledger and creates the job row together,
//! - fail-and-refund flips the job terminal and refunds together, under
//!   the job row lock, so the refund happens exactly once,
//! - completion persists artifacts and flips the job terminal together,
//!   so no reader ever sees a succeeded job without its outputs.

use async_trait::async_trait;
use sqlx::PgPool;

use photoloom_core::types::{Credits, DbId, Timestamp};

use crate::models::batch::{BatchRow, GenerationBatch, NewBatch};
use crate::models::credit::CreditTransaction;
use crate::models::job::{Job, NewJob};
use crate::models::status::{JobKind, JobState, TransactionKind};
use crate::models::subject::Subject;
use crate::models::video::{GeneratedVideo, NewVideo};
use crate::repositories::{
    BatchRepo, JobRepo, LedgerError, LedgerRepo, SubjectRepo, VideoRepo,
};

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

/// Errors produced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A debit could not be covered. Nothing was written.
    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits {
        required: Credits,
        available: Credits,
    },

    /// A ledger amount that is not positive.
    #[error("ledger amount must be positive, got {amount}")]
    InvalidAmount { amount: Credits },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    /// The operation lost a guarded transition (already terminal, already
    /// training, and so on). Nothing was written.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl From<LedgerError> for StoreError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InvalidAmount { amount } => StoreError::InvalidAmount { amount },
            LedgerError::InsufficientCredits {
                required,
                available,
            } => StoreError::InsufficientCredits {
                required,
                available,
            },
            LedgerError::Db(e) => StoreError::Db(e),
        }
    }
}

/// Result of [`Store::fail_job_and_refund`].
#[derive(Debug)]
pub enum FailOutcome {
    /// The job was moved to `failed`. `refund` carries the refund
    /// transaction when credits had been reserved, `None` for free jobs.
    Failed { refund: Option<CreditTransaction> },
    /// The job had already reached a terminal state; nothing was written.
    AlreadyTerminal,
}

/// Result of [`Store::complete_remake_job`].
#[derive(Debug)]
pub enum RemakeOutcome {
    /// The entitlement was claimed and the row's images replaced.
    Applied(BatchRow),
    /// The entitlement was gone by completion time (a concurrent remake
    /// or upscale won); the job was marked failed, the row untouched.
    EntitlementLost,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Atomic persistence operations for the job lifecycle.
#[async_trait]
pub trait Store: Send + Sync {
    // ---- ledger ----

    /// Current credit balance for a user.
    async fn balance(&self, user_id: DbId) -> Result<Credits, StoreError>;

    /// Add purchased credits.
    async fn purchase_credits(
        &self,
        user_id: DbId,
        amount: Credits,
        description: &str,
    ) -> Result<CreditTransaction, StoreError>;

    // ---- authorization ----

    /// Debit the reservation and create the job row, atomically. A free
    /// job (`credits_reserved == 0`) skips the ledger entirely.
    async fn authorize_job(&self, input: NewJob, description: &str) -> Result<Job, StoreError>;

    /// Like [`Store::authorize_job`], additionally moving the subject
    /// into `training` and pointing it at the new job. Fails with
    /// [`StoreError::Conflict`] when the subject is already training or
    /// already trained.
    async fn authorize_train_job(
        &self,
        subject_id: DbId,
        input: NewJob,
        description: &str,
    ) -> Result<Job, StoreError>;

    // ---- submission bookkeeping ----

    /// Record the provider handle and move `created -> submitted`.
    /// Returns `None` when the job left `created` in the meantime.
    async fn mark_job_submitted(
        &self,
        job_id: DbId,
        external_handle: &str,
    ) -> Result<Option<Job>, StoreError>;

    /// Record the first poll: `submitted -> polling`.
    async fn mark_job_polling(&self, job_id: DbId) -> Result<(), StoreError>;

    // ---- reads ----

    async fn find_job(&self, job_id: DbId) -> Result<Option<Job>, StoreError>;

    async fn find_subject(&self, subject_id: DbId) -> Result<Option<Subject>, StoreError>;

    async fn find_batch(&self, batch_id: DbId) -> Result<Option<GenerationBatch>, StoreError>;

    async fn find_batch_row(
        &self,
        batch_id: DbId,
        row_index: i32,
    ) -> Result<Option<BatchRow>, StoreError>;

    async fn find_batch_row_by_id(&self, row_id: DbId) -> Result<Option<BatchRow>, StoreError>;

    /// In-flight jobs last touched before the cutoff, for the sweeper.
    async fn list_resumable_jobs(&self, stale_before: Timestamp) -> Result<Vec<Job>, StoreError>;

    /// Authorized-but-never-submitted jobs older than the cutoff.
    async fn list_stale_unsubmitted_jobs(
        &self,
        stale_before: Timestamp,
    ) -> Result<Vec<Job>, StoreError>;

    // ---- terminal transitions ----

    /// Move a job to `failed` and refund its reservation, atomically and
    /// at most once. Safe to call from any number of racing observers:
    /// exactly one gets [`FailOutcome::Failed`], the rest
    /// [`FailOutcome::AlreadyTerminal`]. A failing train job also resets
    /// its subject to `failed`.
    async fn fail_job_and_refund(
        &self,
        job_id: DbId,
        error: &str,
    ) -> Result<FailOutcome, StoreError>;

    /// Materialize a finished training run: store the model handle on the
    /// subject, mark it `ready`, and delete the job row.
    async fn complete_train_job(
        &self,
        job_id: DbId,
        subject_id: DbId,
        model_handle: &str,
    ) -> Result<(), StoreError>;

    /// Persist a finished generation batch with all rows and mark the job
    /// succeeded.
    async fn complete_batch_job(
        &self,
        job_id: DbId,
        batch: NewBatch,
    ) -> Result<GenerationBatch, StoreError>;

    /// Persist a finished video and mark the job succeeded.
    async fn complete_video_job(
        &self,
        job_id: DbId,
        video: NewVideo,
    ) -> Result<GeneratedVideo, StoreError>;

    /// Claim the remake entitlement and replace the row's images, or
    /// report the entitlement lost, marking the job accordingly.
    async fn complete_remake_job(
        &self,
        job_id: DbId,
        batch_id: DbId,
        row_id: DbId,
        image_urls: Vec<String>,
    ) -> Result<RemakeOutcome, StoreError>;

    /// Store a row's upscaled outputs and mark the job succeeded.
    async fn complete_upscale_job(
        &self,
        job_id: DbId,
        row_id: DbId,
        upscaled_urls: Vec<String>,
    ) -> Result<BatchRow, StoreError>;

    // ---- entitlements ----

    /// Claim the one free upscale for a batch; `false` means it was
    /// already taken and this upscale must be paid.
    async fn consume_free_upscale(&self, batch_id: DbId) -> Result<bool, StoreError>;
}

// ---------------------------------------------------------------------------
// Postgres implementation
// ---------------------------------------------------------------------------

/// [`Store`] backed by a Postgres pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn balance(&self, user_id: DbId) -> Result<Credits, StoreError> {
        Ok(LedgerRepo::balance(&self.pool, user_id).await?)
    }

    async fn purchase_credits(
        &self,
        user_id: DbId,
        amount: Credits,
        description: &str,
    ) -> Result<CreditTransaction, StoreError> {
        Ok(LedgerRepo::purchase(&self.pool, user_id, amount, description).await?)
    }

    async fn authorize_job(&self, input: NewJob, description: &str) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await?;
        if input.credits_reserved > 0 {
            LedgerRepo::debit_on(&mut *tx, input.user_id, input.credits_reserved, description)
                .await?;
        }
        let job = JobRepo::create_on(&mut *tx, &input).await?;
        tx.commit().await?;
        Ok(job)
    }

    async fn authorize_train_job(
        &self,
        subject_id: DbId,
        input: NewJob,
        description: &str,
    ) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await?;
        if input.credits_reserved > 0 {
            LedgerRepo::debit_on(&mut *tx, input.user_id, input.credits_reserved, description)
                .await?;
        }
        let job = JobRepo::create_on(&mut *tx, &input).await?;
        let moved = SubjectRepo::begin_training_on(&mut *tx, subject_id, job.id).await?;
        if !moved {
            // Rolls back the debit and the job row.
            return Err(StoreError::Conflict(format!(
                "subject {subject_id} is already training or trained"
            )));
        }
        tx.commit().await?;
        Ok(job)
    }

    async fn mark_job_submitted(
        &self,
        job_id: DbId,
        external_handle: &str,
    ) -> Result<Option<Job>, StoreError> {
        Ok(JobRepo::mark_submitted(&self.pool, job_id, external_handle).await?)
    }

    async fn mark_job_polling(&self, job_id: DbId) -> Result<(), StoreError> {
        Ok(JobRepo::mark_polling(&self.pool, job_id).await?)
    }

    async fn find_job(&self, job_id: DbId) -> Result<Option<Job>, StoreError> {
        Ok(JobRepo::find_by_id(&self.pool, job_id).await?)
    }

    async fn find_subject(&self, subject_id: DbId) -> Result<Option<Subject>, StoreError> {
        Ok(SubjectRepo::find_by_id(&self.pool, subject_id).await?)
    }

    async fn find_batch(&self, batch_id: DbId) -> Result<Option<GenerationBatch>, StoreError> {
        Ok(BatchRepo::find_by_id(&self.pool, batch_id).await?)
    }

    async fn find_batch_row(
        &self,
        batch_id: DbId,
        row_index: i32,
    ) -> Result<Option<BatchRow>, StoreError> {
        Ok(BatchRepo::find_row(&self.pool, batch_id, row_index).await?)
    }

    async fn find_batch_row_by_id(&self, row_id: DbId) -> Result<Option<BatchRow>, StoreError> {
        Ok(BatchRepo::find_row_by_id(&self.pool, row_id).await?)
    }

    async fn list_resumable_jobs(&self, stale_before: Timestamp) -> Result<Vec<Job>, StoreError> {
        Ok(JobRepo::list_resumable(&self.pool, stale_before).await?)
    }

    async fn list_stale_unsubmitted_jobs(
        &self,
        stale_before: Timestamp,
    ) -> Result<Vec<Job>, StoreError> {
        Ok(JobRepo::list_stale_unsubmitted(&self.pool, stale_before).await?)
    }

    async fn fail_job_and_refund(
        &self,
        job_id: DbId,
        error: &str,
    ) -> Result<FailOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let Some(job) = JobRepo::find_for_update_on(&mut *tx, job_id).await? else {
            return Err(StoreError::NotFound {
                entity: "job",
                id: job_id,
            });
        };
        if JobState::from_id(job.state).is_some_and(|s| s.is_terminal()) {
            return Ok(FailOutcome::AlreadyTerminal);
        }

        JobRepo::mark_failed_on(&mut *tx, job_id, error).await?;
        if job.kind == JobKind::Train.id() {
            SubjectRepo::fail_training_by_job_on(&mut *tx, job_id).await?;
        }

        let refund = if job.credits_reserved > 0 {
            let kind_name = JobKind::from_id(job.kind).map_or("job", JobKind::as_str);
            let description = format!("refund: {kind_name} job {job_id}");
            Some(
                LedgerRepo::credit_on(
                    &mut *tx,
                    job.user_id,
                    TransactionKind::Refund,
                    job.credits_reserved,
                    &description,
                )
                .await?,
            )
        } else {
            None
        };

        tx.commit().await?;
        Ok(FailOutcome::Failed { refund })
    }

    async fn complete_train_job(
        &self,
        job_id: DbId,
        subject_id: DbId,
        model_handle: &str,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_live_job(&mut *tx, job_id).await?;
        SubjectRepo::complete_training_on(&mut *tx, subject_id, model_handle).await?;
        // The job row is bookkeeping for an in-flight run; once the
        // subject carries the model handle it has nothing left to say.
        JobRepo::delete_on(&mut *tx, job_id).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn complete_batch_job(
        &self,
        job_id: DbId,
        batch: NewBatch,
    ) -> Result<GenerationBatch, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_live_job(&mut *tx, job_id).await?;
        let created = BatchRepo::create_on(&mut *tx, &batch).await?;
        let result = serde_json::json!({ "batch_id": created.id });
        JobRepo::mark_succeeded_on(&mut *tx, job_id, &result).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn complete_video_job(
        &self,
        job_id: DbId,
        video: NewVideo,
    ) -> Result<GeneratedVideo, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_live_job(&mut *tx, job_id).await?;
        let created = VideoRepo::create_on(&mut *tx, &video).await?;
        let result = serde_json::json!({ "video_id": created.id, "video_url": created.video_url });
        JobRepo::mark_succeeded_on(&mut *tx, job_id, &result).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn complete_remake_job(
        &self,
        job_id: DbId,
        batch_id: DbId,
        row_id: DbId,
        image_urls: Vec<String>,
    ) -> Result<RemakeOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_live_job(&mut *tx, job_id).await?;

        if !BatchRepo::apply_remake_on(&mut *tx, batch_id).await? {
            JobRepo::mark_failed_on(&mut *tx, job_id, "remake entitlement no longer available")
                .await?;
            tx.commit().await?;
            return Ok(RemakeOutcome::EntitlementLost);
        }

        let Some(row) = BatchRepo::replace_row_images_on(&mut *tx, row_id, &image_urls).await?
        else {
            return Err(StoreError::NotFound {
                entity: "batch row",
                id: row_id,
            });
        };
        let result = serde_json::json!({ "row_id": row.id, "image_urls": row.image_urls });
        JobRepo::mark_succeeded_on(&mut *tx, job_id, &result).await?;
        tx.commit().await?;
        Ok(RemakeOutcome::Applied(row))
    }

    async fn complete_upscale_job(
        &self,
        job_id: DbId,
        row_id: DbId,
        upscaled_urls: Vec<String>,
    ) -> Result<BatchRow, StoreError> {
        let mut tx = self.pool.begin().await?;
        lock_live_job(&mut *tx, job_id).await?;
        let Some(row) = BatchRepo::set_row_upscaled_on(&mut *tx, row_id, &upscaled_urls).await?
        else {
            return Err(StoreError::NotFound {
                entity: "batch row",
                id: row_id,
            });
        };
        let result = serde_json::json!({ "row_id": row.id, "upscaled_urls": row.upscaled_urls });
        JobRepo::mark_succeeded_on(&mut *tx, job_id, &result).await?;
        tx.commit().await?;
        Ok(row)
    }

    async fn consume_free_upscale(&self, batch_id: DbId) -> Result<bool, StoreError> {
        Ok(BatchRepo::try_consume_free_upscale(&self.pool, batch_id).await?)
    }
}

/// Lock a job row for a completion transaction and reject jobs that are
/// already terminal. Keeps every completion exactly-once no matter how
/// many pollers race to report the same remote success.
async fn lock_live_job(
    conn: &mut sqlx::PgConnection,
    job_id: DbId,
) -> Result<Job, StoreError> {
    let Some(job) = JobRepo::find_for_update_on(conn, job_id).await? else {
        return Err(StoreError::NotFound {
            entity: "job",
            id: job_id,
        });
    };
    if JobState::from_id(job.state).is_some_and(|s| s.is_terminal()) {
        return Err(StoreError::Conflict(format!(
            "job {job_id} is already terminal"
        )));
    }
    Ok(job)
}
