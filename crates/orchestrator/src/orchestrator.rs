//! The job driver: authorize, submit, poll, reconcile.
//!
//! Every operation follows the same shape. Credits are reserved and the
//! job row created in one transaction, the work is submitted to the
//! provider, and the caller stays attached to a bounded poll. A job that
//! outruns the budget is reported [`DriveOutcome::Pending`] and later
//! finished by [`JobOrchestrator::check_job`] or the sweeper -- local
//! timeouts are an attempt outcome, never a job state.
//!
//! Refunds only ever happen through [`Store::fail_job_and_refund`], which
//! is exactly-once under racing observers. Local persistence errors never
//! fail the job: the row stays live and a later attempt retries.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use photoloom_compute::{ComputeProvider, JobSpec, RemoteArtifact, RemoteStatus};
use photoloom_core::credits::{
    batch_cost, REMAKE_COST, SAMPLE_COST, TRAIN_COST, UPSCALE_COST, VIDEO_COST,
};
use photoloom_core::plan;
use photoloom_core::types::DbId;
use photoloom_db::models::batch::{
    BatchRow, GenerateBatchRequest, GenerationBatch, NewBatch, NewBatchRow, IMAGES_PER_ROW,
};
use photoloom_db::models::job::{Job, NewJob};
use photoloom_db::models::status::{CodeId, JobKind, JobState, SubjectStatus};
use photoloom_db::models::subject::Subject;
use photoloom_db::models::video::{GenerateVideoRequest, GeneratedVideo, NewVideo};
use photoloom_db::store::{FailOutcome, RemakeOutcome, Store};
use photoloom_events::{EventBus, JobEvent};

use crate::context::{JobContext, JobOp};
use crate::error::OrchestratorError;
use crate::poll::{poll_until_terminal, PollConfig, PollOutcome};

/// Aspect ratio used when a request does not specify one.
pub const DEFAULT_ASPECT_RATIO: &str = "1:1";

/// Rows in the free post-training sample batch.
pub const SAMPLE_ROWS: u32 = 4;

/// Stock scenes for the sample batch, one per row.
pub const SAMPLE_SCENES: &[&str] = &[
    "studio portrait, soft key light",
    "outdoor candid, shallow depth of field",
    "golden hour close-up",
    "black and white profile",
];

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// How a caller-attached drive ended.
#[derive(Debug)]
pub enum DriveOutcome<T> {
    /// The provider finished within the budget and the outcome is
    /// persisted.
    Completed(T),
    /// The poll budget elapsed first. The job is still live (state
    /// `submitted` or `polling`) and will be finished by a later check
    /// or the sweeper.
    Pending(Job),
}

/// Result of a user-initiated job check.
#[derive(Debug)]
pub enum CheckOutcome {
    /// The job is terminal -- possibly just now, possibly long before
    /// this check. The persisted row is attached.
    Terminal(Job),
    /// The check completed a training run, whose reconciliation removes
    /// the job row; the subject now carries the result.
    Finished,
    /// Still in flight.
    Running(Job),
}

/// Per-sweep counters, logged by the sweeper loop.
#[derive(Debug, Default)]
pub struct SweepStats {
    pub expired: usize,
    pub finished: usize,
    pub still_running: usize,
    pub errors: usize,
}

/// What reconciliation materialized, by kind.
enum Reconciled {
    Train(Subject),
    Batch(GenerationBatch),
    Video(GeneratedVideo),
    Row(BatchRow),
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct JobOrchestrator {
    store: Arc<dyn Store>,
    provider: Arc<dyn ComputeProvider>,
    events: Arc<EventBus>,
    poll: PollConfig,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn ComputeProvider>,
        events: Arc<EventBus>,
        poll: PollConfig,
    ) -> Self {
        Self {
            store,
            provider,
            events,
            poll,
        }
    }

    // ---------- training ----------

    /// Launch a training run for a subject and stay attached to it.
    ///
    /// Reserves [`TRAIN_COST`] credits and moves the subject to
    /// `training` atomically with the job row. On success the subject
    /// carries the permanent model handle and a free sample batch is
    /// kicked off in the background.
    pub async fn start_training(
        &self,
        user_id: DbId,
        subject_id: DbId,
        input: serde_json::Value,
    ) -> Result<DriveOutcome<Subject>, OrchestratorError> {
        let subject = self.subject_owned_by(subject_id, user_id).await?;
        match SubjectStatus::from_id(subject.status) {
            Some(SubjectStatus::Training) => {
                return Err(OrchestratorError::Conflict(format!(
                    "subject {subject_id} is already training"
                )));
            }
            Some(SubjectStatus::Ready) => {
                return Err(OrchestratorError::Conflict(format!(
                    "subject {subject_id} is already trained"
                )));
            }
            _ => {}
        }

        let ctx = JobContext::new(JobOp::Train { subject_id, input });
        let job = self
            .store
            .authorize_train_job(
                subject_id,
                NewJob {
                    user_id,
                    kind: JobKind::Train.id(),
                    credits_reserved: TRAIN_COST,
                    payload: encode_context(&ctx)?,
                },
                &format!("train subject {subject_id}"),
            )
            .await?;
        tracing::info!(job_id = job.id, subject_id, user_id, "Training authorized");

        match self.submit_and_drive(job, ctx, self.poll.submit_wait).await? {
            DriveOutcome::Completed(Reconciled::Train(subject)) => {
                Ok(DriveOutcome::Completed(subject))
            }
            DriveOutcome::Completed(_) => Err(unexpected_shape()),
            DriveOutcome::Pending(job) => Ok(DriveOutcome::Pending(job)),
        }
    }

    // ---------- generation ----------

    /// Generate a batch of rows against a trained subject.
    pub async fn start_batch(
        &self,
        user_id: DbId,
        request: GenerateBatchRequest,
    ) -> Result<DriveOutcome<GenerationBatch>, OrchestratorError> {
        plan::validate_batch_shape(request.rows, request.scenes.len())?;
        let subject = self.subject_owned_by(request.subject_id, user_id).await?;
        let model_handle = ready_model_handle(&subject)?;
        let aspect_ratio = request
            .aspect_ratio
            .unwrap_or_else(|| DEFAULT_ASPECT_RATIO.to_string());

        let cost = batch_cost(request.rows);
        let ctx = JobContext::new(JobOp::Batch {
            subject_id: subject.id,
            model_handle,
            scenes: request.scenes,
            rows: request.rows,
            aspect_ratio,
        });
        let job = self
            .store
            .authorize_job(
                NewJob {
                    user_id,
                    kind: JobKind::GenerateBatch.id(),
                    credits_reserved: cost,
                    payload: encode_context(&ctx)?,
                },
                &format!("generate {} rows for subject {}", request.rows, subject.id),
            )
            .await?;
        tracing::info!(job_id = job.id, subject_id = subject.id, cost, "Batch authorized");

        match self.submit_and_drive(job, ctx, self.poll.submit_wait).await? {
            DriveOutcome::Completed(Reconciled::Batch(batch)) => {
                Ok(DriveOutcome::Completed(batch))
            }
            DriveOutcome::Completed(_) => Err(unexpected_shape()),
            DriveOutcome::Pending(job) => Ok(DriveOutcome::Pending(job)),
        }
    }

    /// Generate a video clip, optionally animating an existing batch row.
    pub async fn start_video(
        &self,
        user_id: DbId,
        request: GenerateVideoRequest,
    ) -> Result<DriveOutcome<GeneratedVideo>, OrchestratorError> {
        let subject = self.subject_owned_by(request.subject_id, user_id).await?;
        let model_handle = ready_model_handle(&subject)?;

        let source_images = match request.source_row_id {
            Some(row_id) => {
                let row = self.row_owned_by(row_id, user_id, subject.id).await?;
                // Animate the best available rendition of the row.
                row.upscaled_urls.unwrap_or(row.image_urls)
            }
            None => Vec::new(),
        };
        let input = json!({
            "model_handle": model_handle,
            "source_images": source_images,
            "options": request.input,
        });
        let ctx = JobContext::new(JobOp::Video {
            subject_id: subject.id,
            source_row_id: request.source_row_id,
            input,
        });
        let job = self
            .store
            .authorize_job(
                NewJob {
                    user_id,
                    kind: JobKind::GenerateVideo.id(),
                    credits_reserved: VIDEO_COST,
                    payload: encode_context(&ctx)?,
                },
                &format!("generate video for subject {}", subject.id),
            )
            .await?;
        tracing::info!(job_id = job.id, subject_id = subject.id, "Video authorized");

        match self.submit_and_drive(job, ctx, self.poll.submit_wait).await? {
            DriveOutcome::Completed(Reconciled::Video(video)) => {
                Ok(DriveOutcome::Completed(video))
            }
            DriveOutcome::Completed(_) => Err(unexpected_shape()),
            DriveOutcome::Pending(job) => Ok(DriveOutcome::Pending(job)),
        }
    }

    // ---------- row entitlements ----------

    /// Re-render one row of a batch using its persisted prompt.
    ///
    /// Free, once per batch, and only while the batch has never been
    /// upscaled. The pre-check here gives a clean error before any work
    /// starts; the claim that actually burns the entitlement is the
    /// compare-and-set inside [`Store::complete_remake_job`].
    pub async fn remake_row(
        &self,
        user_id: DbId,
        batch_id: DbId,
        row_index: i32,
    ) -> Result<DriveOutcome<BatchRow>, OrchestratorError> {
        let batch = self.batch_owned_by(batch_id, user_id).await?;
        batch
            .entitlements()
            .check_remake()
            .map_err(|err| OrchestratorError::Conflict(err.to_string()))?;
        let row = self.batch_row(batch_id, row_index).await?;
        let subject = self.subject_by_id(batch.subject_id).await?;
        let model_handle = ready_model_handle(&subject)?;

        let ctx = JobContext::new(JobOp::Remake {
            batch_id,
            row_id: row.id,
            model_handle,
            prompt: row.prompt,
            aspect_ratio: batch.aspect_ratio,
        });
        let job = self
            .store
            .authorize_job(
                NewJob {
                    user_id,
                    kind: JobKind::RemakeRow.id(),
                    credits_reserved: REMAKE_COST,
                    payload: encode_context(&ctx)?,
                },
                &format!("remake row {row_index} of batch {batch_id}"),
            )
            .await?;
        tracing::info!(job_id = job.id, batch_id, row_index, "Remake authorized");

        match self.submit_and_drive(job, ctx, self.poll.submit_wait).await? {
            DriveOutcome::Completed(Reconciled::Row(row)) => Ok(DriveOutcome::Completed(row)),
            DriveOutcome::Completed(_) => Err(unexpected_shape()),
            DriveOutcome::Pending(job) => Ok(DriveOutcome::Pending(job)),
        }
    }

    /// Upscale one row of a batch.
    ///
    /// The first upscale per batch consumes the free entitlement; later
    /// ones are paid. The free claim happens before the job is created
    /// and is never rolled back, even if the job later fails: once a
    /// batch has entered upscaling, remakes stay foreclosed.
    pub async fn upscale_row(
        &self,
        user_id: DbId,
        batch_id: DbId,
        row_index: i32,
    ) -> Result<DriveOutcome<BatchRow>, OrchestratorError> {
        let batch = self.batch_owned_by(batch_id, user_id).await?;
        let row = self.batch_row(batch_id, row_index).await?;

        let free = self.store.consume_free_upscale(batch.id).await?;
        let cost = if free { 0 } else { UPSCALE_COST };

        let ctx = JobContext::new(JobOp::Upscale {
            batch_id,
            row_id: row.id,
            image_urls: row.image_urls,
        });
        let job = self
            .store
            .authorize_job(
                NewJob {
                    user_id,
                    kind: JobKind::UpscaleRow.id(),
                    credits_reserved: cost,
                    payload: encode_context(&ctx)?,
                },
                &format!("upscale row {row_index} of batch {batch_id}"),
            )
            .await?;
        tracing::info!(job_id = job.id, batch_id, row_index, free, "Upscale authorized");

        match self.submit_and_drive(job, ctx, self.poll.submit_wait).await? {
            DriveOutcome::Completed(Reconciled::Row(row)) => Ok(DriveOutcome::Completed(row)),
            DriveOutcome::Completed(_) => Err(unexpected_shape()),
            DriveOutcome::Pending(job) => Ok(DriveOutcome::Pending(job)),
        }
    }

    // ---------- checks and resumption ----------

    /// User-initiated check of a pending job: re-attach to the remote
    /// work for one bounded poll and report where things stand.
    pub async fn check_job(
        &self,
        user_id: DbId,
        job_id: DbId,
    ) -> Result<CheckOutcome, OrchestratorError> {
        let job = self.reload_job(job_id).await?;
        if job.user_id != user_id {
            return Err(OrchestratorError::NotFound {
                entity: "job",
                id: job_id,
            });
        }
        self.advance(job, self.poll.check_wait).await
    }

    /// One sweeper pass: expire jobs that never reached the provider and
    /// re-attach to in-flight jobs nobody has touched since the cutoff.
    pub async fn sweep_once(&self, grace: Duration) -> Result<SweepStats, OrchestratorError> {
        let grace = chrono::Duration::from_std(grace)
            .map_err(|err| OrchestratorError::Internal(format!("sweep grace out of range: {err}")))?;
        let cutoff = chrono::Utc::now() - grace;
        let mut stats = SweepStats::default();

        for job in self.store.list_stale_unsubmitted_jobs(cutoff).await? {
            // Still `created` after the whole grace window: the process
            // that authorized it is gone and no handle exists to resume.
            match self.fail_with_refund(&job, "expired before submission").await {
                Ok(()) => stats.expired += 1,
                Err(err) => {
                    stats.errors += 1;
                    tracing::warn!(job_id = job.id, error = %err, "Expiring job failed");
                }
            }
        }

        for job in self.store.list_resumable_jobs(cutoff).await? {
            let job_id = job.id;
            match self.advance(job, self.poll.check_wait).await {
                Ok(CheckOutcome::Terminal(_)) | Ok(CheckOutcome::Finished) => stats.finished += 1,
                Ok(CheckOutcome::Running(_)) => stats.still_running += 1,
                Err(err) => {
                    stats.errors += 1;
                    tracing::warn!(job_id, error = %err, "Resuming job failed");
                }
            }
        }

        Ok(stats)
    }

    /// Drive a live job forward for at most `budget`.
    async fn advance(
        &self,
        job: Job,
        budget: Duration,
    ) -> Result<CheckOutcome, OrchestratorError> {
        match JobState::from_id(job.state) {
            Some(state) if state.is_terminal() => return Ok(CheckOutcome::Terminal(job)),
            // Authorized but never submitted: there is no handle to poll.
            // The sweeper expires these once they are stale.
            Some(JobState::Created) => return Ok(CheckOutcome::Running(job)),
            Some(JobState::Submitted | JobState::Polling) => {}
            Some(_) | None => {
                return Err(OrchestratorError::Internal(format!(
                    "job {} has unrecognized state {}",
                    job.id, job.state
                )));
            }
        }

        let ctx = decode_context(&job)?;
        let job_id = job.id;
        match self.drive(job, ctx, budget).await {
            Ok(DriveOutcome::Completed(_)) => self.terminal_or_finished(job_id).await,
            Ok(DriveOutcome::Pending(job)) => Ok(CheckOutcome::Running(job)),
            // The job reached a terminal state -- through this attempt or
            // a racing one. The persisted row is the answer.
            Err(OrchestratorError::Remote(_)) | Err(OrchestratorError::Conflict(_)) => {
                self.terminal_or_finished(job_id).await
            }
            Err(err) => Err(err),
        }
    }

    async fn terminal_or_finished(&self, job_id: DbId) -> Result<CheckOutcome, OrchestratorError> {
        match self.store.find_job(job_id).await? {
            Some(job) => Ok(CheckOutcome::Terminal(job)),
            // Train reconciliation deletes the row on success.
            None => Ok(CheckOutcome::Finished),
        }
    }

    // ---------- the drive pipeline ----------

    /// Submit an authorized job and stay attached to it.
    async fn submit_and_drive(
        &self,
        job: Job,
        ctx: JobContext,
        budget: Duration,
    ) -> Result<DriveOutcome<Reconciled>, OrchestratorError> {
        let spec = JobSpec {
            kind: job_kind_str(job.kind)?,
            idempotency_key: ctx.idempotency_key.clone(),
            input: submit_input(&ctx.op),
        };

        let handle = match self.provider.submit(&spec).await {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(job_id = job.id, error = %err, "Submission failed");
                self.fail_with_refund(&job, &format!("submission failed: {err}"))
                    .await?;
                return Err(OrchestratorError::Submission(err.to_string()));
            }
        };

        let Some(job) = self.store.mark_job_submitted(job.id, &handle).await? else {
            // The sweeper expired the row while submission was in flight;
            // the remote work is orphaned.
            tracing::warn!(job_id = job.id, handle, "Job expired during submission");
            return Err(OrchestratorError::Conflict(format!(
                "job {} expired during submission",
                job.id
            )));
        };

        self.drive(job, ctx, budget).await
    }

    /// Poll a submitted job to a terminal status and reconcile it.
    async fn drive(
        &self,
        job: Job,
        ctx: JobContext,
        budget: Duration,
    ) -> Result<DriveOutcome<Reconciled>, OrchestratorError> {
        let Some(handle) = job.external_handle.clone() else {
            return Err(OrchestratorError::Internal(format!(
                "job {} has no provider handle",
                job.id
            )));
        };
        self.store.mark_job_polling(job.id).await?;

        let status =
            match poll_until_terminal(self.provider.as_ref(), &handle, &self.poll, budget).await {
                Ok(PollOutcome::Terminal(status)) => status,
                Ok(PollOutcome::TimedOut) => {
                    tracing::info!(job_id = job.id, handle, "Poll budget elapsed, job stays live");
                    let job = self.reload_job(job.id).await?;
                    return Ok(DriveOutcome::Pending(job));
                }
                // Non-transient: the handle is gone or the provider
                // answered garbage. The remote work is unrecoverable.
                Err(err) => {
                    let error = format!("provider poll failed: {err}");
                    self.fail_with_refund(&job, &error).await?;
                    return Err(OrchestratorError::Remote(error));
                }
            };

        match status {
            RemoteStatus::Failed { reason } => {
                self.fail_with_refund(&job, &reason).await?;
                Err(OrchestratorError::Remote(reason))
            }
            RemoteStatus::Succeeded => {
                let artifact = match self.provider.fetch_result(&handle).await {
                    Ok(artifact) => artifact,
                    // The result is still there; a later attempt fetches it.
                    Err(err) if err.is_transient() => {
                        tracing::warn!(job_id = job.id, error = %err, "Result fetch failed, job stays live");
                        let job = self.reload_job(job.id).await?;
                        return Ok(DriveOutcome::Pending(job));
                    }
                    Err(err) => {
                        let error = format!("fetching result failed: {err}");
                        self.fail_with_refund(&job, &error).await?;
                        return Err(OrchestratorError::Remote(error));
                    }
                };
                self.reconcile(&job, &ctx, artifact)
                    .await
                    .map(DriveOutcome::Completed)
            }
            RemoteStatus::Queued | RemoteStatus::Running => Err(OrchestratorError::Internal(
                "terminal poll returned a non-terminal status".to_string(),
            )),
        }
    }

    // ---------- reconciliation ----------

    async fn reconcile(
        &self,
        job: &Job,
        ctx: &JobContext,
        artifact: RemoteArtifact,
    ) -> Result<Reconciled, OrchestratorError> {
        match &ctx.op {
            JobOp::Train { subject_id, .. } => {
                self.reconcile_train(job, *subject_id, artifact).await
            }
            JobOp::Batch {
                subject_id,
                scenes,
                rows,
                aspect_ratio,
                ..
            } => {
                self.reconcile_batch(job, *subject_id, scenes, *rows, aspect_ratio, artifact)
                    .await
            }
            JobOp::Sample { subject_id, .. } => {
                let scenes = sample_scenes();
                self.reconcile_batch(
                    job,
                    *subject_id,
                    &scenes,
                    SAMPLE_ROWS,
                    DEFAULT_ASPECT_RATIO,
                    artifact,
                )
                .await
            }
            JobOp::Video {
                subject_id,
                source_row_id,
                ..
            } => {
                self.reconcile_video(job, *subject_id, *source_row_id, artifact)
                    .await
            }
            JobOp::Remake {
                batch_id, row_id, ..
            } => self.reconcile_remake(job, *batch_id, *row_id, artifact).await,
            JobOp::Upscale { row_id, .. } => self.reconcile_upscale(job, *row_id, artifact).await,
        }
    }

    async fn reconcile_train(
        &self,
        job: &Job,
        subject_id: DbId,
        artifact: RemoteArtifact,
    ) -> Result<Reconciled, OrchestratorError> {
        let Some(model_handle) = artifact.raw.get("model_handle").and_then(|v| v.as_str()) else {
            return self.fail_malformed(job, "result is missing model_handle").await;
        };

        self.store
            .complete_train_job(job.id, subject_id, model_handle)
            .await?;
        tracing::info!(job_id = job.id, subject_id, "Subject trained");
        self.events.publish(
            JobEvent::new("job.succeeded", job.user_id)
                .with_job(job.id, JobKind::Train.as_str())
                .with_payload(json!({ "subject_id": subject_id })),
        );
        self.spawn_sample_batch(job.user_id, subject_id, model_handle.to_string());

        let subject = self.subject_by_id(subject_id).await?;
        Ok(Reconciled::Train(subject))
    }

    async fn reconcile_batch(
        &self,
        job: &Job,
        subject_id: DbId,
        scenes: &[String],
        rows: u32,
        aspect_ratio: &str,
        artifact: RemoteArtifact,
    ) -> Result<Reconciled, OrchestratorError> {
        let expected = rows as usize * IMAGES_PER_ROW;
        if artifact.files.len() != expected {
            return self
                .fail_malformed(
                    job,
                    &format!("expected {expected} files, got {}", artifact.files.len()),
                )
                .await;
        }

        let prompts = plan::distribute(rows as usize, scenes);
        let new_rows = prompts
            .into_iter()
            .zip(artifact.files.chunks(IMAGES_PER_ROW))
            .map(|(prompt, images)| NewBatchRow {
                prompt,
                image_urls: images.to_vec(),
            })
            .collect();

        let batch = self
            .store
            .complete_batch_job(
                job.id,
                NewBatch {
                    user_id: job.user_id,
                    subject_id,
                    aspect_ratio: aspect_ratio.to_string(),
                    credits_used: job.credits_reserved,
                    rows: new_rows,
                },
            )
            .await?;
        tracing::info!(job_id = job.id, batch_id = batch.id, rows, "Batch persisted");
        self.events.publish(
            JobEvent::new("job.succeeded", job.user_id)
                .with_job(job.id, job_kind_str(job.kind)?)
                .with_payload(json!({ "batch_id": batch.id })),
        );
        Ok(Reconciled::Batch(batch))
    }

    async fn reconcile_video(
        &self,
        job: &Job,
        subject_id: DbId,
        source_row_id: Option<DbId>,
        artifact: RemoteArtifact,
    ) -> Result<Reconciled, OrchestratorError> {
        let video_url = artifact.files.first().cloned().or_else(|| {
            artifact
                .raw
                .get("video_url")
                .and_then(|v| v.as_str())
                .map(String::from)
        });
        let Some(video_url) = video_url else {
            return self.fail_malformed(job, "result carries no video url").await;
        };

        let video = self
            .store
            .complete_video_job(
                job.id,
                NewVideo {
                    user_id: job.user_id,
                    subject_id,
                    source_row_id,
                    video_url,
                    credits_used: job.credits_reserved,
                },
            )
            .await?;
        tracing::info!(job_id = job.id, video_id = video.id, "Video persisted");
        self.events.publish(
            JobEvent::new("job.succeeded", job.user_id)
                .with_job(job.id, JobKind::GenerateVideo.as_str())
                .with_payload(json!({ "video_id": video.id, "video_url": video.video_url })),
        );
        Ok(Reconciled::Video(video))
    }

    async fn reconcile_remake(
        &self,
        job: &Job,
        batch_id: DbId,
        row_id: DbId,
        artifact: RemoteArtifact,
    ) -> Result<Reconciled, OrchestratorError> {
        if artifact.files.len() != IMAGES_PER_ROW {
            return self
                .fail_malformed(
                    job,
                    &format!(
                        "expected {IMAGES_PER_ROW} files, got {}",
                        artifact.files.len()
                    ),
                )
                .await;
        }

        match self
            .store
            .complete_remake_job(job.id, batch_id, row_id, artifact.files)
            .await?
        {
            RemakeOutcome::Applied(row) => {
                tracing::info!(job_id = job.id, batch_id, row_id, "Row remade");
                self.events.publish(
                    JobEvent::new("job.succeeded", job.user_id)
                        .with_job(job.id, JobKind::RemakeRow.as_str())
                        .with_payload(json!({ "batch_id": batch_id, "row_id": row_id })),
                );
                Ok(Reconciled::Row(row))
            }
            // A concurrent remake or upscale claimed the flags first; the
            // store has already marked this job failed.
            RemakeOutcome::EntitlementLost => {
                let error = "remake entitlement no longer available";
                tracing::info!(job_id = job.id, batch_id, "Remake lost the entitlement race");
                self.events.publish(
                    JobEvent::new("job.failed", job.user_id)
                        .with_job(job.id, JobKind::RemakeRow.as_str())
                        .with_payload(json!({ "error": error, "refunded_credits": 0 })),
                );
                Err(OrchestratorError::Conflict(error.to_string()))
            }
        }
    }

    async fn reconcile_upscale(
        &self,
        job: &Job,
        row_id: DbId,
        artifact: RemoteArtifact,
    ) -> Result<Reconciled, OrchestratorError> {
        if artifact.files.len() != IMAGES_PER_ROW {
            return self
                .fail_malformed(
                    job,
                    &format!(
                        "expected {IMAGES_PER_ROW} files, got {}",
                        artifact.files.len()
                    ),
                )
                .await;
        }

        let row = self
            .store
            .complete_upscale_job(job.id, row_id, artifact.files)
            .await?;
        tracing::info!(job_id = job.id, row_id, "Row upscaled");
        self.events.publish(
            JobEvent::new("job.succeeded", job.user_id)
                .with_job(job.id, JobKind::UpscaleRow.as_str())
                .with_payload(json!({ "row_id": row_id })),
        );
        Ok(Reconciled::Row(row))
    }

    // ---------- sample batch ----------

    fn spawn_sample_batch(&self, user_id: DbId, subject_id: DbId, model_handle: String) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.run_sample_batch(user_id, subject_id, model_handle).await {
                tracing::warn!(user_id, subject_id, error = %err, "Sample batch failed");
            }
        });
    }

    async fn run_sample_batch(
        &self,
        user_id: DbId,
        subject_id: DbId,
        model_handle: String,
    ) -> Result<(), OrchestratorError> {
        let ctx = JobContext::new(JobOp::Sample {
            subject_id,
            model_handle,
        });
        let job = self
            .store
            .authorize_job(
                NewJob {
                    user_id,
                    kind: JobKind::GenerateSample.id(),
                    credits_reserved: SAMPLE_COST,
                    payload: encode_context(&ctx)?,
                },
                &format!("sample batch for subject {subject_id}"),
            )
            .await?;
        tracing::info!(job_id = job.id, subject_id, "Sample batch authorized");

        match self.submit_and_drive(job, ctx, self.poll.submit_wait).await? {
            DriveOutcome::Completed(_) => Ok(()),
            DriveOutcome::Pending(job) => {
                tracing::info!(job_id = job.id, "Sample batch still in flight");
                Ok(())
            }
        }
    }

    // ---------- failure path ----------

    /// Mark a job failed and refund its reservation, publishing the
    /// failure event only when this caller won the terminal transition.
    async fn fail_with_refund(&self, job: &Job, error: &str) -> Result<(), OrchestratorError> {
        match self.store.fail_job_and_refund(job.id, error).await? {
            FailOutcome::Failed { refund } => {
                let refunded = refund.as_ref().map_or(0, |t| t.credits_change);
                tracing::info!(job_id = job.id, refunded, error, "Job failed");
                self.events.publish(
                    JobEvent::new("job.failed", job.user_id)
                        .with_job(job.id, job_kind_str(job.kind)?)
                        .with_payload(json!({ "error": error, "refunded_credits": refunded })),
                );
            }
            FailOutcome::AlreadyTerminal => {
                tracing::debug!(job_id = job.id, "Job already terminal, failure not recorded");
            }
        }
        Ok(())
    }

    async fn fail_malformed(
        &self,
        job: &Job,
        detail: &str,
    ) -> Result<Reconciled, OrchestratorError> {
        let error = format!("malformed provider result: {detail}");
        self.fail_with_refund(job, &error).await?;
        Err(OrchestratorError::Remote(error))
    }

    // ---------- lookups ----------

    async fn reload_job(&self, job_id: DbId) -> Result<Job, OrchestratorError> {
        self.store
            .find_job(job_id)
            .await?
            .ok_or(OrchestratorError::NotFound {
                entity: "job",
                id: job_id,
            })
    }

    async fn subject_by_id(&self, subject_id: DbId) -> Result<Subject, OrchestratorError> {
        self.store
            .find_subject(subject_id)
            .await?
            .ok_or(OrchestratorError::NotFound {
                entity: "subject",
                id: subject_id,
            })
    }

    /// A subject visible to `user_id`; lookups never reveal other users'
    /// subjects, they 404.
    async fn subject_owned_by(
        &self,
        subject_id: DbId,
        user_id: DbId,
    ) -> Result<Subject, OrchestratorError> {
        self.store
            .find_subject(subject_id)
            .await?
            .filter(|s| s.user_id == user_id)
            .ok_or(OrchestratorError::NotFound {
                entity: "subject",
                id: subject_id,
            })
    }

    async fn batch_owned_by(
        &self,
        batch_id: DbId,
        user_id: DbId,
    ) -> Result<GenerationBatch, OrchestratorError> {
        self.store
            .find_batch(batch_id)
            .await?
            .filter(|b| b.user_id == user_id)
            .ok_or(OrchestratorError::NotFound {
                entity: "batch",
                id: batch_id,
            })
    }

    async fn batch_row(
        &self,
        batch_id: DbId,
        row_index: i32,
    ) -> Result<BatchRow, OrchestratorError> {
        self.store
            .find_batch_row(batch_id, row_index)
            .await?
            .ok_or(OrchestratorError::NotFound {
                entity: "batch row",
                id: row_index as DbId,
            })
    }

    async fn row_owned_by(
        &self,
        row_id: DbId,
        user_id: DbId,
        subject_id: DbId,
    ) -> Result<BatchRow, OrchestratorError> {
        let row = self.store.find_batch_row_by_id(row_id).await?;
        let Some(row) = row else {
            return Err(OrchestratorError::NotFound {
                entity: "batch row",
                id: row_id,
            });
        };
        let batch = self.store.find_batch(row.batch_id).await?;
        match batch {
            Some(batch) if batch.user_id == user_id && batch.subject_id == subject_id => Ok(row),
            _ => Err(OrchestratorError::NotFound {
                entity: "batch row",
                id: row_id,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Provider input for each operation. Pure so resubmission logic and
/// tests see exactly what went over the wire.
fn submit_input(op: &JobOp) -> serde_json::Value {
    match op {
        JobOp::Train { input, .. } => input.clone(),
        JobOp::Batch {
            model_handle,
            scenes,
            rows,
            aspect_ratio,
            ..
        } => json!({
            "model_handle": model_handle,
            "prompts": plan::distribute(*rows as usize, scenes),
            "aspect_ratio": aspect_ratio,
            "images_per_row": IMAGES_PER_ROW,
        }),
        JobOp::Sample { model_handle, .. } => json!({
            "model_handle": model_handle,
            "prompts": plan::distribute(SAMPLE_ROWS as usize, &sample_scenes()),
            "aspect_ratio": DEFAULT_ASPECT_RATIO,
            "images_per_row": IMAGES_PER_ROW,
        }),
        JobOp::Video { input, .. } => input.clone(),
        JobOp::Remake {
            model_handle,
            prompt,
            aspect_ratio,
            ..
        } => json!({
            "model_handle": model_handle,
            "prompts": [prompt],
            "aspect_ratio": aspect_ratio,
            "images_per_row": IMAGES_PER_ROW,
        }),
        JobOp::Upscale { image_urls, .. } => json!({ "source_images": image_urls }),
    }
}

fn sample_scenes() -> Vec<String> {
    SAMPLE_SCENES.iter().map(|s| s.to_string()).collect()
}

fn ready_model_handle(subject: &Subject) -> Result<String, OrchestratorError> {
    if subject.status != SubjectStatus::Ready.id() {
        return Err(OrchestratorError::Conflict(format!(
            "subject {} has no trained model yet",
            subject.id
        )));
    }
    subject.model_handle.clone().ok_or_else(|| {
        OrchestratorError::Internal(format!(
            "subject {} is ready but has no model handle",
            subject.id
        ))
    })
}

fn job_kind_str(kind: CodeId) -> Result<&'static str, OrchestratorError> {
    JobKind::from_id(kind)
        .map(JobKind::as_str)
        .ok_or_else(|| OrchestratorError::Internal(format!("unknown job kind code {kind}")))
}

fn encode_context(ctx: &JobContext) -> Result<serde_json::Value, OrchestratorError> {
    serde_json::to_value(ctx)
        .map_err(|err| OrchestratorError::Internal(format!("encoding job context: {err}")))
}

fn decode_context(job: &Job) -> Result<JobContext, OrchestratorError> {
    serde_json::from_value(job.payload.clone()).map_err(|err| {
        OrchestratorError::Internal(format!("job {} has an unreadable payload: {err}", job.id))
    })
}

fn unexpected_shape() -> OrchestratorError {
    OrchestratorError::Internal("reconciliation produced an unexpected artifact kind".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_submit_input_carries_one_prompt_per_row() {
        let op = JobOp::Batch {
            subject_id: 1,
            model_handle: "mdl".into(),
            scenes: vec!["beach".into(), "office".into()],
            rows: 5,
            aspect_ratio: "2:3".into(),
        };
        let input = submit_input(&op);
        let prompts = input["prompts"].as_array().unwrap();
        assert_eq!(prompts.len(), 5);
        // 5 rows over 2 scenes: first scene gets the remainder.
        assert_eq!(prompts[0], "beach");
        assert_eq!(prompts[2], "beach");
        assert_eq!(prompts[3], "office");
        assert_eq!(input["images_per_row"], IMAGES_PER_ROW);
    }

    #[test]
    fn sample_submit_input_uses_stock_scenes() {
        let op = JobOp::Sample {
            subject_id: 1,
            model_handle: "mdl".into(),
        };
        let input = submit_input(&op);
        let prompts = input["prompts"].as_array().unwrap();
        assert_eq!(prompts.len(), SAMPLE_ROWS as usize);
        assert_eq!(input["aspect_ratio"], DEFAULT_ASPECT_RATIO);
    }

    #[test]
    fn train_and_video_inputs_pass_through() {
        let payload = json!({ "uploads": ["a.jpg"], "steps": 800 });
        let op = JobOp::Train {
            subject_id: 9,
            input: payload.clone(),
        };
        assert_eq!(submit_input(&op), payload);
    }

    #[test]
    fn upscale_input_carries_source_images() {
        let op = JobOp::Upscale {
            batch_id: 3,
            row_id: 12,
            image_urls: vec!["u1".into(), "u2".into()],
        };
        let input = submit_input(&op);
        assert_eq!(input["source_images"].as_array().unwrap().len(), 2);
    }
}
