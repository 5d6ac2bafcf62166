//! In-memory doubles for orchestrator tests.
//!
//! [`MemStore`] mirrors the transactional semantics of the Postgres
//! store: every trait method takes one lock, so each call is atomic
//! exactly like its production counterpart's transaction. Guarded
//! transitions (submitted-from-created, terminal-once, entitlement
//! compare-and-sets) are reproduced faithfully, since the tests exist to
//! exercise the orchestrator against precisely those guards.
//!
//! [`FakeProvider`] is scripted per handle: queued poll outcomes are
//! consumed in order, and an exhausted script reports `Running` forever,
//! which is how tests produce budget timeouts.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;

use photoloom_compute::{ComputeError, ComputeProvider, JobSpec, RemoteArtifact, RemoteStatus};
use photoloom_core::types::{Credits, DbId, Timestamp};
use photoloom_db::models::batch::{BatchRow, GenerationBatch, NewBatch, IMAGES_PER_ROW};
use photoloom_db::models::credit::CreditTransaction;
use photoloom_db::models::job::{Job, NewJob};
use photoloom_db::models::status::{JobKind, JobState, SubjectStatus, TransactionKind};
use photoloom_db::models::subject::Subject;
use photoloom_db::models::video::{GeneratedVideo, NewVideo};
use photoloom_db::store::{FailOutcome, RemakeOutcome, Store, StoreError};
use photoloom_events::{EventBus, JobEvent};
use photoloom_orchestrator::{JobOrchestrator, PollConfig};

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemStore>,
    pub provider: Arc<FakeProvider>,
    pub events: Arc<EventBus>,
    pub orchestrator: JobOrchestrator,
}

/// Fast polling so paused-clock tests converge in a handful of ticks.
pub fn test_poll_config() -> PollConfig {
    PollConfig {
        interval: Duration::from_secs(1),
        submit_wait: Duration::from_secs(8),
        check_wait: Duration::from_secs(4),
        max_transient_errors: 3,
    }
}

pub fn harness() -> Harness {
    let store = Arc::new(MemStore::new());
    let provider = Arc::new(FakeProvider::new());
    let events = Arc::new(EventBus::default());
    let orchestrator = JobOrchestrator::new(
        store.clone(),
        provider.clone(),
        events.clone(),
        test_poll_config(),
    );
    Harness {
        store,
        provider,
        events,
        orchestrator,
    }
}

/// Drain everything currently buffered on an event subscription.
pub fn drain_events(
    rx: &mut tokio::sync::broadcast::Receiver<JobEvent>,
) -> Vec<JobEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

// ---------------------------------------------------------------------------
// Artifact builders
// ---------------------------------------------------------------------------

pub fn image_files(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("https://cdn.photoloom.test/out/{i}.png"))
        .collect()
}

pub fn batch_artifact(rows: usize) -> RemoteArtifact {
    let files = image_files(rows * IMAGES_PER_ROW);
    RemoteArtifact {
        raw: json!({ "files": files }),
        files,
    }
}

pub fn row_artifact() -> RemoteArtifact {
    batch_artifact(1)
}

pub fn train_artifact(model_handle: &str) -> RemoteArtifact {
    RemoteArtifact {
        files: Vec::new(),
        raw: json!({ "model_handle": model_handle }),
    }
}

pub fn video_artifact(url: &str) -> RemoteArtifact {
    RemoteArtifact {
        files: vec![url.to_string()],
        raw: json!({ "files": [url] }),
    }
}

// ---------------------------------------------------------------------------
// MemStore
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemState {
    next_id: DbId,
    accounts: HashMap<DbId, Credits>,
    transactions: Vec<CreditTransaction>,
    jobs: HashMap<DbId, Job>,
    subjects: HashMap<DbId, Subject>,
    batches: HashMap<DbId, GenerationBatch>,
    rows: HashMap<DbId, BatchRow>,
    videos: HashMap<DbId, GeneratedVideo>,
}

impl MemState {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn record_transaction(
        &mut self,
        user_id: DbId,
        kind: TransactionKind,
        credits_change: Credits,
        description: &str,
    ) -> CreditTransaction {
        let balance_after = {
            let balance = self.accounts.entry(user_id).or_insert(0);
            *balance += credits_change;
            *balance
        };
        let tx = CreditTransaction {
            id: self.next_id(),
            user_id,
            kind: kind.id(),
            credits_change,
            balance_after,
            description: description.to_string(),
            created_at: Utc::now(),
        };
        self.transactions.push(tx.clone());
        tx
    }

    fn create_job(&mut self, input: &NewJob) -> Job {
        let job = Job {
            id: self.next_id(),
            user_id: input.user_id,
            kind: input.kind,
            state: JobState::Created.id(),
            external_handle: None,
            credits_reserved: input.credits_reserved,
            payload: input.payload.clone(),
            result: None,
            error: None,
            created_at: Utc::now(),
            submitted_at: None,
            terminal_at: None,
        };
        self.jobs.insert(job.id, job.clone());
        job
    }

    fn debit_for(&mut self, input: &NewJob, description: &str) -> Result<(), StoreError> {
        if input.credits_reserved == 0 {
            return Ok(());
        }
        let available = self.accounts.get(&input.user_id).copied().unwrap_or(0);
        if available < input.credits_reserved {
            return Err(StoreError::InsufficientCredits {
                required: input.credits_reserved,
                available,
            });
        }
        self.record_transaction(
            input.user_id,
            TransactionKind::Debit,
            -input.credits_reserved,
            description,
        );
        Ok(())
    }

    fn live_job(&self, job_id: DbId) -> Result<Job, StoreError> {
        let Some(job) = self.jobs.get(&job_id) else {
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
        Ok(job.clone())
    }

    fn finish_job(&mut self, job_id: DbId, result: serde_json::Value) {
        if let Some(job) = self.jobs.get_mut(&job_id) {
            job.state = JobState::Succeeded.id();
            job.result = Some(result);
            job.terminal_at = Some(Utc::now());
        }
    }
}

pub struct MemStore {
    state: Mutex<MemState>,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemState::default()),
        }
    }

    // ---- seeding ----

    pub fn seed_user(&self, starting_credits: Credits) -> DbId {
        let mut s = self.state.lock().unwrap();
        let user_id = s.next_id();
        s.accounts.insert(user_id, 0);
        if starting_credits > 0 {
            s.record_transaction(
                user_id,
                TransactionKind::Purchase,
                starting_credits,
                "seed purchase",
            );
        }
        user_id
    }

    pub fn seed_subject(
        &self,
        user_id: DbId,
        status: SubjectStatus,
        model_handle: Option<&str>,
    ) -> DbId {
        let mut s = self.state.lock().unwrap();
        let id = s.next_id();
        s.subjects.insert(
            id,
            Subject {
                id,
                user_id,
                name: format!("subject-{id}"),
                status: status.id(),
                model_handle: model_handle.map(String::from),
                pending_job_id: None,
                created_at: Utc::now(),
                trained_at: None,
            },
        );
        id
    }

    pub fn seed_batch(&self, user_id: DbId, subject_id: DbId, rows: usize) -> DbId {
        let mut s = self.state.lock().unwrap();
        let batch_id = s.next_id();
        s.batches.insert(
            batch_id,
            GenerationBatch {
                id: batch_id,
                user_id,
                subject_id,
                aspect_ratio: "1:1".to_string(),
                credits_used: rows as Credits,
                remake_used: false,
                upscale_used: false,
                created_at: Utc::now(),
            },
        );
        for index in 0..rows {
            let row_id = s.next_id();
            s.rows.insert(
                row_id,
                BatchRow {
                    id: row_id,
                    batch_id,
                    row_index: index as i32,
                    prompt: format!("scene {index}"),
                    image_urls: (0..IMAGES_PER_ROW)
                        .map(|i| format!("https://cdn.photoloom.test/seed/{row_id}/{i}.png"))
                        .collect(),
                    upscaled_urls: None,
                    created_at: Utc::now(),
                },
            );
        }
        batch_id
    }

    /// Backdate a job so the sweeper's cutoff sees it as stale.
    pub fn age_job(&self, job_id: DbId, seconds: i64) {
        let mut s = self.state.lock().unwrap();
        if let Some(job) = s.jobs.get_mut(&job_id) {
            let shift = chrono::Duration::seconds(seconds);
            job.created_at -= shift;
            if let Some(at) = job.submitted_at.as_mut() {
                *at -= shift;
            }
        }
    }

    // ---- inspection ----

    pub fn job(&self, job_id: DbId) -> Option<Job> {
        self.state.lock().unwrap().jobs.get(&job_id).cloned()
    }

    pub fn all_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.state.lock().unwrap().jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.id);
        jobs
    }

    pub fn subject(&self, id: DbId) -> Option<Subject> {
        self.state.lock().unwrap().subjects.get(&id).cloned()
    }

    pub fn batch(&self, id: DbId) -> Option<GenerationBatch> {
        self.state.lock().unwrap().batches.get(&id).cloned()
    }

    pub fn batches_of(&self, user_id: DbId) -> Vec<GenerationBatch> {
        let mut out: Vec<GenerationBatch> = self
            .state
            .lock()
            .unwrap()
            .batches
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by_key(|b| b.id);
        out
    }

    pub fn rows_of(&self, batch_id: DbId) -> Vec<BatchRow> {
        let mut rows: Vec<BatchRow> = self
            .state
            .lock()
            .unwrap()
            .rows
            .values()
            .filter(|r| r.batch_id == batch_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.row_index);
        rows
    }

    pub fn row(&self, row_id: DbId) -> Option<BatchRow> {
        self.state.lock().unwrap().rows.get(&row_id).cloned()
    }

    pub fn videos_of(&self, user_id: DbId) -> Vec<GeneratedVideo> {
        let mut out: Vec<GeneratedVideo> = self
            .state
            .lock()
            .unwrap()
            .videos
            .values()
            .filter(|v| v.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by_key(|v| v.id);
        out
    }

    pub fn transactions_of(&self, user_id: DbId) -> Vec<CreditTransaction> {
        self.state
            .lock()
            .unwrap()
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn balance_of(&self, user_id: DbId) -> Credits {
        self.state
            .lock()
            .unwrap()
            .accounts
            .get(&user_id)
            .copied()
            .unwrap_or(0)
    }

    /// Sum of all ledger deltas for a user; the ledger invariant says
    /// this always equals the balance.
    pub fn ledger_sum(&self, user_id: DbId) -> Credits {
        self.state
            .lock()
            .unwrap()
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.credits_change)
            .sum()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn balance(&self, user_id: DbId) -> Result<Credits, StoreError> {
        Ok(self.balance_of(user_id))
    }

    async fn purchase_credits(
        &self,
        user_id: DbId,
        amount: Credits,
        description: &str,
    ) -> Result<CreditTransaction, StoreError> {
        if amount <= 0 {
            return Err(StoreError::InvalidAmount { amount });
        }
        let mut s = self.state.lock().unwrap();
        Ok(s.record_transaction(user_id, TransactionKind::Purchase, amount, description))
    }

    async fn authorize_job(&self, input: NewJob, description: &str) -> Result<Job, StoreError> {
        let mut s = self.state.lock().unwrap();
        s.debit_for(&input, description)?;
        Ok(s.create_job(&input))
    }

    async fn authorize_train_job(
        &self,
        subject_id: DbId,
        input: NewJob,
        description: &str,
    ) -> Result<Job, StoreError> {
        let mut s = self.state.lock().unwrap();
        // Checks precede writes so a refused authorization leaves no
        // trace, like the rolled-back transaction in the real store.
        let startable = s.subjects.get(&subject_id).is_some_and(|subject| {
            matches!(
                SubjectStatus::from_id(subject.status),
                Some(SubjectStatus::Pending | SubjectStatus::Failed)
            )
        });
        let available = s.accounts.get(&input.user_id).copied().unwrap_or(0);
        if input.credits_reserved > 0 && available < input.credits_reserved {
            return Err(StoreError::InsufficientCredits {
                required: input.credits_reserved,
                available,
            });
        }
        if !startable {
            return Err(StoreError::Conflict(format!(
                "subject {subject_id} is already training or trained"
            )));
        }

        s.debit_for(&input, description)?;
        let job = s.create_job(&input);
        if let Some(subject) = s.subjects.get_mut(&subject_id) {
            subject.status = SubjectStatus::Training.id();
            subject.pending_job_id = Some(job.id);
        }
        Ok(job)
    }

    async fn mark_job_submitted(
        &self,
        job_id: DbId,
        external_handle: &str,
    ) -> Result<Option<Job>, StoreError> {
        let mut s = self.state.lock().unwrap();
        match s.jobs.get_mut(&job_id) {
            Some(job) if job.state == JobState::Created.id() => {
                job.state = JobState::Submitted.id();
                job.external_handle = Some(external_handle.to_string());
                job.submitted_at = Some(Utc::now());
                Ok(Some(job.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_job_polling(&self, job_id: DbId) -> Result<(), StoreError> {
        let mut s = self.state.lock().unwrap();
        if let Some(job) = s.jobs.get_mut(&job_id) {
            if job.state == JobState::Submitted.id() {
                job.state = JobState::Polling.id();
            }
        }
        Ok(())
    }

    async fn find_job(&self, job_id: DbId) -> Result<Option<Job>, StoreError> {
        Ok(self.job(job_id))
    }

    async fn find_subject(&self, subject_id: DbId) -> Result<Option<Subject>, StoreError> {
        Ok(self.subject(subject_id))
    }

    async fn find_batch(&self, batch_id: DbId) -> Result<Option<GenerationBatch>, StoreError> {
        Ok(self.batch(batch_id))
    }

    async fn find_batch_row(
        &self,
        batch_id: DbId,
        row_index: i32,
    ) -> Result<Option<BatchRow>, StoreError> {
        Ok(self
            .rows_of(batch_id)
            .into_iter()
            .find(|r| r.row_index == row_index))
    }

    async fn find_batch_row_by_id(&self, row_id: DbId) -> Result<Option<BatchRow>, StoreError> {
        Ok(self.row(row_id))
    }

    async fn list_resumable_jobs(
        &self,
        stale_before: Timestamp,
    ) -> Result<Vec<Job>, StoreError> {
        let s = self.state.lock().unwrap();
        let mut jobs: Vec<Job> = s
            .jobs
            .values()
            .filter(|j| {
                (j.state == JobState::Submitted.id() || j.state == JobState::Polling.id())
                    && j.submitted_at.unwrap_or(j.created_at) < stale_before
            })
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn list_stale_unsubmitted_jobs(
        &self,
        stale_before: Timestamp,
    ) -> Result<Vec<Job>, StoreError> {
        let s = self.state.lock().unwrap();
        let mut jobs: Vec<Job> = s
            .jobs
            .values()
            .filter(|j| j.state == JobState::Created.id() && j.created_at < stale_before)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.id);
        Ok(jobs)
    }

    async fn fail_job_and_refund(
        &self,
        job_id: DbId,
        error: &str,
    ) -> Result<FailOutcome, StoreError> {
        let mut s = self.state.lock().unwrap();
        let Some(job) = s.jobs.get(&job_id).cloned() else {
            return Err(StoreError::NotFound {
                entity: "job",
                id: job_id,
            });
        };
        if JobState::from_id(job.state).is_some_and(|st| st.is_terminal()) {
            return Ok(FailOutcome::AlreadyTerminal);
        }

        if let Some(j) = s.jobs.get_mut(&job_id) {
            j.state = JobState::Failed.id();
            j.error = Some(error.to_string());
            j.terminal_at = Some(Utc::now());
        }
        if job.kind == JobKind::Train.id() {
            let subject = s
                .subjects
                .values_mut()
                .find(|su| su.pending_job_id == Some(job_id));
            if let Some(subject) = subject {
                if subject.status == SubjectStatus::Training.id() {
                    subject.status = SubjectStatus::Failed.id();
                    subject.pending_job_id = None;
                }
            }
        }

        let refund = if job.credits_reserved > 0 {
            let kind_name = JobKind::from_id(job.kind).map_or("job", JobKind::as_str);
            let description = format!("refund: {kind_name} job {job_id}");
            Some(s.record_transaction(
                job.user_id,
                TransactionKind::Refund,
                job.credits_reserved,
                &description,
            ))
        } else {
            None
        };
        Ok(FailOutcome::Failed { refund })
    }

    async fn complete_train_job(
        &self,
        job_id: DbId,
        subject_id: DbId,
        model_handle: &str,
    ) -> Result<(), StoreError> {
        let mut s = self.state.lock().unwrap();
        s.live_job(job_id)?;
        if let Some(subject) = s.subjects.get_mut(&subject_id) {
            subject.status = SubjectStatus::Ready.id();
            subject.model_handle = Some(model_handle.to_string());
            subject.pending_job_id = None;
            subject.trained_at = Some(Utc::now());
        }
        s.jobs.remove(&job_id);
        Ok(())
    }

    async fn complete_batch_job(
        &self,
        job_id: DbId,
        batch: NewBatch,
    ) -> Result<GenerationBatch, StoreError> {
        let mut s = self.state.lock().unwrap();
        s.live_job(job_id)?;
        let batch_id = s.next_id();
        let created = GenerationBatch {
            id: batch_id,
            user_id: batch.user_id,
            subject_id: batch.subject_id,
            aspect_ratio: batch.aspect_ratio.clone(),
            credits_used: batch.credits_used,
            remake_used: false,
            upscale_used: false,
            created_at: Utc::now(),
        };
        s.batches.insert(batch_id, created.clone());
        for (index, row) in batch.rows.iter().enumerate() {
            let row_id = s.next_id();
            s.rows.insert(
                row_id,
                BatchRow {
                    id: row_id,
                    batch_id,
                    row_index: index as i32,
                    prompt: row.prompt.clone(),
                    image_urls: row.image_urls.clone(),
                    upscaled_urls: None,
                    created_at: Utc::now(),
                },
            );
        }
        s.finish_job(job_id, json!({ "batch_id": batch_id }));
        Ok(created)
    }

    async fn complete_video_job(
        &self,
        job_id: DbId,
        video: NewVideo,
    ) -> Result<GeneratedVideo, StoreError> {
        let mut s = self.state.lock().unwrap();
        s.live_job(job_id)?;
        let id = s.next_id();
        let created = GeneratedVideo {
            id,
            user_id: video.user_id,
            subject_id: video.subject_id,
            source_row_id: video.source_row_id,
            video_url: video.video_url.clone(),
            credits_used: video.credits_used,
            created_at: Utc::now(),
        };
        s.videos.insert(id, created.clone());
        s.finish_job(job_id, json!({ "video_id": id, "video_url": created.video_url }));
        Ok(created)
    }

    async fn complete_remake_job(
        &self,
        job_id: DbId,
        batch_id: DbId,
        row_id: DbId,
        image_urls: Vec<String>,
    ) -> Result<RemakeOutcome, StoreError> {
        let mut s = self.state.lock().unwrap();
        s.live_job(job_id)?;

        let claimed = match s.batches.get_mut(&batch_id) {
            Some(batch) if !batch.remake_used && !batch.upscale_used => {
                batch.remake_used = true;
                true
            }
            _ => false,
        };
        if !claimed {
            if let Some(job) = s.jobs.get_mut(&job_id) {
                job.state = JobState::Failed.id();
                job.error = Some("remake entitlement no longer available".to_string());
                job.terminal_at = Some(Utc::now());
            }
            return Ok(RemakeOutcome::EntitlementLost);
        }

        let Some(row) = s.rows.get_mut(&row_id) else {
            return Err(StoreError::NotFound {
                entity: "batch row",
                id: row_id,
            });
        };
        row.image_urls = image_urls;
        let row = row.clone();
        s.finish_job(
            job_id,
            json!({ "row_id": row.id, "image_urls": row.image_urls }),
        );
        Ok(RemakeOutcome::Applied(row))
    }

    async fn complete_upscale_job(
        &self,
        job_id: DbId,
        row_id: DbId,
        upscaled_urls: Vec<String>,
    ) -> Result<BatchRow, StoreError> {
        let mut s = self.state.lock().unwrap();
        s.live_job(job_id)?;
        let Some(row) = s.rows.get_mut(&row_id) else {
            return Err(StoreError::NotFound {
                entity: "batch row",
                id: row_id,
            });
        };
        row.upscaled_urls = Some(upscaled_urls);
        let row = row.clone();
        s.finish_job(
            job_id,
            json!({ "row_id": row.id, "upscaled_urls": row.upscaled_urls }),
        );
        Ok(row)
    }

    async fn consume_free_upscale(&self, batch_id: DbId) -> Result<bool, StoreError> {
        let mut s = self.state.lock().unwrap();
        match s.batches.get_mut(&batch_id) {
            Some(batch) if !batch.upscale_used => {
                batch.upscale_used = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// FakeProvider
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ProviderState {
    submit_plans: VecDeque<Result<String, ComputeError>>,
    auto_handle: u64,
    polls: HashMap<String, VecDeque<Result<RemoteStatus, ComputeError>>>,
    results: HashMap<String, VecDeque<Result<RemoteArtifact, ComputeError>>>,
    submissions: Vec<JobSpec>,
    poll_counts: HashMap<String, usize>,
}

/// Scriptable [`ComputeProvider`]. Unscripted submissions succeed with
/// sequential handles `"h1"`, `"h2"`, ...; unscripted polls report
/// `Running`.
pub struct FakeProvider {
    state: Mutex<ProviderState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProviderState::default()),
        }
    }

    pub fn fail_next_submit(&self, err: ComputeError) {
        self.state.lock().unwrap().submit_plans.push_back(Err(err));
    }

    pub fn script_poll(&self, handle: &str, status: RemoteStatus) {
        self.state
            .lock()
            .unwrap()
            .polls
            .entry(handle.to_string())
            .or_default()
            .push_back(Ok(status));
    }

    pub fn script_polls(&self, handle: &str, statuses: Vec<RemoteStatus>) {
        let mut s = self.state.lock().unwrap();
        let queue = s.polls.entry(handle.to_string()).or_default();
        for status in statuses {
            queue.push_back(Ok(status));
        }
    }

    pub fn script_poll_error(&self, handle: &str, err: ComputeError) {
        self.state
            .lock()
            .unwrap()
            .polls
            .entry(handle.to_string())
            .or_default()
            .push_back(Err(err));
    }

    pub fn set_result(&self, handle: &str, artifact: RemoteArtifact) {
        self.state
            .lock()
            .unwrap()
            .results
            .entry(handle.to_string())
            .or_default()
            .push_back(Ok(artifact));
    }

    pub fn set_result_error(&self, handle: &str, err: ComputeError) {
        self.state
            .lock()
            .unwrap()
            .results
            .entry(handle.to_string())
            .or_default()
            .push_back(Err(err));
    }

    pub fn submissions(&self) -> Vec<JobSpec> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn poll_count(&self, handle: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .poll_counts
            .get(handle)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ComputeProvider for FakeProvider {
    async fn submit(&self, spec: &JobSpec) -> Result<String, ComputeError> {
        let mut s = self.state.lock().unwrap();
        s.submissions.push(spec.clone());
        match s.submit_plans.pop_front() {
            Some(plan) => plan,
            None => {
                s.auto_handle += 1;
                Ok(format!("h{}", s.auto_handle))
            }
        }
    }

    async fn poll(&self, handle: &str) -> Result<RemoteStatus, ComputeError> {
        let mut s = self.state.lock().unwrap();
        *s.poll_counts.entry(handle.to_string()).or_insert(0) += 1;
        match s.polls.get_mut(handle).and_then(|q| q.pop_front()) {
            Some(step) => step,
            None => Ok(RemoteStatus::Running),
        }
    }

    async fn fetch_result(&self, handle: &str) -> Result<RemoteArtifact, ComputeError> {
        let mut s = self.state.lock().unwrap();
        match s.results.get_mut(handle).and_then(|q| q.pop_front()) {
            Some(plan) => plan,
            None => Err(ComputeError::Decode(format!(
                "no result scripted for {handle}"
            ))),
        }
    }
}
