//! Timed-out jobs, caller re-attachment, and the resume sweeper.

mod support;

use std::time::Duration;

use assert_matches::assert_matches;

use photoloom_compute::{ComputeError, RemoteStatus};
use photoloom_db::models::batch::GenerateBatchRequest;
use photoloom_db::models::job::{Job, NewJob};
use photoloom_db::models::status::{JobKind, JobState, SubjectStatus, TransactionKind};
use photoloom_db::store::Store;
use photoloom_orchestrator::{
    CheckOutcome, DriveOutcome, JobContext, JobOp, OrchestratorError,
};

use support::*;

fn batch_request(subject_id: i64, rows: u32) -> GenerateBatchRequest {
    GenerateBatchRequest {
        subject_id,
        scenes: vec!["beach".to_string()],
        rows,
        aspect_ratio: None,
    }
}

/// A batch job already submitted and polling under `handle`, as if an
/// earlier process had driven it partway and died.
async fn inflight_batch_job(h: &Harness, user: i64, subject: i64, rows: u32, handle: &str) -> Job {
    let ctx = JobContext::new(JobOp::Batch {
        subject_id: subject,
        model_handle: "mdl_1".to_string(),
        scenes: vec!["beach".to_string()],
        rows,
        aspect_ratio: "1:1".to_string(),
    });
    let job = h
        .store
        .authorize_job(
            NewJob {
                user_id: user,
                kind: JobKind::GenerateBatch.id(),
                credits_reserved: rows as i64,
                payload: serde_json::to_value(&ctx).unwrap(),
            },
            "generation batch",
        )
        .await
        .unwrap();
    let job = h
        .store
        .mark_job_submitted(job.id, handle)
        .await
        .unwrap()
        .unwrap();
    h.store.mark_job_polling(job.id).await.unwrap();
    h.store.job(job.id).unwrap()
}

// ---------------------------------------------------------------------------
// Local timeouts
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn timeout_leaves_job_polling_with_debit_intact() {
    let h = harness();
    let user = h.store.seed_user(10);
    let subject = h
        .store
        .seed_subject(user, SubjectStatus::Ready, Some("mdl_1"));

    // No script: the provider reports Running forever.
    let outcome = h
        .orchestrator
        .start_batch(user, batch_request(subject, 3))
        .await
        .unwrap();

    let job = assert_matches!(outcome, DriveOutcome::Pending(job) => job);
    assert_eq!(job.state, JobState::Polling.id());
    assert_eq!(job.external_handle.as_deref(), Some("h1"));
    assert!(h.provider.poll_count("h1") >= 2);

    // The reservation stands; a timeout is not a failure.
    assert_eq!(h.store.balance_of(user), 7);
    assert!(h
        .store
        .transactions_of(user)
        .iter()
        .all(|t| t.kind != TransactionKind::Refund.id()));
}

#[tokio::test(start_paused = true)]
async fn check_job_completes_a_timed_out_job() {
    let h = harness();
    let user = h.store.seed_user(10);
    let subject = h
        .store
        .seed_subject(user, SubjectStatus::Ready, Some("mdl_1"));

    let outcome = h
        .orchestrator
        .start_batch(user, batch_request(subject, 3))
        .await
        .unwrap();
    let job = assert_matches!(outcome, DriveOutcome::Pending(job) => job);

    // The remote work finishes while nobody is attached.
    h.provider.script_poll("h1", RemoteStatus::Succeeded);
    h.provider.set_result("h1", batch_artifact(3));

    let outcome = h.orchestrator.check_job(user, job.id).await.unwrap();
    let job = assert_matches!(outcome, CheckOutcome::Terminal(job) => job);
    assert_eq!(job.state, JobState::Succeeded.id());

    let batches = h.store.batches_of(user);
    assert_eq!(batches.len(), 1);
    assert_eq!(h.store.rows_of(batches[0].id).len(), 3);

    // One debit across both attempts, no refunds.
    assert_eq!(h.store.balance_of(user), 7);
    let debits: Vec<_> = h
        .store
        .transactions_of(user)
        .into_iter()
        .filter(|t| t.kind == TransactionKind::Debit.id())
        .collect();
    assert_eq!(debits.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn check_job_reports_running_while_remote_still_works() {
    let h = harness();
    let user = h.store.seed_user(10);
    let subject = h
        .store
        .seed_subject(user, SubjectStatus::Ready, Some("mdl_1"));

    let outcome = h
        .orchestrator
        .start_batch(user, batch_request(subject, 3))
        .await
        .unwrap();
    let job = assert_matches!(outcome, DriveOutcome::Pending(job) => job);

    let outcome = h.orchestrator.check_job(user, job.id).await.unwrap();
    let job = assert_matches!(outcome, CheckOutcome::Running(job) => job);
    assert_eq!(job.state, JobState::Polling.id());
    assert_eq!(h.store.balance_of(user), 7);
}

#[tokio::test(start_paused = true)]
async fn check_job_returns_terminal_rows_without_polling_again() {
    let h = harness();
    let user = h.store.seed_user(10);
    let subject = h
        .store
        .seed_subject(user, SubjectStatus::Ready, Some("mdl_1"));

    h.provider.script_poll(
        "h1",
        RemoteStatus::Failed {
            reason: "boom".into(),
        },
    );
    let _ = h
        .orchestrator
        .start_batch(user, batch_request(subject, 3))
        .await;
    let polls_before = h.provider.poll_count("h1");

    let job_id = h.store.all_jobs()[0].id;
    let outcome = h.orchestrator.check_job(user, job_id).await.unwrap();
    let job = assert_matches!(outcome, CheckOutcome::Terminal(job) => job);
    assert_eq!(job.state, JobState::Failed.id());
    assert_eq!(h.provider.poll_count("h1"), polls_before);
}

#[tokio::test(start_paused = true)]
async fn check_job_hides_other_users_jobs() {
    let h = harness();
    let owner = h.store.seed_user(10);
    let intruder = h.store.seed_user(10);
    let subject = h
        .store
        .seed_subject(owner, SubjectStatus::Ready, Some("mdl_1"));

    let outcome = h
        .orchestrator
        .start_batch(owner, batch_request(subject, 2))
        .await
        .unwrap();
    let job = assert_matches!(outcome, DriveOutcome::Pending(job) => job);

    let err = h
        .orchestrator
        .check_job(intruder, job.id)
        .await
        .unwrap_err();
    assert_matches!(err, OrchestratorError::NotFound { entity: "job", .. });

    let err = h.orchestrator.check_job(owner, 9999).await.unwrap_err();
    assert_matches!(err, OrchestratorError::NotFound { entity: "job", .. });
}

// ---------------------------------------------------------------------------
// The resume sweeper
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn sweep_expires_jobs_that_never_reached_the_provider() {
    let h = harness();
    let user = h.store.seed_user(10);

    let job = h
        .store
        .authorize_job(
            NewJob {
                user_id: user,
                kind: JobKind::GenerateBatch.id(),
                credits_reserved: 4,
                payload: serde_json::json!({}),
            },
            "generation batch",
        )
        .await
        .unwrap();
    assert_eq!(h.store.balance_of(user), 6);
    h.store.age_job(job.id, 700);

    let stats = h
        .orchestrator
        .sweep_once(Duration::from_secs(600))
        .await
        .unwrap();
    assert_eq!(stats.expired, 1);
    assert_eq!(stats.finished, 0);
    assert_eq!(stats.errors, 0);

    let job = h.store.job(job.id).unwrap();
    assert_eq!(job.state, JobState::Failed.id());
    assert_eq!(job.error.as_deref(), Some("expired before submission"));
    assert_eq!(h.store.balance_of(user), 10);
    assert_eq!(h.store.ledger_sum(user), 10);
}

#[tokio::test(start_paused = true)]
async fn sweep_resumes_stale_polling_jobs_to_completion() {
    let h = harness();
    let user = h.store.seed_user(10);
    let subject = h
        .store
        .seed_subject(user, SubjectStatus::Ready, Some("mdl_1"));

    let job = inflight_batch_job(&h, user, subject, 2, "h9").await;
    h.store.age_job(job.id, 700);

    h.provider.script_poll("h9", RemoteStatus::Succeeded);
    h.provider.set_result("h9", batch_artifact(2));

    let stats = h
        .orchestrator
        .sweep_once(Duration::from_secs(600))
        .await
        .unwrap();
    assert_eq!(stats.finished, 1);
    assert_eq!(stats.expired, 0);

    assert_eq!(h.store.job(job.id).unwrap().state, JobState::Succeeded.id());
    let batches = h.store.batches_of(user);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].credits_used, 2);
    let rows = h.store.rows_of(batches[0].id);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.prompt == "beach"));
}

#[tokio::test(start_paused = true)]
async fn sweep_settles_resumed_jobs_that_failed_remotely() {
    let h = harness();
    let user = h.store.seed_user(10);
    let subject = h
        .store
        .seed_subject(user, SubjectStatus::Ready, Some("mdl_1"));

    let job = inflight_batch_job(&h, user, subject, 2, "h9").await;
    h.store.age_job(job.id, 700);

    h.provider.script_poll(
        "h9",
        RemoteStatus::Failed {
            reason: "gpu lost".into(),
        },
    );

    let stats = h
        .orchestrator
        .sweep_once(Duration::from_secs(600))
        .await
        .unwrap();
    // Settling on a failure is still a finished job.
    assert_eq!(stats.finished, 1);

    let job = h.store.job(job.id).unwrap();
    assert_eq!(job.state, JobState::Failed.id());
    assert_eq!(job.error.as_deref(), Some("gpu lost"));
    assert_eq!(h.store.balance_of(user), 10);
}

#[tokio::test(start_paused = true)]
async fn sweep_fails_jobs_whose_handle_the_provider_forgot() {
    let h = harness();
    let user = h.store.seed_user(10);
    let subject = h
        .store
        .seed_subject(user, SubjectStatus::Ready, Some("mdl_1"));

    let job = inflight_batch_job(&h, user, subject, 2, "h9").await;
    h.store.age_job(job.id, 700);

    h.provider
        .script_poll_error("h9", ComputeError::UnknownHandle("h9".into()));

    let stats = h
        .orchestrator
        .sweep_once(Duration::from_secs(600))
        .await
        .unwrap();
    assert_eq!(stats.finished, 1);

    let job = h.store.job(job.id).unwrap();
    assert_eq!(job.state, JobState::Failed.id());
    assert!(job.error.as_deref().unwrap().contains("unknown job handle"));
    assert_eq!(h.store.balance_of(user), 10);
}

#[tokio::test(start_paused = true)]
async fn sweep_spares_jobs_inside_the_grace_window() {
    let h = harness();
    let user = h.store.seed_user(10);
    let subject = h
        .store
        .seed_subject(user, SubjectStatus::Ready, Some("mdl_1"));

    let job = inflight_batch_job(&h, user, subject, 2, "h9").await;
    h.store.age_job(job.id, 100);

    let stats = h
        .orchestrator
        .sweep_once(Duration::from_secs(600))
        .await
        .unwrap();
    assert_eq!(stats.expired, 0);
    assert_eq!(stats.finished, 0);
    assert_eq!(stats.still_running, 0);

    assert_eq!(h.store.job(job.id).unwrap().state, JobState::Polling.id());
    assert_eq!(h.provider.poll_count("h9"), 0);
}

#[tokio::test(start_paused = true)]
async fn sweep_keeps_unfinished_resumed_jobs_pending() {
    let h = harness();
    let user = h.store.seed_user(10);
    let subject = h
        .store
        .seed_subject(user, SubjectStatus::Ready, Some("mdl_1"));

    let job = inflight_batch_job(&h, user, subject, 2, "h9").await;
    h.store.age_job(job.id, 700);

    // Unscripted: still Running remotely.
    let stats = h
        .orchestrator
        .sweep_once(Duration::from_secs(600))
        .await
        .unwrap();
    assert_eq!(stats.still_running, 1);
    assert_eq!(h.store.job(job.id).unwrap().state, JobState::Polling.id());
    assert_eq!(h.store.balance_of(user), 8);
}
