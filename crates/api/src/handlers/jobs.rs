//! Handlers for the `/jobs` resource.
//!
//! Jobs are created by the launch endpoints (train, batches, videos,
//! remake, upscale); here callers inspect them and re-attach to ones
//! that outlived their original request.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use photoloom_core::error::CoreError;
use photoloom_core::types::{Credits, DbId, Timestamp};
use photoloom_db::models::job::{Job, JobListQuery};
use photoloom_db::models::status::CodeId;
use photoloom_db::repositories::JobRepo;
use photoloom_orchestrator::CheckOutcome;

use crate::error::{AppError, AppResult};
use crate::handlers::{accepted, state_name};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// What the caller sees of a job row.
///
/// The payload column is the orchestrator's resubmission context, not
/// part of the API contract, so it is not exposed.
#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: DbId,
    pub kind: CodeId,
    pub state: &'static str,
    pub credits_reserved: Credits,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub terminal_at: Option<Timestamp>,
}

impl From<Job> for JobView {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            state: state_name(job.state),
            credits_reserved: job.credits_reserved,
            result: job.result,
            error: job.error,
            created_at: job.created_at,
            terminal_at: job.terminal_at,
        }
    }
}

/// GET /api/v1/jobs
///
/// The caller's jobs, newest first. Supports `state`, `limit`, and
/// `offset` query parameters.
pub async fn list_jobs(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = JobRepo::list_by_user(&state.pool, auth.user_id, &params).await?;
    let views: Vec<JobView> = jobs.into_iter().map(JobView::from).collect();
    Ok(Json(DataResponse { data: views }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = JobRepo::find_by_id(&state.pool, job_id)
        .await?
        .filter(|j| j.user_id == auth.user_id)
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "job",
            id: job_id,
        }))?;
    Ok(Json(DataResponse {
        data: JobView::from(job),
    }))
}

/// POST /api/v1/jobs/{id}/check
///
/// Re-attach to a job for one bounded poll. Answers 200 with the
/// terminal job when it has finished (or, for a finished training run
/// whose job row is gone, a bare succeeded marker), else 202 with the
/// still-pending job.
pub async fn check_job(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<Response> {
    let outcome = state.orchestrator.check_job(auth.user_id, job_id).await?;
    let response = match outcome {
        CheckOutcome::Terminal(job) => (
            StatusCode::OK,
            Json(DataResponse {
                data: JobView::from(job),
            }),
        )
            .into_response(),
        CheckOutcome::Finished => (
            StatusCode::OK,
            Json(DataResponse {
                data: serde_json::json!({ "id": job_id, "state": "succeeded" }),
            }),
        )
            .into_response(),
        CheckOutcome::Running(job) => accepted(&job),
    };
    Ok(response)
}
