//! Request handlers, one module per resource.

pub mod batches;
pub mod credits;
pub mod jobs;
pub mod subjects;
pub mod users;
pub mod videos;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use photoloom_db::models::job::Job;
use photoloom_db::models::status::JobState;
use photoloom_orchestrator::DriveOutcome;

use crate::response::{DataResponse, PendingJob};

/// Wire name of a job state code.
pub(crate) fn state_name(state: photoloom_db::models::status::CodeId) -> &'static str {
    JobState::from_id(state).map_or("unknown", JobState::as_str)
}

/// `202 Accepted` answer for a job the in-request budget could not see
/// to the end.
pub(crate) fn accepted(job: &Job) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: PendingJob {
                job_id: job.id,
                state: state_name(job.state),
                timed_out: true,
            },
        }),
    )
        .into_response()
}

/// Map a drive outcome to a response: the finished artifact under
/// `completed_status`, or `202` with the pending-job body.
pub(crate) fn drive_response<T: Serialize>(
    outcome: DriveOutcome<T>,
    completed_status: StatusCode,
) -> Response {
    match outcome {
        DriveOutcome::Completed(data) => {
            (completed_status, Json(DataResponse { data })).into_response()
        }
        DriveOutcome::Pending(job) => accepted(&job),
    }
}
