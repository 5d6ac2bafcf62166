//! Shared response envelope types for API handlers.
//!
//! All API responses use a `{ "data": ... }` envelope. Use
//! [`DataResponse`] instead of ad-hoc `serde_json::json!({ "data": ... })`
//! to get compile-time type safety and consistent serialization.

use serde::Serialize;

use photoloom_core::types::DbId;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// Body of a `202 Accepted` answer for a job that is still running when
/// the in-request poll budget elapses. The job keeps running remotely;
/// `POST /jobs/{id}/check` re-attaches to it.
#[derive(Debug, Serialize)]
pub struct PendingJob {
    pub job_id: DbId,
    /// `JobState` wire name, e.g. `"polling"`.
    pub state: &'static str,
    pub timed_out: bool,
}
