//! Handlers for the `/subjects` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use photoloom_core::error::CoreError;
use photoloom_core::types::DbId;
use photoloom_db::models::subject::{CreateSubject, Subject, TrainSubject};
use photoloom_db::repositories::SubjectRepo;

use crate::error::{AppError, AppResult};
use crate::handlers::drive_response;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Longest accepted subject name.
const MAX_NAME_LEN: usize = 100;

/// Fetch a subject and verify the caller owns it. A subject belonging
/// to someone else is reported as not found, never as forbidden.
async fn find_owned(
    pool: &sqlx::PgPool,
    subject_id: DbId,
    auth: &AuthUser,
) -> AppResult<Subject> {
    let subject = SubjectRepo::find_by_id(pool, subject_id)
        .await?
        .filter(|s| s.user_id == auth.user_id)
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "subject",
            id: subject_id,
        }))?;
    Ok(subject)
}

/// POST /api/v1/subjects
///
/// Create a subject in `pending` status. Returns 201.
pub async fn create_subject(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateSubject>,
) -> AppResult<impl IntoResponse> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "Subject name must not be empty".into(),
        )));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Subject name must be at most {MAX_NAME_LEN} characters"
        ))));
    }

    let input = CreateSubject { name: name.to_string() };
    let subject = SubjectRepo::create(&state.pool, auth.user_id, &input).await?;

    tracing::info!(subject_id = subject.id, user_id = auth.user_id, "Subject created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: subject })))
}

/// GET /api/v1/subjects
pub async fn list_subjects(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let subjects = SubjectRepo::list_by_user(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse { data: subjects }))
}

/// GET /api/v1/subjects/{id}
pub async fn get_subject(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(subject_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let subject = find_owned(&state.pool, subject_id, &auth).await?;
    Ok(Json(DataResponse { data: subject }))
}

/// POST /api/v1/subjects/{id}/train
///
/// Launch a training run. Debits 40 credits up front; answers 200 with
/// the ready subject when training finishes inside the request budget,
/// else 202 with the pending job.
pub async fn train_subject(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(subject_id): Path<DbId>,
    Json(input): Json<TrainSubject>,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .orchestrator
        .start_training(auth.user_id, subject_id, input.input)
        .await?;
    Ok(drive_response(outcome, StatusCode::OK))
}
