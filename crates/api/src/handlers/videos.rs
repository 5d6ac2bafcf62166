//! Handlers for the `/videos` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use photoloom_core::error::CoreError;
use photoloom_core::types::DbId;
use photoloom_db::models::video::GenerateVideoRequest;
use photoloom_db::repositories::VideoRepo;

use crate::error::{AppError, AppResult};
use crate::handlers::drive_response;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/videos
///
/// Generate a short clip from a trained subject (2 credits), optionally
/// animating the images of one batch row. Answers 201 with the video
/// when generation finishes inside the request budget, else 202.
pub async fn create_video(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<GenerateVideoRequest>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.orchestrator.start_video(auth.user_id, input).await?;
    Ok(drive_response(outcome, StatusCode::CREATED))
}

/// GET /api/v1/videos
pub async fn list_videos(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let videos = VideoRepo::list_by_user(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse { data: videos }))
}

/// GET /api/v1/videos/{id}
pub async fn get_video(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(video_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let video = VideoRepo::find_by_id(&state.pool, video_id)
        .await?
        .filter(|v| v.user_id == auth.user_id)
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "video",
            id: video_id,
        }))?;
    Ok(Json(DataResponse { data: video }))
}
