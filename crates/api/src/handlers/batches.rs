//! Handlers for the `/batches` resource.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use photoloom_core::entitlement::{EntitlementState, UpscaleCharge};
use photoloom_core::error::CoreError;
use photoloom_core::types::DbId;
use photoloom_db::models::batch::{BatchRow, GenerateBatchRequest, GenerationBatch};
use photoloom_db::repositories::BatchRepo;
use photoloom_orchestrator::DriveOutcome;

use crate::error::{AppError, AppResult};
use crate::handlers::drive_response;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Full batch payload: the batch, its rows, and what the caller may
/// still do with them.
#[derive(Debug, Serialize)]
pub struct BatchDetail {
    #[serde(flatten)]
    pub batch: GenerationBatch,
    pub rows: Vec<BatchRow>,
    pub entitlements: Entitlements,
}

/// Remaining per-batch entitlements, derived from the persisted flags.
#[derive(Debug, Serialize)]
pub struct Entitlements {
    pub state: EntitlementState,
    pub remake_available: bool,
    pub upscale_charge: UpscaleCharge,
}

impl Entitlements {
    fn of(batch: &GenerationBatch) -> Self {
        let state = batch.entitlements();
        Self {
            state,
            remake_available: state.check_remake().is_ok(),
            upscale_charge: state.upscale_charge(),
        }
    }
}

/// Fetch a batch and verify the caller owns it.
async fn find_owned(
    pool: &sqlx::PgPool,
    batch_id: DbId,
    auth: &AuthUser,
) -> AppResult<GenerationBatch> {
    let batch = BatchRepo::find_by_id(pool, batch_id)
        .await?
        .filter(|b| b.user_id == auth.user_id)
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "batch",
            id: batch_id,
        }))?;
    Ok(batch)
}

async fn detail(pool: &sqlx::PgPool, batch: GenerationBatch) -> AppResult<BatchDetail> {
    let rows = BatchRepo::rows(pool, batch.id).await?;
    let entitlements = Entitlements::of(&batch);
    Ok(BatchDetail {
        batch,
        rows,
        entitlements,
    })
}

/// POST /api/v1/batches
///
/// Generate a batch of rows (1 credit per row, 4 images per row).
/// Answers 201 with the full batch when generation finishes inside the
/// request budget, else 202 with the pending job.
pub async fn create_batch(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<GenerateBatchRequest>,
) -> AppResult<impl IntoResponse> {
    let outcome = match state.orchestrator.start_batch(auth.user_id, input).await? {
        DriveOutcome::Completed(batch) => {
            DriveOutcome::Completed(detail(&state.pool, batch).await?)
        }
        DriveOutcome::Pending(job) => DriveOutcome::Pending(job),
    };
    Ok(drive_response(outcome, StatusCode::CREATED))
}

/// GET /api/v1/batches
pub async fn list_batches(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let batches = BatchRepo::list_by_user(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse { data: batches }))
}

/// GET /api/v1/batches/{id}
///
/// The batch with its rows and remaining entitlements.
pub async fn get_batch(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(batch_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let batch = find_owned(&state.pool, batch_id, &auth).await?;
    let detail = detail(&state.pool, batch).await?;
    Ok(Json(DataResponse { data: detail }))
}

/// POST /api/v1/batches/{id}/rows/{index}/remake
///
/// Regenerate one row. Free, once per batch, and foreclosed forever by
/// any upscale. Answers 200 with the replaced row, or 202 pending.
pub async fn remake_row(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((batch_id, row_index)): Path<(DbId, i32)>,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .orchestrator
        .remake_row(auth.user_id, batch_id, row_index)
        .await?;
    Ok(drive_response(outcome, StatusCode::OK))
}

/// POST /api/v1/batches/{id}/rows/{index}/upscale
///
/// Upscale one row: free the first time per batch, 1 credit afterwards.
/// Answers 200 with the upscaled row, or 202 pending.
pub async fn upscale_row(
    auth: AuthUser,
    State(state): State<AppState>,
    Path((batch_id, row_index)): Path<(DbId, i32)>,
) -> AppResult<impl IntoResponse> {
    let outcome = state
        .orchestrator
        .upscale_row(auth.user_id, batch_id, row_index)
        .await?;
    Ok(drive_response(outcome, StatusCode::OK))
}
