//! Handlers for the `/credits` resource.
//!
//! The purchase endpoint is the checkout-callback stand-in: whatever
//! payment flow runs upstream calls it once payment has cleared.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use photoloom_core::types::Credits;
use photoloom_db::models::credit::{PurchaseCredits, TransactionListQuery};
use photoloom_db::repositories::LedgerRepo;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Balance payload for `GET /credits/balance`.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: Credits,
}

/// POST /api/v1/credits/purchase
///
/// Credit the caller's account. Returns 201 with the ledger transaction.
pub async fn purchase(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<PurchaseCredits>,
) -> AppResult<impl IntoResponse> {
    let description = input.description.as_deref().unwrap_or("credit purchase");
    let txn = LedgerRepo::purchase(&state.pool, auth.user_id, input.amount, description).await?;

    tracing::info!(
        user_id = auth.user_id,
        amount = input.amount,
        balance = txn.balance_after,
        "Credits purchased",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: txn })))
}

/// GET /api/v1/credits/balance
pub async fn balance(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let balance = LedgerRepo::balance(&state.pool, auth.user_id).await?;
    Ok(Json(DataResponse {
        data: BalanceResponse { balance },
    }))
}

/// GET /api/v1/credits/transactions
///
/// The caller's transaction history, newest first. Supports `limit` and
/// `offset` query parameters.
pub async fn transactions(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<TransactionListQuery>,
) -> AppResult<impl IntoResponse> {
    let txns = LedgerRepo::list_transactions(&state.pool, auth.user_id, &params).await?;
    Ok(Json(DataResponse { data: txns }))
}
