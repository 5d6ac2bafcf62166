//! Credit account and transaction models.
//!
//! The account row is the single balance; the transaction table is the
//! append-only log. The ledger maintains `balance == SUM(credits_change)`
//! per user by mutating both inside one database transaction under a row
//! lock (see `LedgerRepo`).

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use photoloom_core::types::{Credits, DbId, Timestamp};

use super::status::CodeId;

/// A row from the `credit_accounts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CreditAccount {
    pub user_id: DbId,
    pub balance: Credits,
    pub updated_at: Timestamp,
}

/// A row from the append-only `credit_transactions` table.
///
/// Never updated or deleted; admin/audit views read this log directly.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CreditTransaction {
    pub id: DbId,
    pub user_id: DbId,
    /// `TransactionKind` code (purchase / debit / refund).
    pub kind: CodeId,
    /// Signed delta: negative for debits, positive otherwise.
    pub credits_change: Credits,
    /// Balance immediately after this transaction was applied.
    pub balance_after: Credits,
    pub description: String,
    pub created_at: Timestamp,
}

/// DTO for the purchase endpoint (the checkout callback stand-in).
#[derive(Debug, Deserialize)]
pub struct PurchaseCredits {
    pub amount: Credits,
    pub description: Option<String>,
}

/// Query parameters for the transaction history listing.
#[derive(Debug, Deserialize)]
pub struct TransactionListQuery {
    /// Maximum number of results. Defaults to 50, capped at 200.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
