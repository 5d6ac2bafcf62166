//! Repository for the credit ledger (`credit_accounts` + `credit_transactions`).
//!
//! Both tables are always written together: the account row holds the
//! current balance, the transaction table is the append-only log, and the
//! invariant `balance == SUM(credits_change)` per user must hold at every
//! commit point. Each mutation therefore locks the account row with
//! `SELECT ... FOR UPDATE`, recomputes the balance, and appends the log
//! entry inside one database transaction. Concurrent mutations for the
//! same user serialize on that row lock.
//!
//! The `*_on` variants run against a caller-supplied connection so a
//! ledger movement can be composed into a wider transaction (for example
//! debit-plus-job-insert during authorization).

use sqlx::{PgConnection, PgPool};

use photoloom_core::types::{Credits, DbId};

use crate::models::credit::{CreditAccount, CreditTransaction, TransactionListQuery};
use crate::models::status::TransactionKind;

/// Column list for `credit_transactions` queries.
const COLUMNS: &str = "id, user_id, kind, credits_change, balance_after, description, created_at";

/// Default page size for transaction history.
const DEFAULT_LIMIT: i64 = 50;

/// Maximum page size for transaction history.
const MAX_LIMIT: i64 = 200;

/// Errors produced by ledger mutations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Amounts are always positive; the ledger decides the sign.
    #[error("ledger amount must be positive, got {amount}")]
    InvalidAmount { amount: Credits },

    /// The debit would take the balance below zero. Nothing was written.
    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits {
        required: Credits,
        available: Credits,
    },

    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Provides balance-safe mutations and reads for the credit ledger.
pub struct LedgerRepo;

impl LedgerRepo {
    /// Create the account row for a user if it does not exist yet.
    pub async fn ensure_account(pool: &PgPool, user_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO credit_accounts (user_id, balance) VALUES ($1, 0) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find a user's account row.
    pub async fn find_account(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<CreditAccount>, sqlx::Error> {
        sqlx::query_as::<_, CreditAccount>(
            "SELECT user_id, balance, updated_at FROM credit_accounts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Current balance for a user. Users without an account row yet have
    /// a balance of zero.
    pub async fn balance(pool: &PgPool, user_id: DbId) -> Result<Credits, sqlx::Error> {
        let row: Option<(Credits,)> =
            sqlx::query_as("SELECT balance FROM credit_accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
        Ok(row.map_or(0, |(balance,)| balance))
    }

    /// Add credits inside an existing transaction (purchase or refund).
    pub async fn credit_on(
        conn: &mut PgConnection,
        user_id: DbId,
        kind: TransactionKind,
        amount: Credits,
        description: &str,
    ) -> Result<CreditTransaction, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount { amount });
        }
        let balance = Self::lock_account(conn, user_id).await?;
        Self::apply(conn, user_id, kind, amount, balance + amount, description).await
    }

    /// Remove credits inside an existing transaction.
    ///
    /// Fails with [`LedgerError::InsufficientCredits`] before anything is
    /// written when the balance cannot cover `amount`; the caller's
    /// transaction should then be rolled back.
    pub async fn debit_on(
        conn: &mut PgConnection,
        user_id: DbId,
        amount: Credits,
        description: &str,
    ) -> Result<CreditTransaction, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount { amount });
        }
        let balance = Self::lock_account(conn, user_id).await?;
        if balance < amount {
            return Err(LedgerError::InsufficientCredits {
                required: amount,
                available: balance,
            });
        }
        Self::apply(
            conn,
            user_id,
            TransactionKind::Debit,
            -amount,
            balance - amount,
            description,
        )
        .await
    }

    /// Purchase credits: a self-contained credit in its own transaction.
    pub async fn purchase(
        pool: &PgPool,
        user_id: DbId,
        amount: Credits,
        description: &str,
    ) -> Result<CreditTransaction, LedgerError> {
        let mut tx = pool.begin().await.map_err(LedgerError::Db)?;
        let txn = Self::credit_on(
            &mut tx,
            user_id,
            TransactionKind::Purchase,
            amount,
            description,
        )
        .await?;
        tx.commit().await.map_err(LedgerError::Db)?;
        Ok(txn)
    }

    /// Transaction history for a user, newest first.
    pub async fn list_transactions(
        pool: &PgPool,
        user_id: DbId,
        params: &TransactionListQuery,
    ) -> Result<Vec<CreditTransaction>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);
        let query = format!(
            "SELECT {COLUMNS} FROM credit_transactions \
             WHERE user_id = $1 \
             ORDER BY id DESC \
             LIMIT $2 OFFSET $3"
        );
        sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Lock the account row for the rest of the transaction, creating it
    /// with a zero balance on first touch. Returns the locked balance.
    async fn lock_account(conn: &mut PgConnection, user_id: DbId) -> Result<Credits, sqlx::Error> {
        sqlx::query(
            "INSERT INTO credit_accounts (user_id, balance) VALUES ($1, 0) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
        let (balance,): (Credits,) =
            sqlx::query_as("SELECT balance FROM credit_accounts WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_one(&mut *conn)
                .await?;
        Ok(balance)
    }

    /// Write both sides of a ledger movement: bump the account balance and
    /// append the log entry. The account row must already be locked.
    async fn apply(
        conn: &mut PgConnection,
        user_id: DbId,
        kind: TransactionKind,
        credits_change: Credits,
        balance_after: Credits,
        description: &str,
    ) -> Result<CreditTransaction, LedgerError> {
        sqlx::query("UPDATE credit_accounts SET balance = $2, updated_at = NOW() WHERE user_id = $1")
            .bind(user_id)
            .bind(balance_after)
            .execute(&mut *conn)
            .await?;
        let query = format!(
            "INSERT INTO credit_transactions (user_id, kind, credits_change, balance_after, description) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        let txn = sqlx::query_as::<_, CreditTransaction>(&query)
            .bind(user_id)
            .bind(kind.id())
            .bind(credits_change)
            .bind(balance_after)
            .bind(description)
            .fetch_one(&mut *conn)
            .await?;
        Ok(txn)
    }
}
