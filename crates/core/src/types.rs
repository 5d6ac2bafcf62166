/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Credit amounts are signed 64-bit integers.
///
/// Balances are constrained to be non-negative; transaction deltas are
/// signed (debits are negative, purchases and refunds positive).
pub type Credits = i64;
