//! Credit pricing for compute work.
//!
//! Every job cost is pre-computed by the caller before the ledger is
//! touched; the orchestrator reserves exactly this amount and refunds
//! exactly this amount on failure. Prices are whole credits -- there is
//! no fractional billing.

use crate::types::Credits;

// ---------------------------------------------------------------------------
// Published prices
// ---------------------------------------------------------------------------

/// Training a subject model.
pub const TRAIN_COST: Credits = 40;

/// One batch row (four images sharing a prompt).
pub const BATCH_ROW_COST: Credits = 1;

/// Generating a video clip from a batch row.
pub const VIDEO_COST: Credits = 2;

/// Post-training sample batch. System-triggered, never billed.
pub const SAMPLE_COST: Credits = 0;

/// A remake re-renders one row. The single remake per batch is free and
/// there is no paid variant.
pub const REMAKE_COST: Credits = 0;

/// An upscale after the free one has been consumed.
pub const UPSCALE_COST: Credits = 1;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Maximum rows a single generation request may ask for.
pub const MAX_BATCH_ROWS: u32 = 10;

// ---------------------------------------------------------------------------
// Cost functions
// ---------------------------------------------------------------------------

/// Cost of a generation batch with the given number of rows.
pub fn batch_cost(rows: u32) -> Credits {
    rows as Credits * BATCH_ROW_COST
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_cost_scales_per_row() {
        assert_eq!(batch_cost(1), BATCH_ROW_COST);
        assert_eq!(batch_cost(4), 4 * BATCH_ROW_COST);
        assert_eq!(batch_cost(0), 0);
    }

    #[test]
    fn free_actions_cost_nothing() {
        assert_eq!(SAMPLE_COST, 0);
        assert_eq!(REMAKE_COST, 0);
    }
}
