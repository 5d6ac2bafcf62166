//! Per-batch entitlement state machine.
//!
//! Every generation batch carries two one-shot entitlements: a free
//! remake of one row and a free upscale of one row. The rules are
//! asymmetric:
//!
//! * the remake can be used once, and only while no upscale has ever run
//!   on the batch -- an upscale permanently forecloses remakes (free or
//!   otherwise);
//! * the first upscale is free, later upscales are paid, and upscales are
//!   never blocked by a prior remake.
//!
//! The two persisted booleans on the batch row collapse into the four
//! states below; all decisions are made here so that the rule exists in
//! exactly one place and the storage layer only has to enforce the
//! compare-and-set on the flags.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why an entitlement action is not available. No state is mutated when
/// one of these is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EntitlementError {
    /// The free remake for this batch has already been consumed.
    #[error("The free remake for this batch has already been used")]
    AlreadyUsed,

    /// An upscale has run on this batch, which permanently disables
    /// remakes (not just the free one).
    #[error("This batch has been upscaled; remakes are no longer available")]
    UpscaleBlocksRemake,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// How the next upscale on a batch is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpscaleCharge {
    /// First upscale on the batch: no debit.
    Free,
    /// The free upscale is gone; a paid debit must precede the work.
    Paid,
}

/// Entitlement state of one batch, derived from its two persisted flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementState {
    /// Neither action used: remake available, upscale free.
    Untouched,
    /// Remake consumed, no upscale yet: upscale still free.
    RemakeUsed,
    /// Upscaled before any remake: remakes foreclosed, upscales paid.
    UpscaleUsed,
    /// Both consumed: remakes foreclosed, upscales paid.
    Exhausted,
}

impl EntitlementState {
    /// Derive the state from the two persisted batch flags.
    pub fn from_flags(remake_used: bool, upscale_used: bool) -> Self {
        match (remake_used, upscale_used) {
            (false, false) => Self::Untouched,
            (true, false) => Self::RemakeUsed,
            (false, true) => Self::UpscaleUsed,
            (true, true) => Self::Exhausted,
        }
    }

    /// Whether a remake may start from this state.
    ///
    /// The upscale foreclosure takes precedence over the already-used
    /// error: once a batch is upscaled the caller is told remakes are
    /// gone for good, not that they "already" remade.
    pub fn check_remake(self) -> Result<(), EntitlementError> {
        match self {
            Self::Untouched => Ok(()),
            Self::UpscaleUsed | Self::Exhausted => Err(EntitlementError::UpscaleBlocksRemake),
            Self::RemakeUsed => Err(EntitlementError::AlreadyUsed),
        }
    }

    /// How the next upscale is charged. Upscales are never refused.
    pub fn upscale_charge(self) -> UpscaleCharge {
        match self {
            Self::Untouched | Self::RemakeUsed => UpscaleCharge::Free,
            Self::UpscaleUsed | Self::Exhausted => UpscaleCharge::Paid,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_batch_allows_remake_and_free_upscale() {
        let state = EntitlementState::from_flags(false, false);
        assert_eq!(state, EntitlementState::Untouched);
        assert!(state.check_remake().is_ok());
        assert_eq!(state.upscale_charge(), UpscaleCharge::Free);
    }

    #[test]
    fn remake_does_not_foreclose_the_free_upscale() {
        let state = EntitlementState::from_flags(true, false);
        assert_eq!(state.check_remake(), Err(EntitlementError::AlreadyUsed));
        assert_eq!(state.upscale_charge(), UpscaleCharge::Free);
    }

    #[test]
    fn upscale_forecloses_remake_permanently() {
        let state = EntitlementState::from_flags(false, true);
        assert_eq!(
            state.check_remake(),
            Err(EntitlementError::UpscaleBlocksRemake)
        );
        assert_eq!(state.upscale_charge(), UpscaleCharge::Paid);
    }

    #[test]
    fn foreclosure_error_takes_precedence_when_both_flags_set() {
        let state = EntitlementState::from_flags(true, true);
        assert_eq!(state, EntitlementState::Exhausted);
        assert_eq!(
            state.check_remake(),
            Err(EntitlementError::UpscaleBlocksRemake)
        );
        assert_eq!(state.upscale_charge(), UpscaleCharge::Paid);
    }
}
