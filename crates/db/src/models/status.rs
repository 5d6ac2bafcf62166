//! Code enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_kinds` / `*_states` database table. Columns
//! store the raw SMALLINT; these enums exist so no query or transition
//! ever mentions a magic number.

/// Code type matching SMALLINT/SMALLSERIAL in the database.
pub type CodeId = i16;

macro_rules! define_code_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database code.
            pub fn id(self) -> CodeId {
                self as CodeId
            }

            /// Map a raw database code back to the enum.
            pub fn from_id(id: CodeId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for CodeId {
            fn from(value: $name) -> Self {
                value as CodeId
            }
        }
    };
}

define_code_enum! {
    /// Ledger transaction kind. The log is append-only; these never gain
    /// an "update" or "delete" flavour.
    TransactionKind {
        Purchase = 1,
        Debit = 2,
        Refund = 3,
    }
}

define_code_enum! {
    /// What a job asks the compute provider to do.
    JobKind {
        Train = 1,
        GenerateBatch = 2,
        GenerateVideo = 3,
        GenerateSample = 4,
        RemakeRow = 5,
        UpscaleRow = 6,
    }
}

define_code_enum! {
    /// Job lifecycle state. A locally timed-out job has no state of its
    /// own: it stays in `Polling` and is picked up again by the sweeper
    /// or a user-initiated check.
    JobState {
        Created = 1,
        Submitted = 2,
        Polling = 3,
        Succeeded = 4,
        Failed = 5,
    }
}

define_code_enum! {
    /// Trainable subject lifecycle.
    SubjectStatus {
        Pending = 1,
        Training = 2,
        Ready = 3,
        Failed = 4,
    }
}

impl JobState {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Stable wire name ("created", "polling", ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitted => "submitted",
            Self::Polling => "polling",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl JobKind {
    /// Stable wire/event name ("train", "generate_batch", ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::GenerateBatch => "generate_batch",
            Self::GenerateVideo => "generate_video",
            Self::GenerateSample => "generate_sample",
            Self::RemakeRow => "remake_row",
            Self::UpscaleRow => "upscale_row",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_kind_ids_match_seed_data() {
        assert_eq!(TransactionKind::Purchase.id(), 1);
        assert_eq!(TransactionKind::Debit.id(), 2);
        assert_eq!(TransactionKind::Refund.id(), 3);
    }

    #[test]
    fn job_state_ids_match_seed_data() {
        assert_eq!(JobState::Created.id(), 1);
        assert_eq!(JobState::Submitted.id(), 2);
        assert_eq!(JobState::Polling.id(), 3);
        assert_eq!(JobState::Succeeded.id(), 4);
        assert_eq!(JobState::Failed.id(), 5);
    }

    #[test]
    fn from_id_round_trips_and_rejects_unknown() {
        assert_eq!(JobState::from_id(3), Some(JobState::Polling));
        assert_eq!(JobState::from_id(99), None);
        assert_eq!(JobKind::from_id(6), Some(JobKind::UpscaleRow));
    }

    #[test]
    fn only_succeeded_and_failed_are_terminal() {
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Created.is_terminal());
        assert!(!JobState::Submitted.is_terminal());
        assert!(!JobState::Polling.is_terminal());
    }
}
