//! Job orchestration for Photoloom.
//!
//! Every paid operation runs through the same protocol: reserve credits
//! and create a job row in one transaction, submit the work to the
//! compute provider, poll the provider while the caller waits, then
//! reconcile the terminal outcome back into the database. Jobs that
//! outlive the caller's poll budget stay in flight and are finished by
//! a later check or by the [`sweep::ResumeSweeper`].

pub mod context;
pub mod error;
pub mod orchestrator;
pub mod poll;
pub mod sweep;

pub use context::{JobContext, JobOp};
pub use error::OrchestratorError;
pub use orchestrator::{CheckOutcome, DriveOutcome, JobOrchestrator, SweepStats};
pub use poll::PollConfig;
pub use sweep::ResumeSweeper;
