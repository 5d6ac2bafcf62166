//! Pure domain logic shared by every photoloom crate.
//!
//! Nothing in here touches the network or the database: credit pricing,
//! the row distribution planner, the per-batch entitlement state machine,
//! and the common error/ID types live in this crate so they can be unit
//! tested in isolation and reused from the orchestrator, the repositories,
//! and the API layer alike.

pub mod credits;
pub mod entitlement;
pub mod error;
pub mod plan;
pub mod types;
