//! Event bus and notification delivery.
//!
//! - [`EventBus`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`JobEvent`] -- the outcome event the orchestrator publishes when a
//!   job reaches a terminal state.
//! - [`EmailNotifier`] -- background subscriber that mails users about
//!   their finished work. Delivery is fire-and-forget: failures are
//!   logged and never affect job state.

pub mod bus;
pub mod notifier;

pub use bus::{EventBus, JobEvent};
pub use notifier::{EmailConfig, EmailDelivery, EmailNotifier};
