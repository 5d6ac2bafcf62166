//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the publish/subscribe hub for [`JobEvent`]s. It is
//! designed to be shared via `Arc<EventBus>` across the application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use photoloom_core::types::DbId;

// ---------------------------------------------------------------------------
// JobEvent
// ---------------------------------------------------------------------------

/// A job-outcome event.
///
/// Published by the orchestrator exactly when a job reaches a terminal
/// state, after all persistence for that outcome has committed -- a
/// subscriber acting on an event can rely on the database already
/// reflecting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    /// Dot-separated event name, e.g. `"job.succeeded"`.
    pub event_type: String,

    /// The user whose work this event concerns.
    pub user_id: DbId,

    /// The job that produced the event, when its row still exists
    /// (training success deletes the row first).
    pub job_id: Option<DbId>,

    /// Stable job kind name ("train", "generate_batch", ...).
    pub kind: Option<String>,

    /// Event-specific data: artifact references, error text, refund info.
    pub payload: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    /// Create a new event for a user with only the required fields.
    pub fn new(event_type: impl Into<String>, user_id: DbId) -> Self {
        Self {
            event_type: event_type.into(),
            user_id,
            job_id: None,
            kind: None,
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Attach the producing job.
    pub fn with_job(mut self, job_id: DbId, kind: impl Into<String>) -> Self {
        self.job_id = Some(job_id);
        self.kind = Some(kind.into());
        self
    }

    /// Set the JSON payload for the event.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`JobEvent`].
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are
    /// dropped and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// events are a notification channel, never the system of record.
    pub fn publish(&self, event: JobEvent) {
        // Ignore the SendError -- it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
