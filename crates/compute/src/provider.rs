//! The provider contract the orchestrator drives jobs through.

use async_trait::async_trait;

use crate::error::ComputeError;

/// A unit of work to submit to the generation service.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Workload name understood by the service ("train",
    /// "generate_batch", ...).
    pub kind: &'static str,
    /// Caller-chosen key the service dedupes resubmissions on. Persisted
    /// with the job so a crashed submission can be retried safely.
    pub idempotency_key: String,
    /// Opaque workload input, forwarded unmodified.
    pub input: serde_json::Value,
}

/// Remote execution status as reported by a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Accepted, not yet started.
    Queued,
    /// Currently executing.
    Running,
    /// Finished; the result can be fetched.
    Succeeded,
    /// Finished unsuccessfully. The reservation should be refunded.
    Failed { reason: String },
}

impl RemoteStatus {
    /// Whether the remote job has finished (either way).
    pub fn is_terminal(&self) -> bool {
        matches!(self, RemoteStatus::Succeeded | RemoteStatus::Failed { .. })
    }
}

/// The output envelope of a succeeded remote job.
#[derive(Debug, Clone)]
pub struct RemoteArtifact {
    /// Output file references in service order. Empty for workloads
    /// whose output is not file-shaped (training returns a model
    /// handle in `raw` instead).
    pub files: Vec<String>,
    /// Full response body, for workload-specific fields.
    pub raw: serde_json::Value,
}

/// Asynchronous compute service: submit, poll, fetch.
///
/// Implementations must be safe to call from any number of tasks; the
/// orchestrator shares one provider across all in-flight jobs.
#[async_trait]
pub trait ComputeProvider: Send + Sync {
    /// Submit a job. Returns the service-assigned handle all later calls
    /// are keyed on.
    async fn submit(&self, spec: &JobSpec) -> Result<String, ComputeError>;

    /// Report the current status of a submitted job.
    async fn poll(&self, handle: &str) -> Result<RemoteStatus, ComputeError>;

    /// Fetch the result of a job that polled `Succeeded`.
    async fn fetch_result(&self, handle: &str) -> Result<RemoteArtifact, ComputeError>;
}
