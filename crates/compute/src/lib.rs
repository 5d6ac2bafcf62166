//! Client for the remote generation service.
//!
//! The service runs training and generation workloads asynchronously:
//! submit a job, receive a handle, poll the handle until it reports a
//! terminal status, then fetch the result. [`provider::ComputeProvider`]
//! is the trait the orchestrator drives; [`http::HttpComputeProvider`]
//! is the production REST client.

pub mod error;
pub mod http;
pub mod provider;

pub use error::ComputeError;
pub use http::{HttpComputeProvider, ProviderConfig};
pub use provider::{ComputeProvider, JobSpec, RemoteArtifact, RemoteStatus};
