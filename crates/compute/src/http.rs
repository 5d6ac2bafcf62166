//! REST client for the generation service HTTP API.
//!
//! Wraps the service's job endpoints (submission, status, result
//! retrieval) using [`reqwest`].

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ComputeError;
use crate::provider::{ComputeProvider, JobSpec, RemoteArtifact, RemoteStatus};

/// Header carrying the submission idempotency key.
const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Default service URL for local development.
const DEFAULT_BASE_URL: &str = "http://localhost:8700";

/// Connection settings for the generation service, loaded from the
/// environment.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base HTTP URL of the service.
    pub base_url: String,
    /// Bearer token, when the deployment requires one.
    pub api_token: Option<String>,
}

impl ProviderConfig {
    /// Load from environment variables.
    ///
    /// | Variable            | Default                  |
    /// |---------------------|--------------------------|
    /// | `COMPUTE_BASE_URL`  | `http://localhost:8700`  |
    /// | `COMPUTE_API_TOKEN` | unset (no auth header)   |
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("COMPUTE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_token: std::env::var("COMPUTE_API_TOKEN").ok(),
        }
    }
}

/// HTTP client for the generation service.
pub struct HttpComputeProvider {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

/// Response returned by `POST /v1/jobs` after queuing a workload.
#[derive(Debug, Deserialize)]
struct SubmitResponse {
    /// Service-assigned identifier for the queued job.
    job_id: String,
}

/// Response returned by `GET /v1/jobs/{id}`.
#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

impl HttpComputeProvider {
    /// Create a new client for the generation service.
    ///
    /// * `base_url` - Base HTTP URL, e.g. `https://compute.internal`.
    /// * `api_token` - Bearer token, when the deployment requires one.
    pub fn new(base_url: String, api_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_token,
        }
    }

    /// Create a client from environment-derived settings.
    pub fn from_config(config: ProviderConfig) -> Self {
        Self::new(config.base_url, config.api_token)
    }

    /// Create a client reusing an existing [`reqwest::Client`] (useful
    /// for sharing a pool, or injecting one with a request timeout).
    pub fn with_client(
        client: reqwest::Client,
        base_url: String,
        api_token: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url,
            api_token,
        }
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComputeError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ComputeError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComputeError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComputeError> {
        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ComputeError::Decode(format!("{e}: {body}")))
    }

    /// Map a 404 on a handle-scoped endpoint to [`ComputeError::UnknownHandle`].
    fn classify_handle_error(err: ComputeError, handle: &str) -> ComputeError {
        match err {
            ComputeError::Api { status: 404, .. } => {
                ComputeError::UnknownHandle(handle.to_string())
            }
            other => other,
        }
    }
}

#[async_trait]
impl ComputeProvider for HttpComputeProvider {
    async fn submit(&self, spec: &JobSpec) -> Result<String, ComputeError> {
        let body = serde_json::json!({
            "kind": spec.kind,
            "input": spec.input,
        });

        let response = self
            .request(self.client.post(format!("{}/v1/jobs", self.base_url)))
            .header(IDEMPOTENCY_HEADER, &spec.idempotency_key)
            .json(&body)
            .send()
            .await?;

        let submitted: SubmitResponse = Self::parse_response(response).await?;
        tracing::info!(
            kind = spec.kind,
            handle = %submitted.job_id,
            "Submitted job to generation service",
        );
        Ok(submitted.job_id)
    }

    async fn poll(&self, handle: &str) -> Result<RemoteStatus, ComputeError> {
        let response = self
            .request(
                self.client
                    .get(format!("{}/v1/jobs/{}", self.base_url, handle)),
            )
            .send()
            .await?;

        let status: StatusResponse = Self::parse_response(response)
            .await
            .map_err(|e| Self::classify_handle_error(e, handle))?;
        map_status(&status.status, status.error)
    }

    async fn fetch_result(&self, handle: &str) -> Result<RemoteArtifact, ComputeError> {
        let response = self
            .request(
                self.client
                    .get(format!("{}/v1/jobs/{}/result", self.base_url, handle)),
            )
            .send()
            .await?;

        let raw: serde_json::Value = Self::parse_response(response)
            .await
            .map_err(|e| Self::classify_handle_error(e, handle))?;
        Ok(artifact_from_raw(raw))
    }
}

/// Map the service's status string to a [`RemoteStatus`].
fn map_status(status: &str, error: Option<String>) -> Result<RemoteStatus, ComputeError> {
    match status {
        "queued" => Ok(RemoteStatus::Queued),
        "running" => Ok(RemoteStatus::Running),
        "succeeded" => Ok(RemoteStatus::Succeeded),
        "failed" => Ok(RemoteStatus::Failed {
            reason: error.unwrap_or_else(|| "provider reported failure".to_string()),
        }),
        other => Err(ComputeError::Decode(format!("unknown status '{other}'"))),
    }
}

/// Build the artifact envelope from a raw result body. The `files`
/// array is optional (training results carry a model handle instead).
fn artifact_from_raw(raw: serde_json::Value) -> RemoteArtifact {
    let files = raw
        .get("files")
        .and_then(|v| v.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|f| f.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();
    RemoteArtifact { files, raw }
}
