//! Client for the export worker's job API.
//!
//! The worker performs the compute-heavy parts of an export (CSV generation,
//! mass email dispatch). This client is a thin transport layer: it carries
//! the shared API key, maps transport failures and non-2xx responses to
//! distinct errors, and never retries. Retry policy belongs to the
//! orchestrator.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use domain::models::{EnqueueJobRequest, JobHandle, WorkerJobStatus};

use crate::config::WorkerConfig;

/// Errors from worker API calls.
#[derive(Debug, Error)]
pub enum WorkerClientError {
    /// The worker could not be reached (connect/timeout/transport error).
    #[error("Worker unavailable: {0}")]
    Unavailable(String),

    /// The worker answered with a non-2xx status.
    #[error("Worker rejected request (status {status}): {body}")]
    Rejected { status: u16, body: String },

    /// The worker answered 2xx but the body was not understood.
    #[error("Invalid worker response: {0}")]
    InvalidResponse(String),
}

/// Health report for readiness probes. Never used on the enqueue path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHealth {
    pub healthy: bool,
    pub detail: Option<String>,
}

/// Interface to the worker's job API.
///
/// The worker is a collaborator boundary: this trait is all the rest of the
/// system knows about it, and tests substitute an in-memory double.
#[async_trait]
pub trait WorkerApi: Send + Sync {
    /// Enqueue a job, returning the worker-assigned job id.
    async fn enqueue(&self, request: &EnqueueJobRequest) -> Result<String, WorkerClientError>;

    /// Fetch the status of a single job.
    async fn job_status(&self, job_id: &str) -> Result<JobHandle, WorkerClientError>;

    /// List jobs in the worker's queue, optionally filtered by status.
    async fn list_queue(
        &self,
        status: Option<WorkerJobStatus>,
    ) -> Result<Vec<JobHandle>, WorkerClientError>;

    /// Health probe. Failures are folded into the report, never raised.
    async fn health(&self) -> WorkerHealth;
}

#[derive(Debug, Deserialize)]
struct EnqueueJobResponse {
    job_id: String,
    #[allow(dead_code)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListQueueResponse {
    #[serde(default)]
    jobs: Vec<JobHandle>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    #[serde(default)]
    healthy: bool,
}

/// HTTP implementation of [`WorkerApi`].
pub struct HttpWorkerClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpWorkerClient {
    /// Create a new client from worker configuration.
    pub fn new(config: &WorkerConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check_status(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, WorkerClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(WorkerClientError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl WorkerApi for HttpWorkerClient {
    async fn enqueue(&self, request: &EnqueueJobRequest) -> Result<String, WorkerClientError> {
        let response = self
            .client
            .post(self.url("/api/v1/jobs/enqueue"))
            .header("X-API-Key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| WorkerClientError::Unavailable(e.to_string()))?;

        let response = Self::check_status(response).await?;
        let body: EnqueueJobResponse = response
            .json()
            .await
            .map_err(|e| WorkerClientError::InvalidResponse(e.to_string()))?;

        debug!(job_id = %body.job_id, "Job enqueued with worker");
        Ok(body.job_id)
    }

    async fn job_status(&self, job_id: &str) -> Result<JobHandle, WorkerClientError> {
        let response = self
            .client
            .get(self.url(&format!("/api/v1/jobs/{}/status", job_id)))
            .header("X-API-Key", &self.api_key)
            .send()
            .await
            .map_err(|e| WorkerClientError::Unavailable(e.to_string()))?;

        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| WorkerClientError::InvalidResponse(e.to_string()))
    }

    async fn list_queue(
        &self,
        status: Option<WorkerJobStatus>,
    ) -> Result<Vec<JobHandle>, WorkerClientError> {
        let mut request = self
            .client
            .get(self.url("/api/v1/jobs/queue"))
            .header("X-API-Key", &self.api_key);

        if let Some(status) = status {
            request = request.query(&[("status", status.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| WorkerClientError::Unavailable(e.to_string()))?;

        let response = Self::check_status(response).await?;
        let body: ListQueueResponse = response
            .json()
            .await
            .map_err(|e| WorkerClientError::InvalidResponse(e.to_string()))?;

        Ok(body.jobs)
    }

    async fn health(&self) -> WorkerHealth {
        let result = self
            .client
            .get(self.url("/api/v1/health"))
            .header("X-API-Key", &self.api_key)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                match response.json::<HealthResponse>().await {
                    Ok(body) => WorkerHealth {
                        healthy: body.healthy,
                        detail: None,
                    },
                    Err(e) => WorkerHealth {
                        healthy: false,
                        detail: Some(format!("invalid health response: {}", e)),
                    },
                }
            }
            Ok(response) => WorkerHealth {
                healthy: false,
                detail: Some(format!("status {}", response.status().as_u16())),
            },
            Err(e) => WorkerHealth {
                healthy: false,
                detail: Some(e.to_string()),
            },
        }
    }
}
