//! HTTP client for the card video generation backend.
//!
//! [`GenerationBackend`] is the seam the controller talks through;
//! [`GenerationApi`] implements it over [`reqwest`].

use std::time::Duration;

use async_trait::async_trait;

use crate::messages::{ErrorFields, GenerateRequest, PollResponse, SubmitResponse};

/// Path of the generation endpoint, relative to the API base URL.
pub const GENERATE_PATH: &str = "/api/generate-card-video";

// ---------------------------------------------------------------------------
// Backend trait
// ---------------------------------------------------------------------------

/// Failure at the backend boundary, shaped for retry classification.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The backend answered with a non-2xx status.
    #[error("Generation backend returned HTTP {status}: {message}")]
    Http {
        status: u16,
        /// User-facing text assembled from the error body.
        message: String,
    },

    /// The request never produced a response (connect, DNS, TLS, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// A 2xx response whose body could not be decoded.
    #[error("Malformed response body: {0}")]
    Decode(String),
}

/// Transport used by the reveal controller.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Create a generation job, or fetch a cached video for the same request.
    async fn submit(&self, request: &GenerateRequest) -> Result<SubmitResponse, BackendError>;

    /// Fetch the current status of a job.
    async fn poll(&self, job_id: &str) -> Result<PollResponse, BackendError>;
}

// ---------------------------------------------------------------------------
// reqwest implementation
// ---------------------------------------------------------------------------

/// Errors from the HTTP layer itself.
#[derive(Debug, thiserror::Error)]
pub enum GenerationApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Generation API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl From<GenerationApiError> for BackendError {
    fn from(err: GenerationApiError) -> Self {
        match err {
            GenerationApiError::ApiError { status, body } => BackendError::Http {
                status,
                message: serde_json::from_str::<ErrorFields>(&body)
                    .map(|fields| fields.user_message())
                    .unwrap_or_else(|_| format!("HTTP {status}")),
            },
            GenerationApiError::Request(e) if e.is_decode() => BackendError::Decode(e.to_string()),
            GenerationApiError::Request(e) => BackendError::Network(e.to_string()),
        }
    }
}

/// HTTP client for a generation backend.
pub struct GenerationApi {
    client: reqwest::Client,
    api_url: String,
}

impl GenerationApi {
    /// Create a client with a per-request timeout.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:3000`.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, GenerationApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Send `POST /api/generate-card-video`.
    pub async fn create_job(
        &self,
        request: &GenerateRequest,
    ) -> Result<SubmitResponse, GenerationApiError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Send `GET /api/generate-card-video?jobId=<id>`.
    pub async fn job_status(&self, job_id: &str) -> Result<PollResponse, GenerationApiError> {
        let response = self
            .client
            .get(self.endpoint())
            .query(&[("jobId", job_id)])
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn endpoint(&self) -> String {
        format!("{}{GENERATE_PATH}", self.api_url)
    }

    /// Return the response unchanged on success, or an
    /// [`GenerationApiError::ApiError`] carrying the status and body text.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, GenerationApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GenerationApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GenerationApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl GenerationBackend for GenerationApi {
    async fn submit(&self, request: &GenerateRequest) -> Result<SubmitResponse, BackendError> {
        Ok(self.create_job(request).await?)
    }

    async fn poll(&self, job_id: &str) -> Result<PollResponse, BackendError> {
        Ok(self.job_status(job_id).await?)
    }
}
