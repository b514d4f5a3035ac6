//! REST API client for the ComfyUI HTTP endpoints.
//!
//! One [`reqwest::Client`] is shared across all workers; each call names
//! its target through a [`WorkerEndpoint`] carrying the base URL and the
//! optional API key.

use std::time::Duration;

use crate::backend::WorkerEndpoint;
use crate::messages::{HistoryEntry, QueueSnapshot, SubmitRequest, SubmitResponse, SystemStats};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2500);

/// Header carrying the raw API key alongside the bearer token.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// HTTP client for ComfyUI workers.
#[derive(Clone)]
pub struct ComfyUIApi {
    client: reqwest::Client,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ComfyUIApiError {
    /// The worker rejected the job for lack of GPU memory.
    pub fn is_out_of_memory(&self) -> bool {
        match self {
            Self::ApiError { body, .. } => body.to_lowercase().contains("out of memory"),
            Self::Request(_) => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }
}

impl ComfyUIApi {
    /// Create a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ComfyUIApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// `GET /system_stats`.
    pub async fn get_system_stats(
        &self,
        endpoint: &WorkerEndpoint,
    ) -> Result<SystemStats, ComfyUIApiError> {
        let response = self
            .authorized(self.client.get(endpoint.url("/system_stats")), endpoint)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `GET /queue`.
    pub async fn get_queue(&self, endpoint: &WorkerEndpoint) -> Result<QueueSnapshot, ComfyUIApiError> {
        let response = self
            .authorized(self.client.get(endpoint.url("/queue")), endpoint)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Submit a workflow for execution via `POST /prompt`.
    pub async fn submit_workflow(
        &self,
        endpoint: &WorkerEndpoint,
        request: &SubmitRequest,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let url = endpoint.prompt_url();
        tracing::debug!(
            url = %url,
            client_id = %request.client_id,
            batch_size = request.batch_size,
            "Submitting prompt"
        );
        let response = self
            .authorized(self.client.post(url), endpoint)
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieve the outcome of a prompt via `GET /history/{id}`.
    ///
    /// A 404, or a body without an entry for `id`, yields `Ok(None)`: the
    /// worker has not recorded the prompt yet.
    pub async fn get_history(
        &self,
        endpoint: &WorkerEndpoint,
        id: &str,
    ) -> Result<Option<HistoryEntry>, ComfyUIApiError> {
        let response = self
            .authorized(self.client.get(endpoint.url(&format!("/history/{id}"))), endpoint)
            .send()
            .await?;

        match Self::parse_response::<serde_json::Value>(response).await {
            Ok(body) => Ok(HistoryEntry::from_response(&body, id)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ---- private helpers ----

    /// Attach bearer and API-key headers when the worker has a key.
    fn authorized(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &WorkerEndpoint,
    ) -> reqwest::RequestBuilder {
        match endpoint.api_key.as_deref() {
            Some(key) if !key.is_empty() => request.bearer_auth(key).header(API_KEY_HEADER, key),
            _ => request,
        }
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}
