//! The seam between the orchestrator and a worker's HTTP surface.

use async_trait::async_trait;
use datalabel_db::models::worker::Worker;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::messages::{HistoryEntry, QueueSnapshot, SubmitRequest, SubmitResponse, SystemStats};

/// Address and credentials of one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEndpoint {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl WorkerEndpoint {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
        }
    }

    /// Absolute URL for `path` (which starts with `/`).
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    /// Submission endpoint, recorded on each submitted prompt.
    pub fn prompt_url(&self) -> String {
        self.url("/prompt")
    }
}

impl From<&Worker> for WorkerEndpoint {
    fn from(worker: &Worker) -> Self {
        Self::new(worker.base_url.clone(), worker.api_key.clone())
    }
}

/// Operations the orchestrator needs from a worker.
#[async_trait]
pub trait ComfyUIBackend: Send + Sync {
    async fn system_stats(&self, endpoint: &WorkerEndpoint) -> Result<SystemStats, ComfyUIApiError>;

    async fn queue(&self, endpoint: &WorkerEndpoint) -> Result<QueueSnapshot, ComfyUIApiError>;

    async fn submit_prompt(
        &self,
        endpoint: &WorkerEndpoint,
        request: &SubmitRequest,
    ) -> Result<SubmitResponse, ComfyUIApiError>;

    /// `Ok(None)` when the worker has no record of `id` yet.
    async fn history(
        &self,
        endpoint: &WorkerEndpoint,
        id: &str,
    ) -> Result<Option<HistoryEntry>, ComfyUIApiError>;
}

#[async_trait]
impl ComfyUIBackend for ComfyUIApi {
    async fn system_stats(&self, endpoint: &WorkerEndpoint) -> Result<SystemStats, ComfyUIApiError> {
        self.get_system_stats(endpoint).await
    }

    async fn queue(&self, endpoint: &WorkerEndpoint) -> Result<QueueSnapshot, ComfyUIApiError> {
        self.get_queue(endpoint).await
    }

    async fn submit_prompt(
        &self,
        endpoint: &WorkerEndpoint,
        request: &SubmitRequest,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        self.submit_workflow(endpoint, request).await
    }

    async fn history(
        &self,
        endpoint: &WorkerEndpoint,
        id: &str,
    ) -> Result<Option<HistoryEntry>, ComfyUIApiError> {
        self.get_history(endpoint, id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_without_double_slash() {
        let endpoint = WorkerEndpoint::new("http://gpu-1:8188/", None);
        assert_eq!(endpoint.url("/queue"), "http://gpu-1:8188/queue");
        assert_eq!(endpoint.prompt_url(), "http://gpu-1:8188/prompt");
    }
}
