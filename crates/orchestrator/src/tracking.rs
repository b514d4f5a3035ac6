//! Polling a submitted prompt until the worker reports an outcome.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use datalabel_comfyui::api::ComfyUIApiError;
use datalabel_comfyui::backend::{ComfyUIBackend, WorkerEndpoint};
use datalabel_comfyui::messages::{HistoryEntry, QueueSnapshot};
use datalabel_core::task_status::{
    is_failed_prompt_status, is_successful_prompt_status, is_terminal_prompt_status,
    PROMPT_QUEUED, PROMPT_RUNNING,
};
use datalabel_core::types::Timestamp;
use datalabel_db::models::task_prompt::TaskPrompt;
use datalabel_db::models::worker::Worker;
use serde_json::Value;

use crate::error::OrchestratorError;
use crate::store::Store;

/// Bounded best-effort poller for submitted prompts.
#[derive(Clone)]
pub struct PromptTracker {
    store: Arc<dyn Store>,
    backend: Arc<dyn ComfyUIBackend>,
    poll_interval: Duration,
    max_attempts: u32,
}

impl PromptTracker {
    pub fn new(
        store: Arc<dyn Store>,
        backend: Arc<dyn ComfyUIBackend>,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            backend,
            poll_interval,
            max_attempts,
        }
    }

    /// Poll `/queue` and `/history` until the prompt reaches a terminal
    /// status or the attempts run out, persisting every change.
    ///
    /// Worker errors end tracking quietly, leaving the last observed
    /// status in place. Only persistence failures are returned.
    pub async fn track(
        &self,
        worker: &Worker,
        mut prompt: TaskPrompt,
    ) -> Result<TaskPrompt, OrchestratorError> {
        let Some(lookup_id) = prompt.prompt_id.clone().or_else(|| prompt.client_id.clone()) else {
            return Ok(prompt);
        };
        let endpoint = WorkerEndpoint::from(worker);

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.poll_interval).await;
            }

            let before = prompt.clone();
            let observed = self.observe(&endpoint, &lookup_id, &mut prompt).await;
            if prompt != before {
                prompt = self.store.update_task_prompt(&prompt).await?;
            }

            if let Err(e) = observed {
                tracing::warn!(
                    task_prompt_id = prompt.id,
                    prompt_id = %lookup_id,
                    attempt,
                    error = %e,
                    "Tracking stopped after worker error",
                );
                break;
            }
            if is_terminal_prompt_status(&prompt.status) {
                tracing::info!(
                    task_prompt_id = prompt.id,
                    prompt_id = %lookup_id,
                    status = %prompt.status,
                    "Prompt finished",
                );
                break;
            }
        }
        Ok(prompt)
    }

    async fn observe(
        &self,
        endpoint: &WorkerEndpoint,
        lookup_id: &str,
        prompt: &mut TaskPrompt,
    ) -> Result<(), ComfyUIApiError> {
        let queue = self.backend.queue(endpoint).await?;
        apply_queue(prompt, &queue, lookup_id, Utc::now());

        if let Some(entry) = self.backend.history(endpoint, lookup_id).await? {
            apply_history(prompt, &entry, Utc::now());
        }
        Ok(())
    }
}

/// Reflect queue membership: `running` or `queued`, stamping the matching
/// timestamp on first observation. Terminal statuses are left alone.
pub fn apply_queue(
    prompt: &mut TaskPrompt,
    queue: &QueueSnapshot,
    lookup_id: &str,
    now: Timestamp,
) {
    if is_terminal_prompt_status(&prompt.status) {
        return;
    }
    if queue.is_running(lookup_id) {
        prompt.status = PROMPT_RUNNING.to_string();
        prompt.started_at.get_or_insert(now);
    } else if queue.is_pending(lookup_id) {
        prompt.status = PROMPT_QUEUED.to_string();
        prompt.queued_at.get_or_insert(now);
    }
}

/// Copy a history record onto the prompt.
///
/// The reported status overwrites the current one; outputs, images and
/// errors land in `node_outputs`. Lifecycle timestamps are stamped once,
/// preferring the worker's own epoch values.
pub fn apply_history(prompt: &mut TaskPrompt, entry: &HistoryEntry, now: Timestamp) {
    if let Some(status) = &entry.status {
        prompt.status = status.clone();
    }

    if !prompt.node_outputs.is_object() {
        prompt.node_outputs = Value::Object(Default::default());
    }
    if let Some(outputs) = prompt.node_outputs.as_object_mut() {
        if let Some(value) = &entry.outputs {
            outputs.insert("outputs".to_string(), value.clone());
        }
        if let Some(value) = &entry.images {
            outputs.insert("images".to_string(), value.clone());
        }
        if let Some(error) = &entry.error {
            outputs.insert("error".to_string(), Value::String(error.clone()));
        }
    }
    if let Some(error) = &entry.error {
        prompt.error = Some(error.clone());
    }

    if prompt.queued_at.is_none() {
        prompt.queued_at = entry.created_at.and_then(from_epoch);
    }

    let status = prompt.status.as_str();
    let started = entry.started_at.and_then(from_epoch);
    let finished = entry.completed_at.and_then(from_epoch);
    let has_started =
        started.is_some() || status == PROMPT_RUNNING || is_terminal_prompt_status(status);
    if prompt.started_at.is_none() && has_started {
        prompt.started_at = Some(started.unwrap_or(now));
    }
    if prompt.completed_at.is_none() && is_successful_prompt_status(status) {
        prompt.completed_at = Some(finished.unwrap_or(now));
    }
    if prompt.failed_at.is_none() && is_failed_prompt_status(status) {
        prompt.failed_at = Some(finished.unwrap_or(now));
    }
}

fn from_epoch(seconds: f64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis((seconds * 1000.0) as i64)
}
