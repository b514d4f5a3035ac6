//! Getting rendered prompts onto a worker.
//!
//! Each submission waits for worker capacity, builds the node graph, and
//! walks the out-of-memory retry ladder before handing the accepted prompt
//! to the [`PromptTracker`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use datalabel_comfyui::backend::{ComfyUIBackend, WorkerEndpoint};
use datalabel_comfyui::messages::SubmitRequest;
use datalabel_core::task_status::PROMPT_QUEUED;
use datalabel_core::worker_selection::has_capacity;
use datalabel_core::workflow_graph::{
    apply_batch_size, apply_overrides, apply_prompt_text, apply_seeds, normalize_graph,
    oom_ladder, scale_resolution, NodeGraph,
};
use datalabel_db::models::task::Task;
use datalabel_db::models::task_prompt::TaskPrompt;
use datalabel_db::models::worker::Worker;
use datalabel_db::models::workflow::Workflow;
use serde_json::Value;
use tokio::time::Instant;

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::registry::WorkerRegistry;
use crate::store::Store;
use crate::tracking::PromptTracker;

/// Build the graph sent for one attempt at `batch_size` and `scale`.
///
/// The prompt text only reaches the prompt nodes when the task renders
/// from a template. Mapping-only tasks change the graph through their
/// overrides alone.
pub fn build_graph(
    workflow: &Workflow,
    task: &Task,
    prompt: &TaskPrompt,
    batch_size: i32,
    scale: f64,
) -> NodeGraph {
    let mut graph = normalize_graph(&workflow.workflow_api);
    if task.prompt_template.as_deref().is_some_and(|t| !t.trim().is_empty()) {
        apply_prompt_text(&mut graph, &workflow.prompt_nodes, &prompt.prompt);
    }
    if let Some(overrides) = prompt.applied_inputs.as_object() {
        apply_overrides(&mut graph, overrides);
    }
    apply_seeds(&mut graph, &workflow.seed_nodes, &prompt.seeds);
    apply_batch_size(&mut graph, batch_size);
    scale_resolution(&mut graph, scale);
    graph
}

#[derive(Clone)]
pub struct JobSubmitter {
    store: Arc<dyn Store>,
    backend: Arc<dyn ComfyUIBackend>,
    registry: WorkerRegistry,
    tracker: PromptTracker,
    capacity_poll_interval: Duration,
    capacity_wait_timeout: Duration,
}

impl JobSubmitter {
    pub fn new(
        store: Arc<dyn Store>,
        backend: Arc<dyn ComfyUIBackend>,
        registry: WorkerRegistry,
        config: &OrchestratorConfig,
    ) -> Self {
        let tracker = PromptTracker::new(
            Arc::clone(&store),
            Arc::clone(&backend),
            config.prompt_poll_interval,
            config.prompt_poll_max_attempts,
        );
        Self {
            store,
            backend,
            registry,
            tracker,
            capacity_poll_interval: config.capacity_poll_interval,
            capacity_wait_timeout: config.capacity_wait_timeout,
        }
    }

    pub fn tracker(&self) -> &PromptTracker {
        &self.tracker
    }

    /// Poll the worker's queue until it drops below `max_concurrent_jobs`.
    ///
    /// Fails with [`OrchestratorError::Unavailable`] when the queue cannot
    /// be read or the wait exceeds the configured timeout.
    pub async fn wait_for_capacity(&self, worker: &Worker) -> Result<Worker, OrchestratorError> {
        let deadline = Instant::now() + self.capacity_wait_timeout;
        loop {
            let fresh = match self.registry.sync_queue_length(worker).await {
                Ok(fresh) => fresh,
                Err(OrchestratorError::Worker(e)) => {
                    return Err(OrchestratorError::Unavailable {
                        worker: worker.name.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            };
            if has_capacity(fresh.queue_length, fresh.max_concurrent_jobs) {
                return Ok(fresh);
            }
            if Instant::now() >= deadline {
                return Err(OrchestratorError::Unavailable {
                    worker: worker.name.clone(),
                    reason: format!(
                        "queue stayed at {} of {} for {:?}",
                        fresh.queue_length, fresh.max_concurrent_jobs, self.capacity_wait_timeout
                    ),
                });
            }
            tracing::debug!(
                worker_id = worker.id,
                queue_length = fresh.queue_length,
                max_concurrent_jobs = fresh.max_concurrent_jobs,
                "Waiting for worker capacity",
            );
            tokio::time::sleep(self.capacity_poll_interval).await;
        }
    }

    /// Submit one prompt, retrying smaller on out-of-memory errors, then
    /// track it until it finishes or polling gives up.
    pub async fn submit(
        &self,
        worker: &Worker,
        workflow: &Workflow,
        task: &Task,
        mut prompt: TaskPrompt,
    ) -> Result<TaskPrompt, OrchestratorError> {
        let endpoint = WorkerEndpoint::from(worker);
        let client_id = prompt
            .client_id
            .clone()
            .or_else(|| task.client_id.clone())
            .unwrap_or_else(|| format!("client-{}", uuid::Uuid::new_v4()));

        let ladder = oom_ladder(prompt.batch_size);
        let mut accepted = None;
        for (attempt, step) in ladder.iter().enumerate() {
            self.wait_for_capacity(worker).await?;

            let graph = Value::Object(build_graph(workflow, task, &prompt, step.batch_size, step.scale));
            let request = SubmitRequest {
                prompt: graph.clone(),
                client_id: client_id.clone(),
                workflow_api: graph,
                extra_data: task.extra_data.clone(),
                batch_size: step.batch_size,
                seed: prompt.seed,
                seed_list: prompt.seeds.clone(),
            };

            match self.backend.submit_prompt(&endpoint, &request).await {
                Ok(response) => {
                    accepted = Some((response, step.batch_size));
                    break;
                }
                Err(e) if e.is_out_of_memory() && attempt + 1 < ladder.len() => {
                    tracing::warn!(
                        task_prompt_id = prompt.id,
                        worker_id = worker.id,
                        attempt = attempt + 1,
                        scale = step.scale,
                        batch_size = step.batch_size,
                        error = %e,
                        "Worker ran out of memory, retrying smaller",
                    );
                }
                Err(e) if e.is_out_of_memory() => {
                    return Err(OrchestratorError::SubmissionFailed {
                        attempts: ladder.len(),
                        source: e,
                    });
                }
                Err(e) => return Err(OrchestratorError::Worker(e)),
            }
        }

        let Some((response, batch_size)) = accepted else {
            return Err(OrchestratorError::Unavailable {
                worker: worker.name.clone(),
                reason: "no submission attempt was made".to_string(),
            });
        };

        let now = Utc::now();
        prompt.prompt_id = response.prompt_id;
        prompt.worker_endpoint = Some(endpoint.prompt_url());
        prompt.client_id = Some(client_id);
        prompt.batch_size = batch_size;
        prompt.status = response.status.unwrap_or_else(|| PROMPT_QUEUED.to_string());
        prompt.queued_at = Some(now);
        prompt.updated_at = now;
        let prompt = self.store.update_task_prompt(&prompt).await?;

        tracing::info!(
            task_prompt_id = prompt.id,
            task_id = task.id,
            worker_id = worker.id,
            prompt_id = prompt.prompt_id.as_deref().unwrap_or_default(),
            batch_size,
            "Prompt submitted",
        );
        self.tracker.track(worker, prompt).await
    }
}
