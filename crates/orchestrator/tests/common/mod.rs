//! Shared fixtures: a scripted worker backend and an orchestrator over
//! [`MemoryStore`].

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use datalabel_comfyui::api::ComfyUIApiError;
use datalabel_comfyui::backend::{ComfyUIBackend, WorkerEndpoint};
use datalabel_comfyui::messages::{
    HistoryEntry, QueueSnapshot, SubmitRequest, SubmitResponse, SystemStats,
};
use datalabel_core::template::InputMapping;
use datalabel_core::variable_pool::VariableSlot;
use datalabel_db::models::task::CreateTask;
use datalabel_db::models::variable_pool::{CreateVariablePool, VariablePool};
use datalabel_db::models::worker::{CreateWorker, Worker};
use datalabel_db::models::workflow::{CreateWorkflow, Workflow};
use datalabel_orchestrator::config::OrchestratorConfig;
use datalabel_orchestrator::orchestrator::TaskOrchestrator;
use datalabel_orchestrator::store::{MemoryStore, Store};
use serde_json::{json, Value};

// ---------------------------------------------------------------------------
// Scripted backend
// ---------------------------------------------------------------------------

/// Behaviour of one scripted worker, keyed by base URL.
pub struct Script {
    pub reachable: bool,
    pub version: String,
    pub features: Vec<String>,
    /// Successive `/queue` totals; the last one repeats.
    pub queue_totals: VecDeque<usize>,
    /// Submissions with a larger batch fail out of memory.
    pub oom_above_batch: Option<i32>,
    pub always_oom: bool,
    /// Non-OOM failure returned by every submission.
    pub submit_error: Option<(u16, String)>,
    /// Submissions beyond this many (in total) are refused as busy.
    pub reject_after: Option<usize>,
    /// Status reported by `/history` for any ID; `None` answers 404.
    pub history_status: Option<String>,
    /// `images` reported alongside `history_status`.
    pub history_images: Value,
    /// Runs on every `/system_stats` call, before it answers.
    pub on_system_stats: Option<Box<dyn FnMut() + Send>>,
    pub submissions: Vec<SubmitRequest>,
    pub queue_calls: usize,
    pub history_calls: usize,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            reachable: true,
            version: "1.5.0".to_string(),
            features: vec!["sdxl".to_string()],
            queue_totals: VecDeque::new(),
            oom_above_batch: None,
            always_oom: false,
            submit_error: None,
            reject_after: None,
            history_status: Some("completed".to_string()),
            history_images: json!(["out_0001.png"]),
            on_system_stats: None,
            submissions: Vec::new(),
            queue_calls: 0,
            history_calls: 0,
        }
    }
}

fn unreachable() -> ComfyUIApiError {
    ComfyUIApiError::ApiError {
        status: 502,
        body: "connection refused".to_string(),
    }
}

#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, Script>>,
}

impl ScriptedBackend {
    pub fn script(&self, base_url: &str, edit: impl FnOnce(&mut Script)) {
        let mut scripts = self.scripts.lock().unwrap();
        edit(scripts.entry(base_url.to_string()).or_default());
    }

    pub fn set_queue(&self, base_url: &str, totals: &[usize]) {
        self.script(base_url, |s| s.queue_totals = totals.iter().copied().collect());
    }

    pub fn submissions(&self, base_url: &str) -> Vec<SubmitRequest> {
        self.with(base_url, |s| s.submissions.clone())
    }

    pub fn queue_calls(&self, base_url: &str) -> usize {
        self.with(base_url, |s| s.queue_calls)
    }

    pub fn history_calls(&self, base_url: &str) -> usize {
        self.with(base_url, |s| s.history_calls)
    }

    fn with<T>(&self, base_url: &str, read: impl FnOnce(&mut Script) -> T) -> T {
        let mut scripts = self.scripts.lock().unwrap();
        read(scripts.entry(base_url.to_string()).or_default())
    }
}

#[async_trait]
impl ComfyUIBackend for ScriptedBackend {
    async fn system_stats(&self, endpoint: &WorkerEndpoint) -> Result<SystemStats, ComfyUIApiError> {
        self.with(&endpoint.base_url, |s| {
            if let Some(hook) = s.on_system_stats.as_mut() {
                hook();
            }
            if !s.reachable {
                return Err(unreachable());
            }
            Ok(SystemStats {
                status: Some("ok".to_string()),
                version: Some(s.version.clone()),
                features: s.features.clone(),
                system: None,
            })
        })
    }

    async fn queue(&self, endpoint: &WorkerEndpoint) -> Result<QueueSnapshot, ComfyUIApiError> {
        self.with(&endpoint.base_url, |s| {
            s.queue_calls += 1;
            if !s.reachable {
                return Err(unreachable());
            }
            let total = if s.queue_totals.len() > 1 {
                s.queue_totals.pop_front().unwrap_or_default()
            } else {
                s.queue_totals.front().copied().unwrap_or_default()
            };
            Ok(QueueSnapshot {
                queue_pending: (0..total)
                    .map(|i| json!({"prompt_id": format!("other-{i}")}))
                    .collect(),
                queue_running: Vec::new(),
            })
        })
    }

    async fn submit_prompt(
        &self,
        endpoint: &WorkerEndpoint,
        request: &SubmitRequest,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        self.with(&endpoint.base_url, |s| {
            if !s.reachable {
                return Err(unreachable());
            }
            s.submissions.push(request.clone());
            let oom = s.always_oom || s.oom_above_batch.is_some_and(|max| request.batch_size > max);
            if oom {
                return Err(ComfyUIApiError::ApiError {
                    status: 500,
                    body: "torch.cuda.OutOfMemoryError: CUDA Out Of Memory".to_string(),
                });
            }
            if s.reject_after.is_some_and(|limit| s.submissions.len() > limit) {
                return Err(ComfyUIApiError::ApiError {
                    status: 503,
                    body: "worker busy".to_string(),
                });
            }
            if let Some((status, body)) = &s.submit_error {
                return Err(ComfyUIApiError::ApiError {
                    status: *status,
                    body: body.clone(),
                });
            }
            Ok(SubmitResponse {
                prompt_id: Some(format!("prompt-{}", s.submissions.len())),
                status: Some("queued".to_string()),
                number: Some(s.submissions.len() as i64),
            })
        })
    }

    async fn history(
        &self,
        endpoint: &WorkerEndpoint,
        _prompt_id: &str,
    ) -> Result<Option<HistoryEntry>, ComfyUIApiError> {
        self.with(&endpoint.base_url, |s| {
            s.history_calls += 1;
            if !s.reachable {
                return Err(unreachable());
            }
            let images = s.history_images.clone();
            Ok(s.history_status.clone().map(|status| HistoryEntry {
                status: Some(status),
                images: Some(images),
                ..Default::default()
            }))
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

/// Defaults with every wait shrunk to a few milliseconds.
pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        capacity_poll_interval: Duration::from_millis(2),
        capacity_wait_timeout: Duration::from_millis(100),
        prompt_poll_interval: Duration::from_millis(1),
        prompt_poll_max_attempts: 3,
        health_check_interval: Duration::from_millis(10),
        health_check_stagger: Duration::ZERO,
        ..OrchestratorConfig::default()
    }
}

pub struct Harness {
    pub store: MemoryStore,
    pub backend: Arc<ScriptedBackend>,
    pub config: OrchestratorConfig,
    pub orchestrator: TaskOrchestrator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        let store = MemoryStore::new();
        let backend = Arc::new(ScriptedBackend::default());
        let orchestrator = TaskOrchestrator::new(
            Arc::new(store.clone()),
            Arc::clone(&backend) as Arc<dyn ComfyUIBackend>,
            &config,
        );
        Self {
            store,
            backend,
            config,
            orchestrator,
        }
    }

    pub fn store_handle(&self) -> Arc<dyn Store> {
        Arc::new(self.store.clone())
    }

    pub fn backend_handle(&self) -> Arc<dyn ComfyUIBackend> {
        Arc::clone(&self.backend) as Arc<dyn ComfyUIBackend>
    }

    /// Register a worker and run its first health check.
    pub async fn worker(&self, name: &str, priority: i32, max_concurrent_jobs: i32) -> Worker {
        self.orchestrator
            .register_worker(&new_worker(name, priority, max_concurrent_jobs), true)
            .await
            .unwrap()
    }

    pub async fn workflow(&self) -> Workflow {
        self.orchestrator.add_workflow(&sdxl_workflow()).await.unwrap()
    }

    pub async fn pool(&self) -> VariablePool {
        self.orchestrator.add_variable_pool(&style_pool()).await.unwrap()
    }

    /// Workflow, pool and a `draft` task of four prompts at batch 2.
    pub async fn draft_task(&self) -> datalabel_db::models::task::Task {
        let workflow = self.workflow().await;
        let pool = self.pool().await;
        self.orchestrator
            .create_task(&task_input(workflow.id, pool.id))
            .await
            .unwrap()
    }

    /// A task walked through pilot and freeze.
    pub async fn frozen_task(&self) -> datalabel_db::models::task::Task {
        let task = self.draft_task().await;
        self.orchestrator.run_pilot(task.id).await.unwrap();
        self.orchestrator.freeze(task.id).await.unwrap()
    }
}

pub fn base_url(name: &str) -> String {
    format!("http://{name}.test:8188")
}

pub fn new_worker(name: &str, priority: i32, max_concurrent_jobs: i32) -> CreateWorker {
    CreateWorker {
        name: name.to_string(),
        base_url: base_url(name),
        api_key: None,
        enabled: None,
        priority: Some(priority),
        max_concurrent_jobs: Some(max_concurrent_jobs),
        tags: None,
    }
}

pub fn sdxl_workflow() -> CreateWorkflow {
    CreateWorkflow {
        name: "sdxl-base".to_string(),
        workflow_api: json!({
            "3": {"class_type": "KSampler", "inputs": {"seed": 0, "noise_seed": 0, "steps": 20}},
            "5": {"class_type": "EmptyLatentImage", "inputs": {"width": 1024, "height": 1024, "batch_size": 1}},
            "6": {"class_type": "CLIPTextEncode", "inputs": {"text": ""}}
        }),
        max_batch_size: Some(4),
        prompt_nodes: vec!["6".to_string()],
        seed_nodes: vec!["3".to_string()],
        allow_controlnet: false,
        allow_dynamic_resolution: true,
    }
}

pub fn style_pool() -> CreateVariablePool {
    CreateVariablePool {
        name: "styles".to_string(),
        version: "v1".to_string(),
        sampling_mode: None,
        variables: vec![
            VariableSlot::new("style", &["watercolor", "ink", "oil"]),
            VariableSlot::new("lighting", &["soft", "harsh"]),
        ],
    }
}

pub fn task_input(workflow_id: i64, variable_pool_id: i64) -> CreateTask {
    CreateTask {
        workflow_id,
        variable_pool_id,
        prompt_template: Some("a {style} portrait, {lighting} light".to_string()),
        variable_input_mappings: Vec::new(),
        batch_size: 2,
        seeds_per_prompt: 2,
        target_prompts: 4,
        client_id: None,
        extra_data: None,
    }
}

pub fn mapping(variable: &str, node_id: &str, input_name: &str) -> InputMapping {
    InputMapping {
        variable: variable.to_string(),
        node_id: node_id.to_string(),
        input_name: input_name.to_string(),
    }
}

/// `inputs.<key>` of `node` in a submitted graph.
pub fn input(request: &SubmitRequest, node: &str, key: &str) -> Value {
    request.prompt[node]["inputs"][key].clone()
}
