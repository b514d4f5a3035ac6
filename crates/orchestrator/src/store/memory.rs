use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use datalabel_core::task_status::{TaskStatus, PROMPT_DRAFT};
use datalabel_core::types::DbId;
use datalabel_core::variable_pool::MODE_PERMUTATION;
use datalabel_core::worker_selection::STATUS_UNKNOWN;
use datalabel_db::models::annotation::{Annotation, CreateAnnotation};
use datalabel_db::models::task::{CreateTask, Task};
use datalabel_db::models::task_prompt::{CreateTaskPrompt, TaskPrompt};
use datalabel_db::models::variable_pool::{CreateVariablePool, VariablePool};
use datalabel_db::models::worker::{CreateWorker, Worker};
use datalabel_db::models::workflow::{CreateWorkflow, Workflow};
use sqlx::types::Json;

use super::{Store, StoreError};

#[derive(Default)]
struct Tables {
    next_id: DbId,
    workers: BTreeMap<DbId, Worker>,
    workflows: BTreeMap<DbId, Workflow>,
    variable_pools: BTreeMap<DbId, VariablePool>,
    tasks: BTreeMap<DbId, Task>,
    task_prompts: BTreeMap<DbId, TaskPrompt>,
    annotations: BTreeMap<DbId, Annotation>,
}

impl Tables {
    fn allocate_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn build_prompt(&mut self, task_id: DbId, input: &CreateTaskPrompt) -> TaskPrompt {
        let now = Utc::now();
        TaskPrompt {
            id: self.allocate_id(),
            task_id,
            prompt: input.prompt.clone(),
            seed: input.primary_seed(),
            seeds: input.seeds.clone(),
            mode: input.mode.clone(),
            batch_size: input.batch_size,
            applied_inputs: input.applied_inputs.clone(),
            worker_endpoint: None,
            client_id: input.client_id.clone(),
            prompt_id: None,
            status: PROMPT_DRAFT.to_string(),
            queued_at: None,
            started_at: None,
            completed_at: None,
            failed_at: None,
            node_outputs: serde_json::json!({}),
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// In-process [`Store`] with the same defaults as the database schema.
///
/// Clones share state. IDs are allocated from one counter across all
/// tables, so they increase in insertion order.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn task_count(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn task_prompt_count(&self) -> usize {
        self.lock().task_prompts.len()
    }

    /// Drop a worker row, as an operator deleting it would.
    pub fn remove_worker(&self, id: DbId) {
        self.lock().workers.remove(&id);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_worker(&self, input: &CreateWorker) -> Result<Worker, StoreError> {
        let mut tables = self.lock();
        let now = Utc::now();
        let worker = Worker {
            id: tables.allocate_id(),
            name: input.name.clone(),
            base_url: input.base_url.clone(),
            api_key: input.api_key.clone(),
            enabled: input.enabled.unwrap_or(true),
            status: STATUS_UNKNOWN.to_string(),
            priority: input.priority.unwrap_or(0),
            max_concurrent_jobs: input.max_concurrent_jobs.unwrap_or(1),
            queue_length: 0,
            current_jobs: 0,
            tags: input.tags.clone().unwrap_or_default(),
            last_health_check: None,
            created_at: now,
            updated_at: now,
        };
        tables.workers.insert(worker.id, worker.clone());
        Ok(worker)
    }

    async fn get_worker(&self, id: DbId) -> Result<Option<Worker>, StoreError> {
        Ok(self.lock().workers.get(&id).cloned())
    }

    async fn list_workers(&self) -> Result<Vec<Worker>, StoreError> {
        Ok(self.lock().workers.values().cloned().collect())
    }

    async fn update_worker(&self, worker: &Worker) -> Result<Worker, StoreError> {
        let mut tables = self.lock();
        let stored = tables.workers.get_mut(&worker.id).ok_or(StoreError::Missing {
            entity: "worker",
            id: worker.id,
        })?;
        stored.status = worker.status.clone();
        stored.queue_length = worker.queue_length.max(0);
        stored.current_jobs = worker.current_jobs.max(0);
        stored.last_health_check = worker.last_health_check;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn insert_workflow(&self, input: &CreateWorkflow) -> Result<Workflow, StoreError> {
        let mut tables = self.lock();
        let workflow = Workflow {
            id: tables.allocate_id(),
            name: input.name.clone(),
            workflow_api: input.workflow_api.clone(),
            max_batch_size: input.max_batch_size.unwrap_or(4),
            prompt_nodes: input.prompt_nodes.clone(),
            seed_nodes: input.seed_nodes.clone(),
            allow_controlnet: input.allow_controlnet,
            allow_dynamic_resolution: input.allow_dynamic_resolution,
            created_at: Utc::now(),
        };
        tables.workflows.insert(workflow.id, workflow.clone());
        Ok(workflow)
    }

    async fn get_workflow(&self, id: DbId) -> Result<Option<Workflow>, StoreError> {
        Ok(self.lock().workflows.get(&id).cloned())
    }

    async fn insert_variable_pool(
        &self,
        input: &CreateVariablePool,
    ) -> Result<VariablePool, StoreError> {
        let mut tables = self.lock();
        let pool = VariablePool {
            id: tables.allocate_id(),
            name: input.name.clone(),
            version: input.version.clone(),
            sampling_mode: input
                .sampling_mode
                .clone()
                .unwrap_or_else(|| MODE_PERMUTATION.to_string()),
            variables: Json(input.variables.clone()),
            created_at: Utc::now(),
        };
        tables.variable_pools.insert(pool.id, pool.clone());
        Ok(pool)
    }

    async fn get_variable_pool(&self, id: DbId) -> Result<Option<VariablePool>, StoreError> {
        Ok(self.lock().variable_pools.get(&id).cloned())
    }

    async fn create_task_with_prompts(
        &self,
        input: &CreateTask,
        prompts: &[CreateTaskPrompt],
    ) -> Result<Task, StoreError> {
        let mut tables = self.lock();
        let now = Utc::now();
        let task = Task {
            id: tables.allocate_id(),
            workflow_id: input.workflow_id,
            variable_pool_id: input.variable_pool_id,
            prompt_template: input.prompt_template.clone(),
            variable_input_mappings: Json(input.variable_input_mappings.clone()),
            batch_size: input.batch_size,
            seeds_per_prompt: input.seeds_per_prompt,
            target_prompts: input.target_prompts,
            client_id: input.client_id.clone(),
            extra_data: input
                .extra_data
                .clone()
                .unwrap_or_else(|| serde_json::json!({})),
            status: TaskStatus::Draft.as_str().to_string(),
            workflow_snapshot: None,
            created_at: now,
            updated_at: now,
        };
        let rows: Vec<TaskPrompt> = prompts
            .iter()
            .map(|prompt| tables.build_prompt(task.id, prompt))
            .collect();
        for row in rows {
            tables.task_prompts.insert(row.id, row);
        }
        tables.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: DbId) -> Result<Option<Task>, StoreError> {
        Ok(self.lock().tasks.get(&id).cloned())
    }

    async fn update_task_state(
        &self,
        id: DbId,
        expected_status: &str,
        status: &str,
        workflow_snapshot: Option<&serde_json::Value>,
    ) -> Result<Option<Task>, StoreError> {
        let mut tables = self.lock();
        let task = tables
            .tasks
            .get_mut(&id)
            .ok_or(StoreError::Missing { entity: "task", id })?;
        if task.status != expected_status {
            return Ok(None);
        }
        task.status = status.to_string();
        if let Some(snapshot) = workflow_snapshot {
            task.workflow_snapshot = Some(snapshot.clone());
        }
        task.updated_at = Utc::now();
        Ok(Some(task.clone()))
    }

    async fn list_task_prompts(&self, task_id: DbId) -> Result<Vec<TaskPrompt>, StoreError> {
        Ok(self
            .lock()
            .task_prompts
            .values()
            .filter(|p| p.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn get_task_prompt(&self, id: DbId) -> Result<Option<TaskPrompt>, StoreError> {
        Ok(self.lock().task_prompts.get(&id).cloned())
    }

    async fn insert_task_prompt(
        &self,
        task_id: DbId,
        input: &CreateTaskPrompt,
    ) -> Result<TaskPrompt, StoreError> {
        let mut tables = self.lock();
        if !tables.tasks.contains_key(&task_id) {
            return Err(StoreError::Missing {
                entity: "task",
                id: task_id,
            });
        }
        let prompt = tables.build_prompt(task_id, input);
        tables.task_prompts.insert(prompt.id, prompt.clone());
        Ok(prompt)
    }

    async fn update_task_prompt(&self, prompt: &TaskPrompt) -> Result<TaskPrompt, StoreError> {
        let mut tables = self.lock();
        let stored = tables
            .task_prompts
            .get_mut(&prompt.id)
            .ok_or(StoreError::Missing {
                entity: "task_prompt",
                id: prompt.id,
            })?;
        stored.batch_size = prompt.batch_size;
        stored.worker_endpoint = prompt.worker_endpoint.clone();
        stored.client_id = prompt.client_id.clone();
        stored.prompt_id = prompt.prompt_id.clone();
        stored.status = prompt.status.clone();
        stored.queued_at = prompt.queued_at;
        stored.started_at = prompt.started_at;
        stored.completed_at = prompt.completed_at;
        stored.failed_at = prompt.failed_at;
        stored.node_outputs = prompt.node_outputs.clone();
        stored.error = prompt.error.clone();
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn claim_task_prompt(
        &self,
        id: DbId,
        from: &str,
        to: &str,
    ) -> Result<Option<TaskPrompt>, StoreError> {
        let mut tables = self.lock();
        let prompt = tables.task_prompts.get_mut(&id).ok_or(StoreError::Missing {
            entity: "task_prompt",
            id,
        })?;
        if prompt.status != from {
            return Ok(None);
        }
        prompt.status = to.to_string();
        prompt.updated_at = Utc::now();
        Ok(Some(prompt.clone()))
    }

    async fn insert_annotation(
        &self,
        task_prompt_id: DbId,
        input: &CreateAnnotation,
    ) -> Result<Annotation, StoreError> {
        let mut tables = self.lock();
        if !tables.task_prompts.contains_key(&task_prompt_id) {
            return Err(StoreError::Missing {
                entity: "task_prompt",
                id: task_prompt_id,
            });
        }
        let annotation = Annotation {
            id: tables.allocate_id(),
            task_prompt_id,
            chosen_index: input.chosen_index,
            rejected_index: input.rejected_index,
            spam: input.spam,
            comment: input.comment.clone(),
            created_at: Utc::now(),
        };
        tables.annotations.insert(annotation.id, annotation.clone());
        Ok(annotation)
    }

    async fn list_annotations(&self, task_prompt_id: DbId) -> Result<Vec<Annotation>, StoreError> {
        Ok(self
            .lock()
            .annotations
            .values()
            .filter(|a| a.task_prompt_id == task_prompt_id)
            .cloned()
            .collect())
    }

    async fn list_task_annotations(&self, task_id: DbId) -> Result<Vec<Annotation>, StoreError> {
        let tables = self.lock();
        Ok(tables
            .annotations
            .values()
            .filter(|a| {
                tables
                    .task_prompts
                    .get(&a.task_prompt_id)
                    .is_some_and(|p| p.task_id == task_id)
            })
            .cloned()
            .collect())
    }
}
