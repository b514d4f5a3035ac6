//! Task lifecycle: create, pilot, freeze, generate, annotate.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use datalabel_comfyui::backend::ComfyUIBackend;
use datalabel_core::annotation::validate_selection;
use datalabel_core::error::CoreError;
use datalabel_core::preference_export::{build_record, PreferenceMetadata, PreferenceRecord};
use datalabel_core::seeds::generate_seeds;
use datalabel_core::task_status::{
    is_failed_prompt_status, TaskStatus, MODE_MASS, PROMPT_DRAFT, PROMPT_SUBMITTING,
};
use datalabel_core::template::PromptRenderer;
use datalabel_core::types::DbId;
use datalabel_core::variable_pool::{expand, validate_slots, SamplingMode};
use datalabel_core::workflow_graph::{inspect_graph, normalize_graph};
use datalabel_db::models::annotation::{Annotation, CreateAnnotation};
use datalabel_db::models::task::{CreateTask, Task};
use datalabel_db::models::task_prompt::{CreateTaskPrompt, TaskPrompt};
use datalabel_db::models::variable_pool::{CreateVariablePool, VariablePool};
use datalabel_db::models::worker::{CreateWorker, Worker};
use datalabel_db::models::workflow::{CreateWorkflow, Workflow};
use serde_json::Value;

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::pilot::{pilot_clone, rank_candidates};
use crate::registry::WorkerRegistry;
use crate::store::{Store, StoreError};
use crate::submission::JobSubmitter;

/// Outcome of a successful pilot run.
#[derive(Debug, Clone)]
pub struct PilotReport {
    /// The task, now `pilot_passed`.
    pub task: Task,
    /// Pilot prompts as last observed.
    pub prompts: Vec<TaskPrompt>,
}

/// Outcome of a mass generation run.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    /// The task, now `completed`.
    pub task: Task,
    pub submitted: usize,
}

/// Tasks with a `generate` run in progress in this process.
type ActiveGenerations = Arc<Mutex<HashSet<DbId>>>;

/// Held for the duration of one `generate` run; releases the task on drop.
struct GenerationClaim {
    active: ActiveGenerations,
    task_id: DbId,
}

impl GenerationClaim {
    fn acquire(active: &ActiveGenerations, task_id: DbId) -> Option<Self> {
        let inserted = active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id);
        inserted.then(|| Self {
            active: Arc::clone(active),
            task_id,
        })
    }
}

impl Drop for GenerationClaim {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.task_id);
    }
}

#[derive(Clone)]
pub struct TaskOrchestrator {
    store: Arc<dyn Store>,
    registry: WorkerRegistry,
    submitter: JobSubmitter,
    pilot_sample_size: usize,
    active_generations: ActiveGenerations,
}

impl TaskOrchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        backend: Arc<dyn ComfyUIBackend>,
        config: &OrchestratorConfig,
    ) -> Self {
        let registry = WorkerRegistry::new(Arc::clone(&store), Arc::clone(&backend), config);
        let submitter = JobSubmitter::new(Arc::clone(&store), backend, registry.clone(), config);
        Self {
            store,
            registry,
            submitter,
            pilot_sample_size: config.pilot_sample_size,
            active_generations: ActiveGenerations::default(),
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    pub fn submitter(&self) -> &JobSubmitter {
        &self.submitter
    }

    // ---------------------------------------------------------------------
    // Admin
    // ---------------------------------------------------------------------

    /// Validate and store a workflow. Prompt and seed nodes are detected
    /// from the graph when the input names none.
    pub async fn add_workflow(&self, input: &CreateWorkflow) -> Result<Workflow, OrchestratorError> {
        if input.name.trim().is_empty() {
            return Err(CoreError::Validation("Workflow name is required".to_string()).into());
        }
        if input.max_batch_size.is_some_and(|max| max <= 0) {
            return Err(
                CoreError::Validation("max_batch_size must be greater than 0".to_string()).into(),
            );
        }
        let inspection = inspect_graph(&normalize_graph(&input.workflow_api))?;
        let mut input = input.clone();
        if input.prompt_nodes.is_empty() {
            input.prompt_nodes = inspection.prompt_nodes;
        }
        if input.seed_nodes.is_empty() {
            input.seed_nodes = inspection.seed_nodes;
        }

        let workflow = self.store.insert_workflow(&input).await?;
        tracing::info!(
            workflow_id = workflow.id,
            name = %workflow.name,
            prompt_nodes = ?workflow.prompt_nodes,
            seed_nodes = ?workflow.seed_nodes,
            "Workflow added",
        );
        Ok(workflow)
    }

    pub async fn add_variable_pool(
        &self,
        input: &CreateVariablePool,
    ) -> Result<VariablePool, OrchestratorError> {
        if let Some(mode) = &input.sampling_mode {
            SamplingMode::parse(mode)?;
        }
        validate_slots(&input.variables)?;
        let pool = self.store.insert_variable_pool(input).await?;
        tracing::info!(variable_pool_id = pool.id, key = %pool.key(), "Variable pool added");
        Ok(pool)
    }

    pub async fn register_worker(
        &self,
        input: &CreateWorker,
        check: bool,
    ) -> Result<Worker, OrchestratorError> {
        self.registry.register_worker(input, check).await
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    /// Expand the pool, render every prompt and persist the task with its
    /// prompts in one write. Nothing is written on failure.
    pub async fn create_task(&self, input: &CreateTask) -> Result<Task, OrchestratorError> {
        for (field, value) in [
            ("batch_size", input.batch_size),
            ("seeds_per_prompt", input.seeds_per_prompt),
            ("target_prompts", input.target_prompts),
        ] {
            if value < 1 {
                return Err(CoreError::Validation(format!("{field} must be at least 1")).into());
            }
        }

        let workflow = self.workflow(input.workflow_id).await?;
        let pool = self
            .store
            .get_variable_pool(input.variable_pool_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "variable_pool",
                id: input.variable_pool_id,
            })?;

        if input.batch_size > workflow.max_batch_size {
            return Err(CoreError::BatchLimit {
                requested: input.batch_size,
                max: workflow.max_batch_size,
            }
            .into());
        }

        let renderer = PromptRenderer::new(
            input.prompt_template.as_deref(),
            &input.variable_input_mappings,
        )?;
        let mode = SamplingMode::parse(&pool.sampling_mode)?;
        let combinations = expand(&pool.variables, mode, input.target_prompts as usize)?;

        let prompts = combinations
            .iter()
            .map(|combination| {
                let rendered = renderer.render(combination)?;
                Ok(CreateTaskPrompt {
                    prompt: rendered.text,
                    seeds: generate_seeds(input.seeds_per_prompt as usize),
                    mode: MODE_MASS.to_string(),
                    batch_size: input.batch_size,
                    applied_inputs: Value::Object(rendered.applied_inputs),
                    client_id: None,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        let task = self.store.create_task_with_prompts(input, &prompts).await?;
        tracing::info!(
            task_id = task.id,
            workflow_id = workflow.id,
            pool = %pool.key(),
            prompts = prompts.len(),
            "Task created",
        );
        Ok(task)
    }

    /// Submit the most expensive prompts at batch size 1. On success the
    /// workflow is snapshotted and the task moves to `pilot_passed`.
    pub async fn run_pilot(&self, task_id: DbId) -> Result<PilotReport, OrchestratorError> {
        let task = self.task(task_id).await?;
        TaskStatus::parse(&task.status)?.require("pilot", TaskStatus::Draft)?;
        let workflow = self.task_workflow(&task).await?;
        let worker = self
            .registry
            .select(None)
            .await?
            .ok_or(OrchestratorError::NoWorkers)?;

        let prompts = self.store.list_task_prompts(task.id).await?;
        let candidates = rank_candidates(&workflow, &prompts, self.pilot_sample_size);
        let total = candidates.len();
        tracing::info!(task_id, worker_id = worker.id, total, "Pilot started");

        let mut failed = 0;
        let mut observed = Vec::with_capacity(total);
        for candidate in candidates {
            let clone = self.store.insert_task_prompt(task.id, &pilot_clone(candidate)).await?;
            self.registry.record_job(worker.id).await?;
            let result = self.submitter.submit(&worker, &workflow, &task, clone).await;
            self.registry.complete_job(worker.id).await?;

            match result {
                Ok(prompt) => {
                    if is_failed_prompt_status(&prompt.status) {
                        failed += 1;
                    }
                    observed.push(prompt);
                }
                Err(OrchestratorError::Store(e)) => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(task_id, error = %e, "Pilot submission failed");
                    failed += 1;
                    break;
                }
            }
        }

        if failed > 0 {
            tracing::warn!(task_id, failed, total, "Pilot failed, task stays draft");
            return Err(OrchestratorError::PilotFailed { failed, total });
        }

        let snapshot = serde_json::to_value(&workflow).map_err(StoreError::from)?;
        let task = self
            .transition(&task, TaskStatus::PilotPassed, Some(&snapshot))
            .await?;
        tracing::info!(task_id, total, "Pilot passed");
        Ok(PilotReport {
            task,
            prompts: observed,
        })
    }

    /// Lock the task. Takes a workflow snapshot only if the pilot did not.
    pub async fn freeze(&self, task_id: DbId) -> Result<Task, OrchestratorError> {
        let task = self.task(task_id).await?;
        TaskStatus::parse(&task.status)?.require("freeze", TaskStatus::PilotPassed)?;

        let snapshot = match task.workflow_snapshot {
            Some(_) => None,
            None => {
                let workflow = self.workflow(task.workflow_id).await?;
                Some(serde_json::to_value(&workflow).map_err(StoreError::from)?)
            }
        };
        let task = self
            .transition(&task, TaskStatus::Frozen, snapshot.as_ref())
            .await?;
        tracing::info!(task_id, "Task frozen");
        Ok(task)
    }

    /// Check everything `generate` needs before any submission: the task
    /// is frozen, its batch fits the snapshot workflow and a worker is
    /// available.
    pub async fn preflight_generate(
        &self,
        task_id: DbId,
    ) -> Result<(Task, Workflow, Worker), OrchestratorError> {
        let task = self.task(task_id).await?;
        TaskStatus::parse(&task.status)?.require("generate", TaskStatus::Frozen)?;
        let workflow = self.task_workflow(&task).await?;
        if task.batch_size > workflow.max_batch_size {
            return Err(CoreError::BatchLimit {
                requested: task.batch_size,
                max: workflow.max_batch_size,
            }
            .into());
        }
        let worker = self
            .registry
            .select(None)
            .await?
            .ok_or(OrchestratorError::NoWorkers)?;
        Ok((task, workflow, worker))
    }

    /// Submit every mass prompt in persisted order, then complete the task.
    /// Any failure leaves the task `frozen`; prompts already submitted are
    /// skipped when generation is started again.
    ///
    /// A second run for a task that is already generating fails with
    /// [`CoreError::InvalidState`]. Each prompt is claimed before it is
    /// submitted, and a prompt claimed elsewhere is skipped.
    pub async fn generate(&self, task_id: DbId) -> Result<GenerationReport, OrchestratorError> {
        let _claim = GenerationClaim::acquire(&self.active_generations, task_id).ok_or(
            CoreError::InvalidState {
                action: "generate",
                status: "generating".to_string(),
            },
        )?;
        let (task, workflow, worker) = self.preflight_generate(task_id).await?;
        let prompts: Vec<TaskPrompt> = self
            .store
            .list_task_prompts(task.id)
            .await?
            .into_iter()
            .filter(|p| p.mode == MODE_MASS && p.status == PROMPT_DRAFT)
            .collect();
        tracing::info!(task_id, worker_id = worker.id, prompts = prompts.len(), "Generation started");

        self.registry.record_job(worker.id).await?;
        let result = self.submit_claimed(&worker, &workflow, &task, prompts).await;
        self.registry.complete_job(worker.id).await?;
        let submitted = match result {
            Ok(submitted) => submitted,
            Err((submitted, e)) => {
                tracing::error!(task_id, submitted, error = %e, "Generation stopped, task stays frozen");
                return Err(e);
            }
        };

        let task = self.transition(&task, TaskStatus::Completed, None).await?;
        tracing::info!(task_id, submitted, "Generation completed");
        Ok(GenerationReport { task, submitted })
    }

    /// Claim and submit each prompt. On failure the failed prompt is
    /// released back to `draft` if the worker never accepted it, and the
    /// error is returned with the number submitted so far.
    async fn submit_claimed(
        &self,
        worker: &Worker,
        workflow: &Workflow,
        task: &Task,
        prompts: Vec<TaskPrompt>,
    ) -> Result<usize, (usize, OrchestratorError)> {
        let mut submitted = 0;
        for prompt in prompts {
            let claimed = self
                .store
                .claim_task_prompt(prompt.id, PROMPT_DRAFT, PROMPT_SUBMITTING)
                .await
                .map_err(|e| (submitted, OrchestratorError::from(e)))?;
            let Some(claimed) = claimed else {
                tracing::debug!(task_prompt_id = prompt.id, "Prompt claimed by another run, skipping");
                continue;
            };
            if let Err(e) = self.submitter.submit(worker, workflow, task, claimed).await {
                if let Err(release) = self
                    .store
                    .claim_task_prompt(prompt.id, PROMPT_SUBMITTING, PROMPT_DRAFT)
                    .await
                {
                    tracing::warn!(task_prompt_id = prompt.id, error = %release, "Failed to release prompt");
                }
                return Err((submitted, e));
            }
            submitted += 1;
        }
        Ok(submitted)
    }

    /// Build DPO preference records from a task's annotations, oldest
    /// first. Spam, and annotations whose chosen image is missing, are
    /// skipped.
    pub async fn export_preferences(
        &self,
        task_id: DbId,
    ) -> Result<Vec<PreferenceRecord>, OrchestratorError> {
        let task = self.task(task_id).await?;
        let pool_version = self
            .store
            .get_variable_pool(task.variable_pool_id)
            .await?
            .map(|pool| pool.version)
            .unwrap_or_default();
        let prompts: HashMap<DbId, TaskPrompt> = self
            .store
            .list_task_prompts(task.id)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        let annotations = self.store.list_task_annotations(task.id).await?;

        let total = annotations.len();
        let records: Vec<PreferenceRecord> = annotations
            .iter()
            .filter_map(|annotation| {
                let prompt = prompts.get(&annotation.task_prompt_id)?;
                let images = prompt.node_outputs.get("images").cloned().unwrap_or_default();
                build_record(
                    &prompt.prompt,
                    &prompt.seeds,
                    &images,
                    annotation.chosen_index,
                    annotation.rejected_index,
                    annotation.spam,
                    PreferenceMetadata {
                        workflow_id: task.workflow_id,
                        variable_pool_version: pool_version.clone(),
                        created_at: annotation.created_at,
                    },
                )
            })
            .collect();
        tracing::info!(task_id, annotations = total, records = records.len(), "Preferences exported");
        Ok(records)
    }

    /// Record a preference judgement for one generated prompt.
    pub async fn annotate(
        &self,
        task_prompt_id: DbId,
        input: &CreateAnnotation,
    ) -> Result<Annotation, OrchestratorError> {
        let prompt = self
            .store
            .get_task_prompt(task_prompt_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "task_prompt",
                id: task_prompt_id,
            })?;
        validate_selection(
            input.chosen_index,
            input.rejected_index,
            input.spam,
            prompt.seeds.len(),
        )?;
        let annotation = self.store.insert_annotation(prompt.id, input).await?;
        tracing::info!(task_prompt_id, annotation_id = annotation.id, spam = input.spam, "Annotation recorded");
        Ok(annotation)
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    async fn task(&self, id: DbId) -> Result<Task, OrchestratorError> {
        self.store
            .get_task(id)
            .await?
            .ok_or_else(|| CoreError::NotFound { entity: "task", id }.into())
    }

    async fn workflow(&self, id: DbId) -> Result<Workflow, OrchestratorError> {
        self.store
            .get_workflow(id)
            .await?
            .ok_or_else(|| CoreError::NotFound { entity: "workflow", id }.into())
    }

    /// The snapshot taken when the pilot passed, else the live workflow.
    async fn task_workflow(&self, task: &Task) -> Result<Workflow, OrchestratorError> {
        match &task.workflow_snapshot {
            Some(snapshot) => Ok(serde_json::from_value(snapshot.clone()).map_err(StoreError::from)?),
            None => self.workflow(task.workflow_id).await,
        }
    }

    async fn transition(
        &self,
        task: &Task,
        to: TaskStatus,
        snapshot: Option<&Value>,
    ) -> Result<Task, OrchestratorError> {
        let from = TaskStatus::parse(&task.status)?;
        if !from.can_transition(to) {
            return Err(CoreError::InvalidState {
                action: "advance",
                status: task.status.clone(),
            }
            .into());
        }
        match self
            .store
            .update_task_state(task.id, from.as_str(), to.as_str(), snapshot)
            .await?
        {
            Some(updated) => Ok(updated),
            // Another writer moved the task first.
            None => {
                let current = self.task(task.id).await?;
                Err(CoreError::InvalidState {
                    action: "advance",
                    status: current.status,
                }
                .into())
            }
        }
    }
}
