//! Data-access seam used by the orchestrator.
//!
//! [`PgStore`] backs production; [`MemoryStore`] keeps everything in
//! process for tests and dry runs.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use datalabel_core::types::DbId;
use datalabel_db::models::annotation::{Annotation, CreateAnnotation};
use datalabel_db::models::task::{CreateTask, Task};
use datalabel_db::models::task_prompt::{CreateTaskPrompt, TaskPrompt};
use datalabel_db::models::variable_pool::{CreateVariablePool, VariablePool};
use datalabel_db::models::worker::{CreateWorker, Worker};
use datalabel_db::models::workflow::{CreateWorkflow, Workflow};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored JSON document (e.g. a workflow snapshot) could not be
    /// encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An update targeted a row that no longer exists.
    #[error("{entity} {id} no longer exists")]
    Missing { entity: &'static str, id: DbId },
}

/// Persistence operations the orchestrator performs.
///
/// Update methods fail with [`StoreError::Missing`] when the row is gone.
#[async_trait]
pub trait Store: Send + Sync {
    // -- Workers -------------------------------------------------------------

    async fn insert_worker(&self, input: &CreateWorker) -> Result<Worker, StoreError>;

    async fn get_worker(&self, id: DbId) -> Result<Option<Worker>, StoreError>;

    async fn list_workers(&self) -> Result<Vec<Worker>, StoreError>;

    /// Persist status, queue length, job counter and last health check.
    async fn update_worker(&self, worker: &Worker) -> Result<Worker, StoreError>;

    // -- Workflows and pools -------------------------------------------------

    async fn insert_workflow(&self, input: &CreateWorkflow) -> Result<Workflow, StoreError>;

    async fn get_workflow(&self, id: DbId) -> Result<Option<Workflow>, StoreError>;

    async fn insert_variable_pool(
        &self,
        input: &CreateVariablePool,
    ) -> Result<VariablePool, StoreError>;

    async fn get_variable_pool(&self, id: DbId) -> Result<Option<VariablePool>, StoreError>;

    // -- Tasks ---------------------------------------------------------------

    /// Write a task and all of its prompts atomically.
    async fn create_task_with_prompts(
        &self,
        task: &CreateTask,
        prompts: &[CreateTaskPrompt],
    ) -> Result<Task, StoreError>;

    async fn get_task(&self, id: DbId) -> Result<Option<Task>, StoreError>;

    /// Move the task from `expected_status` to `status`; replaces the
    /// workflow snapshot only when one is given.
    ///
    /// Returns `Ok(None)` when the task is no longer in `expected_status`.
    async fn update_task_state(
        &self,
        id: DbId,
        expected_status: &str,
        status: &str,
        workflow_snapshot: Option<&serde_json::Value>,
    ) -> Result<Option<Task>, StoreError>;

    // -- Prompts -------------------------------------------------------------

    /// A task's prompts in creation order.
    async fn list_task_prompts(&self, task_id: DbId) -> Result<Vec<TaskPrompt>, StoreError>;

    async fn get_task_prompt(&self, id: DbId) -> Result<Option<TaskPrompt>, StoreError>;

    async fn insert_task_prompt(
        &self,
        task_id: DbId,
        input: &CreateTaskPrompt,
    ) -> Result<TaskPrompt, StoreError>;

    /// Persist submission and tracking fields.
    async fn update_task_prompt(&self, prompt: &TaskPrompt) -> Result<TaskPrompt, StoreError>;

    /// Move a prompt from status `from` to `to`.
    ///
    /// Returns `Ok(None)` when the prompt is no longer in `from`.
    async fn claim_task_prompt(
        &self,
        id: DbId,
        from: &str,
        to: &str,
    ) -> Result<Option<TaskPrompt>, StoreError>;

    // -- Annotations ---------------------------------------------------------

    async fn insert_annotation(
        &self,
        task_prompt_id: DbId,
        input: &CreateAnnotation,
    ) -> Result<Annotation, StoreError>;

    async fn list_annotations(&self, task_prompt_id: DbId) -> Result<Vec<Annotation>, StoreError>;

    /// Annotations across all of a task's prompts, oldest first.
    async fn list_task_annotations(&self, task_id: DbId) -> Result<Vec<Annotation>, StoreError>;
}
