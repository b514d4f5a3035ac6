use async_trait::async_trait;
use datalabel_core::types::DbId;
use datalabel_db::models::annotation::{Annotation, CreateAnnotation};
use datalabel_db::models::task::{CreateTask, Task};
use datalabel_db::models::task_prompt::{CreateTaskPrompt, TaskPrompt};
use datalabel_db::models::variable_pool::{CreateVariablePool, VariablePool};
use datalabel_db::models::worker::{CreateWorker, Worker};
use datalabel_db::models::workflow::{CreateWorkflow, Workflow};
use datalabel_db::repositories::{
    AnnotationRepo, TaskPromptRepo, TaskRepo, VariablePoolRepo, WorkerRepo, WorkflowRepo,
};
use sqlx::PgPool;

use super::{Store, StoreError};

/// [`Store`] over the `datalabel-db` repositories.
///
/// Cloning shares the underlying connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_worker(&self, input: &CreateWorker) -> Result<Worker, StoreError> {
        Ok(WorkerRepo::create(&self.pool, input).await?)
    }

    async fn get_worker(&self, id: DbId) -> Result<Option<Worker>, StoreError> {
        Ok(WorkerRepo::find_by_id(&self.pool, id).await?)
    }

    async fn list_workers(&self) -> Result<Vec<Worker>, StoreError> {
        Ok(WorkerRepo::list(&self.pool).await?)
    }

    async fn update_worker(&self, worker: &Worker) -> Result<Worker, StoreError> {
        WorkerRepo::update_runtime(&self.pool, worker)
            .await?
            .ok_or(StoreError::Missing {
                entity: "worker",
                id: worker.id,
            })
    }

    async fn insert_workflow(&self, input: &CreateWorkflow) -> Result<Workflow, StoreError> {
        Ok(WorkflowRepo::create(&self.pool, input).await?)
    }

    async fn get_workflow(&self, id: DbId) -> Result<Option<Workflow>, StoreError> {
        Ok(WorkflowRepo::find_by_id(&self.pool, id).await?)
    }

    async fn insert_variable_pool(
        &self,
        input: &CreateVariablePool,
    ) -> Result<VariablePool, StoreError> {
        Ok(VariablePoolRepo::create(&self.pool, input).await?)
    }

    async fn get_variable_pool(&self, id: DbId) -> Result<Option<VariablePool>, StoreError> {
        Ok(VariablePoolRepo::find_by_id(&self.pool, id).await?)
    }

    async fn create_task_with_prompts(
        &self,
        task: &CreateTask,
        prompts: &[CreateTaskPrompt],
    ) -> Result<Task, StoreError> {
        let (task, _) = TaskRepo::create_with_prompts(&self.pool, task, prompts).await?;
        Ok(task)
    }

    async fn get_task(&self, id: DbId) -> Result<Option<Task>, StoreError> {
        Ok(TaskRepo::find_by_id(&self.pool, id).await?)
    }

    async fn update_task_state(
        &self,
        id: DbId,
        expected_status: &str,
        status: &str,
        workflow_snapshot: Option<&serde_json::Value>,
    ) -> Result<Option<Task>, StoreError> {
        let updated =
            TaskRepo::update_state(&self.pool, id, expected_status, status, workflow_snapshot).await?;
        if updated.is_none() && TaskRepo::find_by_id(&self.pool, id).await?.is_none() {
            return Err(StoreError::Missing { entity: "task", id });
        }
        Ok(updated)
    }

    async fn list_task_prompts(&self, task_id: DbId) -> Result<Vec<TaskPrompt>, StoreError> {
        Ok(TaskPromptRepo::list_by_task(&self.pool, task_id).await?)
    }

    async fn get_task_prompt(&self, id: DbId) -> Result<Option<TaskPrompt>, StoreError> {
        Ok(TaskPromptRepo::find_by_id(&self.pool, id).await?)
    }

    async fn insert_task_prompt(
        &self,
        task_id: DbId,
        input: &CreateTaskPrompt,
    ) -> Result<TaskPrompt, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(TaskPromptRepo::create(&mut *conn, task_id, input).await?)
    }

    async fn update_task_prompt(&self, prompt: &TaskPrompt) -> Result<TaskPrompt, StoreError> {
        TaskPromptRepo::update_tracking(&self.pool, prompt)
            .await?
            .ok_or(StoreError::Missing {
                entity: "task_prompt",
                id: prompt.id,
            })
    }

    async fn claim_task_prompt(
        &self,
        id: DbId,
        from: &str,
        to: &str,
    ) -> Result<Option<TaskPrompt>, StoreError> {
        let claimed = TaskPromptRepo::transition_status(&self.pool, id, from, to).await?;
        if claimed.is_none() && TaskPromptRepo::find_by_id(&self.pool, id).await?.is_none() {
            return Err(StoreError::Missing {
                entity: "task_prompt",
                id,
            });
        }
        Ok(claimed)
    }

    async fn insert_annotation(
        &self,
        task_prompt_id: DbId,
        input: &CreateAnnotation,
    ) -> Result<Annotation, StoreError> {
        Ok(AnnotationRepo::create(&self.pool, task_prompt_id, input).await?)
    }

    async fn list_annotations(&self, task_prompt_id: DbId) -> Result<Vec<Annotation>, StoreError> {
        Ok(AnnotationRepo::list_by_prompt(&self.pool, task_prompt_id).await?)
    }

    async fn list_task_annotations(&self, task_id: DbId) -> Result<Vec<Annotation>, StoreError> {
        Ok(AnnotationRepo::list_by_task(&self.pool, task_id).await?)
    }
}
