//! Repository for the `tasks` table.

use datalabel_core::types::DbId;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use crate::models::task::{CreateTask, Task};
use crate::models::task_prompt::{CreateTaskPrompt, TaskPrompt};
use crate::repositories::TaskPromptRepo;

const COLUMNS: &str = "\
    id, workflow_id, variable_pool_id, prompt_template, variable_input_mappings, \
    batch_size, seeds_per_prompt, target_prompts, client_id, extra_data, status, \
    workflow_snapshot, created_at, updated_at";

/// Provides CRUD operations for generation tasks.
pub struct TaskRepo;

impl TaskRepo {
    /// Insert a task in `draft` status on an open connection.
    pub async fn create(conn: &mut PgConnection, input: &CreateTask) -> Result<Task, sqlx::Error> {
        let query = format!(
            "INSERT INTO tasks \
                (workflow_id, variable_pool_id, prompt_template, variable_input_mappings, \
                 batch_size, seeds_per_prompt, target_prompts, client_id, extra_data) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, '{{}}'::jsonb)) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(input.workflow_id)
            .bind(input.variable_pool_id)
            .bind(&input.prompt_template)
            .bind(Json(&input.variable_input_mappings))
            .bind(input.batch_size)
            .bind(input.seeds_per_prompt)
            .bind(input.target_prompts)
            .bind(&input.client_id)
            .bind(&input.extra_data)
            .fetch_one(conn)
            .await
    }

    /// Insert a task together with its prompts in one transaction.
    ///
    /// Either every row is written or none is.
    pub async fn create_with_prompts(
        pool: &PgPool,
        input: &CreateTask,
        prompts: &[CreateTaskPrompt],
    ) -> Result<(Task, Vec<TaskPrompt>), sqlx::Error> {
        let mut tx = pool.begin().await?;
        let task = Self::create(&mut *tx, input).await?;
        let mut created = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            created.push(TaskPromptRepo::create(&mut *tx, task.id, prompt).await?);
        }
        tx.commit().await?;
        Ok((task, created))
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Task>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tasks WHERE id = $1");
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Move a task from `expected_status` to `status`, and set the
    /// workflow snapshot when one is given.
    ///
    /// An existing snapshot is kept when `workflow_snapshot` is `None`.
    /// Returns `None` if no row with the given `id` is in `expected_status`.
    pub async fn update_state(
        pool: &PgPool,
        id: DbId,
        expected_status: &str,
        status: &str,
        workflow_snapshot: Option<&serde_json::Value>,
    ) -> Result<Option<Task>, sqlx::Error> {
        let query = format!(
            "UPDATE tasks SET \
                status = $3, \
                workflow_snapshot = COALESCE($4, workflow_snapshot), \
                updated_at = NOW() \
             WHERE id = $1 AND status = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Task>(&query)
            .bind(id)
            .bind(expected_status)
            .bind(status)
            .bind(workflow_snapshot)
            .fetch_optional(pool)
            .await
    }
}
