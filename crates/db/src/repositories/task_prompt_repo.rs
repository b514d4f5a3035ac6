//! Repository for the `task_prompts` table.

use datalabel_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::task_prompt::{CreateTaskPrompt, TaskPrompt};

const COLUMNS: &str = "\
    id, task_id, prompt, seed, seeds, mode, batch_size, applied_inputs, \
    worker_endpoint, client_id, prompt_id, status, \
    queued_at, started_at, completed_at, failed_at, \
    node_outputs, error, created_at, updated_at";

/// Provides CRUD operations for rendered task prompts.
pub struct TaskPromptRepo;

impl TaskPromptRepo {
    /// Insert a prompt in `draft` status under `task_id`.
    pub async fn create(
        conn: &mut PgConnection,
        task_id: DbId,
        input: &CreateTaskPrompt,
    ) -> Result<TaskPrompt, sqlx::Error> {
        let query = format!(
            "INSERT INTO task_prompts \
                (task_id, prompt, seed, seeds, mode, batch_size, applied_inputs, client_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TaskPrompt>(&query)
            .bind(task_id)
            .bind(&input.prompt)
            .bind(input.primary_seed())
            .bind(&input.seeds)
            .bind(&input.mode)
            .bind(input.batch_size)
            .bind(&input.applied_inputs)
            .bind(&input.client_id)
            .fetch_one(conn)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<TaskPrompt>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM task_prompts WHERE id = $1");
        sqlx::query_as::<_, TaskPrompt>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a task's prompts in creation order.
    pub async fn list_by_task(pool: &PgPool, task_id: DbId) -> Result<Vec<TaskPrompt>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM task_prompts WHERE task_id = $1 ORDER BY id ASC");
        sqlx::query_as::<_, TaskPrompt>(&query)
            .bind(task_id)
            .fetch_all(pool)
            .await
    }

    /// Move a prompt from `from` to `to` status.
    ///
    /// Returns `None` if no row with the given `id` is in `from`.
    pub async fn transition_status(
        pool: &PgPool,
        id: DbId,
        from: &str,
        to: &str,
    ) -> Result<Option<TaskPrompt>, sqlx::Error> {
        let query = format!(
            "UPDATE task_prompts SET status = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TaskPrompt>(&query)
            .bind(id)
            .bind(from)
            .bind(to)
            .fetch_optional(pool)
            .await
    }

    /// Persist submission and tracking state.
    ///
    /// Returns `None` if no row with the prompt's ID exists.
    pub async fn update_tracking(
        pool: &PgPool,
        prompt: &TaskPrompt,
    ) -> Result<Option<TaskPrompt>, sqlx::Error> {
        let query = format!(
            "UPDATE task_prompts SET \
                batch_size = $2, \
                worker_endpoint = $3, \
                client_id = $4, \
                prompt_id = $5, \
                status = $6, \
                queued_at = $7, \
                started_at = $8, \
                completed_at = $9, \
                failed_at = $10, \
                node_outputs = $11, \
                error = $12, \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TaskPrompt>(&query)
            .bind(prompt.id)
            .bind(prompt.batch_size)
            .bind(&prompt.worker_endpoint)
            .bind(&prompt.client_id)
            .bind(&prompt.prompt_id)
            .bind(&prompt.status)
            .bind(prompt.queued_at)
            .bind(prompt.started_at)
            .bind(prompt.completed_at)
            .bind(prompt.failed_at)
            .bind(&prompt.node_outputs)
            .bind(&prompt.error)
            .fetch_optional(pool)
            .await
    }
}
