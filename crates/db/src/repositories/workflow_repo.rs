//! Repository for the `workflows` table.

use datalabel_core::types::DbId;
use sqlx::PgPool;

use crate::models::workflow::{CreateWorkflow, Workflow};

const COLUMNS: &str = "\
    id, name, workflow_api, max_batch_size, prompt_nodes, seed_nodes, \
    allow_controlnet, allow_dynamic_resolution, created_at";

/// Provides CRUD operations for workflows.
pub struct WorkflowRepo;

impl WorkflowRepo {
    /// Insert a new workflow, returning the created row.
    ///
    /// If `max_batch_size` is `None`, defaults to 4.
    pub async fn create(pool: &PgPool, input: &CreateWorkflow) -> Result<Workflow, sqlx::Error> {
        let query = format!(
            "INSERT INTO workflows \
                (name, workflow_api, max_batch_size, prompt_nodes, seed_nodes, \
                 allow_controlnet, allow_dynamic_resolution) \
             VALUES ($1, $2, COALESCE($3, 4), $4, $5, $6, $7) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Workflow>(&query)
            .bind(&input.name)
            .bind(&input.workflow_api)
            .bind(input.max_batch_size)
            .bind(&input.prompt_nodes)
            .bind(&input.seed_nodes)
            .bind(input.allow_controlnet)
            .bind(input.allow_dynamic_resolution)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Workflow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workflows WHERE id = $1");
        sqlx::query_as::<_, Workflow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
