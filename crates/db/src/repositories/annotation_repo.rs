//! Repository for the `annotations` table.

use datalabel_core::types::DbId;
use sqlx::PgPool;

use crate::models::annotation::{Annotation, CreateAnnotation};

const COLUMNS: &str =
    "id, task_prompt_id, chosen_index, rejected_index, spam, comment, created_at";

/// Provides insert and lookup operations for annotations. Rows are
/// immutable once written.
pub struct AnnotationRepo;

impl AnnotationRepo {
    pub async fn create(
        pool: &PgPool,
        task_prompt_id: DbId,
        input: &CreateAnnotation,
    ) -> Result<Annotation, sqlx::Error> {
        let query = format!(
            "INSERT INTO annotations (task_prompt_id, chosen_index, rejected_index, spam, comment) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Annotation>(&query)
            .bind(task_prompt_id)
            .bind(input.chosen_index)
            .bind(input.rejected_index)
            .bind(input.spam)
            .bind(&input.comment)
            .fetch_one(pool)
            .await
    }

    /// List annotations for a prompt, oldest first.
    pub async fn list_by_prompt(
        pool: &PgPool,
        task_prompt_id: DbId,
    ) -> Result<Vec<Annotation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM annotations WHERE task_prompt_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, Annotation>(&query)
            .bind(task_prompt_id)
            .fetch_all(pool)
            .await
    }

    /// List annotations for every prompt of a task, oldest first.
    pub async fn list_by_task(pool: &PgPool, task_id: DbId) -> Result<Vec<Annotation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM annotations \
             WHERE task_prompt_id IN (SELECT id FROM task_prompts WHERE task_id = $1) \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, Annotation>(&query)
            .bind(task_id)
            .fetch_all(pool)
            .await
    }
}
