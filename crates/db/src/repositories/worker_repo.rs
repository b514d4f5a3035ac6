//! Repository for the `workers` table.

use datalabel_core::types::DbId;
use sqlx::PgPool;

use crate::models::worker::{CreateWorker, Worker};

/// Column list for `workers` queries.
const COLUMNS: &str = "\
    id, name, base_url, api_key, enabled, status, priority, \
    max_concurrent_jobs, queue_length, current_jobs, tags, \
    last_health_check, created_at, updated_at";

/// Provides query operations for rendering workers.
pub struct WorkerRepo;

impl WorkerRepo {
    /// Register a worker with status `UNKNOWN`, returning the inserted row.
    pub async fn create(pool: &PgPool, input: &CreateWorker) -> Result<Worker, sqlx::Error> {
        let query = format!(
            "INSERT INTO workers (name, base_url, api_key, enabled, priority, max_concurrent_jobs, tags) \
             VALUES ($1, $2, $3, COALESCE($4, TRUE), COALESCE($5, 0), COALESCE($6, 1), COALESCE($7, '{{}}')) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Worker>(&query)
            .bind(&input.name)
            .bind(&input.base_url)
            .bind(&input.api_key)
            .bind(input.enabled)
            .bind(input.priority)
            .bind(input.max_concurrent_jobs)
            .bind(&input.tags)
            .fetch_one(pool)
            .await
    }

    /// Find a worker by its internal ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Worker>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workers WHERE id = $1");
        sqlx::query_as::<_, Worker>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all workers ordered by ID (including disabled).
    pub async fn list(pool: &PgPool) -> Result<Vec<Worker>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM workers ORDER BY id ASC");
        sqlx::query_as::<_, Worker>(&query).fetch_all(pool).await
    }

    /// Persist the runtime fields the registry maintains (status, queue
    /// length, job counter, last health check).
    ///
    /// Returns `None` if no row with the worker's ID exists.
    pub async fn update_runtime(
        pool: &PgPool,
        worker: &Worker,
    ) -> Result<Option<Worker>, sqlx::Error> {
        let query = format!(
            "UPDATE workers SET \
                status = $2, \
                queue_length = $3, \
                current_jobs = $4, \
                last_health_check = $5, \
                updated_at = NOW() \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Worker>(&query)
            .bind(worker.id)
            .bind(&worker.status)
            .bind(worker.queue_length.max(0))
            .bind(worker.current_jobs.max(0))
            .bind(worker.last_health_check)
            .fetch_optional(pool)
            .await
    }
}
