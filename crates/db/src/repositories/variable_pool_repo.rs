//! Repository for the `variable_pools` table.

use datalabel_core::types::DbId;
use datalabel_core::variable_pool::MODE_PERMUTATION;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::variable_pool::{CreateVariablePool, VariablePool};

const COLUMNS: &str = "id, name, version, sampling_mode, variables, created_at";

/// Provides CRUD operations for variable pools.
pub struct VariablePoolRepo;

impl VariablePoolRepo {
    /// Insert a new pool, returning the created row.
    pub async fn create(
        pool: &PgPool,
        input: &CreateVariablePool,
    ) -> Result<VariablePool, sqlx::Error> {
        let query = format!(
            "INSERT INTO variable_pools (name, version, sampling_mode, variables) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, VariablePool>(&query)
            .bind(&input.name)
            .bind(&input.version)
            .bind(input.sampling_mode.as_deref().unwrap_or(MODE_PERMUTATION))
            .bind(Json(&input.variables))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<VariablePool>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM variable_pools WHERE id = $1");
        sqlx::query_as::<_, VariablePool>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
