//! Variable pool entity model and DTOs.

use datalabel_core::types::{DbId, Timestamp};
use datalabel_core::variable_pool::VariableSlot;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// A variable pool row from the `variable_pools` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VariablePool {
    pub id: DbId,
    pub name: String,
    pub version: String,
    /// `permutation` or `no_replacement`.
    pub sampling_mode: String,
    /// Slots in declaration order.
    pub variables: Json<Vec<VariableSlot>>,
    pub created_at: Timestamp,
}

impl VariablePool {
    /// `"{name}:{version}"`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }
}

/// DTO for creating a variable pool.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateVariablePool {
    pub name: String,
    pub version: String,
    /// Defaults to `permutation`.
    pub sampling_mode: Option<String>,
    pub variables: Vec<VariableSlot>,
}
