//! Generation task entity model and DTOs.

use datalabel_core::template::InputMapping;
use datalabel_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;

/// A task row from the `tasks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Task {
    pub id: DbId,
    pub workflow_id: DbId,
    pub variable_pool_id: DbId,
    pub prompt_template: Option<String>,
    pub variable_input_mappings: Json<Vec<InputMapping>>,
    pub batch_size: i32,
    pub seeds_per_prompt: i32,
    pub target_prompts: i32,
    pub client_id: Option<String>,
    /// Forwarded verbatim to the worker with every submission.
    pub extra_data: serde_json::Value,
    /// `draft`, `pilot_passed`, `frozen` or `completed`.
    pub status: String,
    /// The workflow as it existed when the pilot passed.
    pub workflow_snapshot: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a task.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTask {
    pub workflow_id: DbId,
    pub variable_pool_id: DbId,
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub variable_input_mappings: Vec<InputMapping>,
    pub batch_size: i32,
    pub seeds_per_prompt: i32,
    pub target_prompts: i32,
    pub client_id: Option<String>,
    pub extra_data: Option<serde_json::Value>,
}
