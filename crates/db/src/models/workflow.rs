//! Workflow entity model and DTOs.

use datalabel_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A ComfyUI workflow row from the `workflows` table.
///
/// Deserialisable so a copy can be restored from a task's workflow
/// snapshot.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Workflow {
    pub id: DbId,
    pub name: String,
    /// API-format node graph (keyed by node ID, or wrapped in `nodes`).
    pub workflow_api: serde_json::Value,
    pub max_batch_size: i32,
    /// Node IDs whose `text` input receives the rendered prompt.
    pub prompt_nodes: Vec<String>,
    /// Node IDs whose `seed` input receives the prompt seeds.
    pub seed_nodes: Vec<String>,
    pub allow_controlnet: bool,
    pub allow_dynamic_resolution: bool,
    pub created_at: Timestamp,
}

/// DTO for creating a workflow.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorkflow {
    pub name: String,
    pub workflow_api: serde_json::Value,
    /// Defaults to 4.
    pub max_batch_size: Option<i32>,
    #[serde(default)]
    pub prompt_nodes: Vec<String>,
    #[serde(default)]
    pub seed_nodes: Vec<String>,
    #[serde(default)]
    pub allow_controlnet: bool,
    #[serde(default)]
    pub allow_dynamic_resolution: bool,
}
