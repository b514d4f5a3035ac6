//! Rendered prompt entity model and DTOs.

use datalabel_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A prompt row from the `task_prompts` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct TaskPrompt {
    pub id: DbId,
    pub task_id: DbId,
    pub prompt: String,
    /// Primary seed (first of `seeds`).
    pub seed: i64,
    pub seeds: Vec<i64>,
    /// `pilot` or `mass`.
    pub mode: String,
    /// Batch size of the last submission.
    pub batch_size: i32,
    /// Node ID -> `{input_name: value}` overrides.
    pub applied_inputs: serde_json::Value,
    pub worker_endpoint: Option<String>,
    pub client_id: Option<String>,
    /// ID assigned by the worker on submission.
    pub prompt_id: Option<String>,
    pub status: String,
    pub queued_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub failed_at: Option<Timestamp>,
    /// `outputs`, `images` and `error` captured from history.
    pub node_outputs: serde_json::Value,
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a prompt under a task.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskPrompt {
    pub prompt: String,
    pub seeds: Vec<i64>,
    pub mode: String,
    pub batch_size: i32,
    pub applied_inputs: serde_json::Value,
    pub client_id: Option<String>,
}

impl CreateTaskPrompt {
    /// First seed, or 0 when no seeds were generated.
    pub fn primary_seed(&self) -> i64 {
        self.seeds.first().copied().unwrap_or_default()
    }
}
