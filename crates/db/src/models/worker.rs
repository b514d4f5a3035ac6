//! Rendering worker entity model and DTOs.

use datalabel_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A ComfyUI worker row from the `workers` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Worker {
    pub id: DbId,
    pub name: String,
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub enabled: bool,
    /// `HEALTHY`, `UNHEALTHY` or `UNKNOWN`.
    pub status: String,
    /// Higher is preferred.
    pub priority: i32,
    pub max_concurrent_jobs: i32,
    /// Pending + running jobs as last observed on the worker.
    pub queue_length: i32,
    /// Jobs this process has dispatched and not yet released.
    pub current_jobs: i32,
    pub tags: Vec<String>,
    pub last_health_check: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering a worker.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWorker {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    /// Defaults to `true`.
    pub enabled: Option<bool>,
    /// Defaults to 0.
    pub priority: Option<i32>,
    /// Defaults to 1.
    pub max_concurrent_jobs: Option<i32>,
    pub tags: Option<Vec<String>>,
}
