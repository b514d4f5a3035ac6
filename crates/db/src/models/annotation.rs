//! Preference annotation entity model and DTOs.

use datalabel_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An annotation row from the `annotations` table. Never updated.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Annotation {
    pub id: DbId,
    pub task_prompt_id: DbId,
    pub chosen_index: Option<i32>,
    pub rejected_index: Option<i32>,
    pub spam: bool,
    pub comment: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for recording an annotation.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAnnotation {
    pub chosen_index: Option<i32>,
    pub rejected_index: Option<i32>,
    #[serde(default)]
    pub spam: bool,
    pub comment: Option<String>,
}
