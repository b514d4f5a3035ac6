use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// The task definition cannot produce prompts (no template or mapping,
    /// unusable workflow metadata).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The variable pool is too small for the requested prompt count.
    #[error("Variable pool yields {available} combinations but {requested} were requested")]
    Capacity { requested: usize, available: usize },

    #[error("Template error: {0}")]
    Template(String),

    #[error("Cannot {action} a task in status '{status}'")]
    InvalidState {
        action: &'static str,
        status: String,
    },

    #[error("Batch size {requested} exceeds workflow limit of {max}")]
    BatchLimit { requested: i32, max: i32 },
}
