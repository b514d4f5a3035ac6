//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod annotation_repo;
pub mod task_prompt_repo;
pub mod task_repo;
pub mod variable_pool_repo;
pub mod worker_repo;
pub mod workflow_repo;

pub use annotation_repo::AnnotationRepo;
pub use task_prompt_repo::TaskPromptRepo;
pub use task_repo::TaskRepo;
pub use variable_pool_repo::VariablePoolRepo;
pub use worker_repo::WorkerRepo;
pub use workflow_repo::WorkflowRepo;
