//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row and a `Deserialize` create DTO for inserts.

pub mod annotation;
pub mod task;
pub mod task_prompt;
pub mod variable_pool;
pub mod worker;
pub mod workflow;
