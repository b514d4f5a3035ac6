//! Domain logic for the datalabel task orchestration engine.
//!
//! Pure functions, constants, and value types shared by the persistence
//! layer, the ComfyUI client, and the orchestrator. This crate has no
//! internal dependencies and performs no I/O.

pub mod annotation;
pub mod error;
pub mod preference_export;
pub mod seeds;
pub mod task_status;
pub mod template;
pub mod types;
pub mod variable_pool;
pub mod versioning;
pub mod worker_selection;
pub mod workflow_graph;
