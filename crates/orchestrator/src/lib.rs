//! Task orchestration engine.
//!
//! Drives generation tasks through `draft -> pilot_passed -> frozen ->
//! completed`, picking workers through the [`registry::WorkerRegistry`]
//! and getting prompts onto them with the [`submission::JobSubmitter`].
//! All persistence goes through the [`store::Store`] seam and all worker
//! I/O through [`datalabel_comfyui::backend::ComfyUIBackend`].

pub mod background;
pub mod config;
pub mod error;
pub mod health_monitor;
pub mod orchestrator;
pub mod pilot;
pub mod registry;
pub mod store;
pub mod submission;
pub mod tracking;
