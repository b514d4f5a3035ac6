//! HTTP client library for ComfyUI rendering workers.
//!
//! Provides typed request/response messages for the worker endpoints, a
//! shared [`reqwest`] client with per-worker authentication, and the
//! [`backend::ComfyUIBackend`] trait the orchestrator talks through.

pub mod api;
pub mod backend;
pub mod messages;
