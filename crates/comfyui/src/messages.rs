//! ComfyUI HTTP message types.
//!
//! Response shapes vary between ComfyUI builds and proxies (queue entries
//! as arrays or objects, history with or without a `history` wrapper,
//! status as a string or an object), so the looser payloads are parsed
//! from [`serde_json::Value`] rather than derived.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// GET /system_stats
// ---------------------------------------------------------------------------

/// Health and capability report from `GET /system_stats`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemStats {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    /// Stock ComfyUI reports its version under `system.comfyui_version`.
    #[serde(default)]
    pub system: Option<SystemInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemInfo {
    #[serde(default)]
    pub comfyui_version: Option<String>,
}

impl SystemStats {
    /// Reported version, `"0.0.0"` when absent.
    pub fn version(&self) -> &str {
        self.version
            .as_deref()
            .or_else(|| self.system.as_ref()?.comfyui_version.as_deref())
            .unwrap_or("0.0.0")
    }

    /// Required features missing from the report, in the order given.
    pub fn missing_features<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|feature| !self.features.contains(*feature))
            .map(String::as_str)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// GET /queue
// ---------------------------------------------------------------------------

/// Pending and running jobs from `GET /queue`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub queue_pending: Vec<Value>,
    #[serde(default)]
    pub queue_running: Vec<Value>,
}

/// Prompt ID of a queue entry: an object with `prompt_id`, or a ComfyUI
/// array `[number, prompt_id, graph, ...]`.
fn entry_prompt_id(entry: &Value) -> Option<&str> {
    match entry {
        Value::Object(map) => map.get("prompt_id").and_then(Value::as_str),
        Value::Array(items) => items.get(1).and_then(Value::as_str),
        _ => None,
    }
}

impl QueueSnapshot {
    /// Pending plus running.
    pub fn total(&self) -> usize {
        self.queue_pending.len() + self.queue_running.len()
    }

    pub fn is_running(&self, prompt_id: &str) -> bool {
        self.queue_running
            .iter()
            .any(|entry| entry_prompt_id(entry) == Some(prompt_id))
    }

    pub fn is_pending(&self, prompt_id: &str) -> bool {
        self.queue_pending
            .iter()
            .any(|entry| entry_prompt_id(entry) == Some(prompt_id))
    }
}

// ---------------------------------------------------------------------------
// POST /prompt
// ---------------------------------------------------------------------------

/// Body of `POST /prompt`.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitRequest {
    /// Node graph keyed by node ID.
    pub prompt: Value,
    pub client_id: String,
    /// Same graph, for servers that read the legacy field.
    pub workflow_api: Value,
    pub extra_data: Value,
    pub batch_size: i32,
    pub seed: i64,
    pub seed_list: Vec<i64>,
}

/// Response returned by `POST /prompt`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    /// Position in the execution queue (stock ComfyUI only).
    #[serde(default)]
    pub number: Option<i64>,
}

// ---------------------------------------------------------------------------
// GET /history/{id}
// ---------------------------------------------------------------------------

/// Outcome of one prompt as reported by `GET /history/{id}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryEntry {
    pub status: Option<String>,
    pub outputs: Option<Value>,
    pub images: Option<Value>,
    pub error: Option<String>,
    /// Epoch seconds.
    pub created_at: Option<f64>,
    pub started_at: Option<f64>,
    pub completed_at: Option<f64>,
}

impl HistoryEntry {
    /// Extract the entry for `id` from a history response body.
    ///
    /// Returns `None` when the body has no (or an empty) entry for `id`.
    pub fn from_response(body: &Value, id: &str) -> Option<Self> {
        let root = match body.get("history") {
            Some(history @ Value::Object(_)) => history,
            _ => body,
        };
        let entry = root.get(id)?.as_object()?;
        if entry.is_empty() {
            return None;
        }

        Some(Self {
            status: entry.get("status").and_then(parse_status),
            outputs: entry.get("outputs").cloned(),
            images: entry.get("images").cloned(),
            error: entry.get("error").and_then(parse_error),
            created_at: epoch(entry, &["created_at"]),
            started_at: epoch(entry, &["started_at", "started"]),
            completed_at: epoch(entry, &["completed_at", "completed"]),
        })
    }
}

/// Status as a plain string, or a ComfyUI `{status_str, completed}` object.
fn parse_status(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => {
            match map.get("status_str").and_then(Value::as_str) {
                Some(s @ ("success" | "error")) => Some(s.to_string()),
                _ if map.get("completed").and_then(Value::as_bool) == Some(true) => {
                    Some("completed".to_string())
                }
                Some(s) if !s.is_empty() => Some(s.to_string()),
                _ => None,
            }
        }
        _ => None,
    }
}

fn parse_error(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// First numeric value among `keys`.
fn epoch(entry: &serde_json::Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| entry.get(*key).and_then(Value::as_f64))
        .filter(|secs| *secs > 0.0)
}
