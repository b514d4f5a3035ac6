//! Workflow graph manipulation.
//!
//! Graphs are ComfyUI API-format JSON: an object keyed by node ID whose
//! values carry `class_type` and `inputs`. All mutation helpers skip node
//! IDs that are not present in the graph.

use serde_json::{Map, Value};

use crate::error::CoreError;

/// Node class that accepts the whole seed list of a batch.
pub const BATCH_SEED_NODE_TYPE: &str = "LatentBatchSeedBehavior";

/// Class-name fragments of nodes that must not run on shared workers.
pub const FORBIDDEN_NODE_TYPES: &[&str] = &["ComfyUI-Manager", "ComfyUI-Custom-Scripts"];

/// Graph keyed by node ID.
pub type NodeGraph = Map<String, Value>;

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

/// Convert a stored workflow definition into the keyed form.
///
/// Accepts a `{"nodes": [...]}` list (keyed by each node's `id`), a
/// `{"nodes": {...}}` map, or an already keyed graph. Entries that are not
/// JSON objects are dropped.
pub fn normalize_graph(workflow_api: &Value) -> NodeGraph {
    let Some(root) = workflow_api.as_object() else {
        return NodeGraph::new();
    };

    match root.get("nodes") {
        Some(Value::Array(nodes)) => nodes
            .iter()
            .filter(|node| node.is_object())
            .map(|node| (node_key(node.get("id")), node.clone()))
            .collect(),
        Some(Value::Object(nodes)) => objects_only(nodes),
        _ => objects_only(root),
    }
}

fn objects_only(nodes: &Map<String, Value>) -> NodeGraph {
    nodes
        .iter()
        .filter(|(_, node)| node.is_object())
        .map(|(id, node)| (id.clone(), node.clone()))
        .collect()
}

fn node_key(id: Option<&Value>) -> String {
    match id {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "None".to_string(),
        Some(other) => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

/// Prompt and seed nodes found in an uploaded graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphInspection {
    /// Nodes whose class mentions `CLIPTextEncode`.
    pub prompt_nodes: Vec<String>,
    /// Nodes whose class mentions `KSampler` or `Seed`.
    pub seed_nodes: Vec<String>,
}

/// Reject forbidden node classes and detect prompt and seed nodes.
///
/// Nodes without a `class_type` are ignored. Fails with
/// [`CoreError::Validation`] listing every forbidden node.
pub fn inspect_graph(graph: &NodeGraph) -> Result<GraphInspection, CoreError> {
    let mut forbidden = Vec::new();
    let mut inspection = GraphInspection::default();
    for (node_id, node) in graph {
        let Some(class) = node.get("class_type").and_then(Value::as_str) else {
            continue;
        };
        if FORBIDDEN_NODE_TYPES.iter().any(|f| class.contains(f)) {
            forbidden.push(format!("Node {node_id} ({class})"));
        }
        if class.contains("CLIPTextEncode") {
            inspection.prompt_nodes.push(node_id.clone());
        }
        if class.contains("KSampler") || class.contains("Seed") {
            inspection.seed_nodes.push(node_id.clone());
        }
    }
    if !forbidden.is_empty() {
        return Err(CoreError::Validation(format!(
            "Forbidden nodes found: {}",
            forbidden.join(", ")
        )));
    }
    Ok(inspection)
}

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

/// Mutable access to a node's `inputs`, creating the object when absent.
fn inputs_mut<'a>(graph: &'a mut NodeGraph, node_id: &str) -> Option<&'a mut Map<String, Value>> {
    let node = graph.get_mut(node_id)?.as_object_mut()?;
    let inputs = node
        .entry("inputs")
        .or_insert_with(|| Value::Object(Map::new()));
    if !inputs.is_object() {
        *inputs = Value::Object(Map::new());
    }
    inputs.as_object_mut()
}

fn class_type(node: &Value) -> &str {
    node.get("class_type").and_then(Value::as_str).unwrap_or_default()
}

/// Write `text` into the `text` input of every prompt node.
pub fn apply_prompt_text(graph: &mut NodeGraph, prompt_nodes: &[String], text: &str) {
    for node_id in prompt_nodes {
        if let Some(inputs) = inputs_mut(graph, node_id) {
            inputs.insert("text".to_string(), Value::String(text.to_string()));
        }
    }
}

/// Merge per-node input overrides (`{node_id: {input: value}}`).
pub fn apply_overrides(graph: &mut NodeGraph, overrides: &Map<String, Value>) {
    for (node_id, values) in overrides {
        let Some(values) = values.as_object() else {
            continue;
        };
        if let Some(inputs) = inputs_mut(graph, node_id) {
            for (name, value) in values {
                inputs.insert(name.clone(), value.clone());
            }
        }
    }
}

/// Apply seeds to every seed node.
///
/// Batch seed nodes receive the full list; all other nodes receive the
/// primary (first) seed in `seed`, and in `noise_seed` when that input
/// already exists. Does nothing when `seeds` is empty.
pub fn apply_seeds(graph: &mut NodeGraph, seed_nodes: &[String], seeds: &[i64]) {
    let Some(&primary) = seeds.first() else {
        return;
    };
    for node_id in seed_nodes {
        let is_batch_node = graph
            .get(node_id)
            .is_some_and(|node| class_type(node) == BATCH_SEED_NODE_TYPE);
        let Some(inputs) = inputs_mut(graph, node_id) else {
            continue;
        };
        if is_batch_node {
            inputs.insert("seed".to_string(), Value::from(seeds.to_vec()));
        } else {
            inputs.insert("seed".to_string(), Value::from(primary));
            if inputs.contains_key("noise_seed") {
                inputs.insert("noise_seed".to_string(), Value::from(primary));
            }
        }
    }
}

/// Overwrite every existing `batch_size` input in the graph.
pub fn apply_batch_size(graph: &mut NodeGraph, batch_size: i32) {
    for node in graph.values_mut() {
        if let Some(inputs) = node.get_mut("inputs").and_then(Value::as_object_mut) {
            if inputs.contains_key("batch_size") {
                inputs.insert("batch_size".to_string(), Value::from(batch_size));
            }
        }
    }
}

/// Downscale numeric `width`/`height` inputs by `scale` (floored, at least
/// 1). Scales of 1.0 or more leave the graph untouched.
pub fn scale_resolution(graph: &mut NodeGraph, scale: f64) {
    if scale >= 1.0 {
        return;
    }
    for node in graph.values_mut() {
        let Some(inputs) = node.get_mut("inputs").and_then(Value::as_object_mut) else {
            continue;
        };
        for key in ["width", "height"] {
            if let Some(current) = inputs.get(key).and_then(Value::as_f64) {
                let scaled = ((current * scale).floor() as i64).max(1);
                inputs.insert(key.to_string(), Value::from(scaled));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Cost scoring
// ---------------------------------------------------------------------------

/// Largest `width * height` declared by any node, 0 when none declares both.
pub fn max_resolution(graph: &NodeGraph) -> u64 {
    graph
        .values()
        .filter_map(|node| {
            let inputs = node.get("inputs")?;
            let width = inputs.get("width")?.as_f64()?;
            let height = inputs.get("height")?.as_f64()?;
            Some((width.max(0.0) * height.max(0.0)) as u64)
        })
        .max()
        .unwrap_or(0)
}

/// Number of nodes whose `class_type` mentions ControlNet.
pub fn controlnet_node_count(graph: &NodeGraph) -> usize {
    graph
        .values()
        .filter(|node| class_type(node).to_ascii_lowercase().contains("controlnet"))
        .count()
}

/// Relative rendering cost of a graph, used to pick worst-case pilot
/// prompts.
pub fn prompt_cost(graph: &NodeGraph) -> u64 {
    let controlnets = controlnet_node_count(graph).max(1) as u64;
    max_resolution(graph).saturating_mul(controlnets)
}

// ---------------------------------------------------------------------------
// OOM retry ladder
// ---------------------------------------------------------------------------

/// One submission attempt's resolution scale and batch size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LadderStep {
    pub scale: f64,
    pub batch_size: i32,
}

/// Attempts made after out-of-memory failures, in order.
pub fn oom_ladder(requested_batch: i32) -> [LadderStep; 3] {
    [
        LadderStep {
            scale: 1.0,
            batch_size: requested_batch,
        },
        LadderStep {
            scale: 0.75,
            batch_size: requested_batch,
        },
        LadderStep {
            scale: 0.5,
            batch_size: (requested_batch / 2).max(1),
        },
    ]
}
