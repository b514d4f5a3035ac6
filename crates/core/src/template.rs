//! Prompt template rendering.
//!
//! A task binds each pool combination either into free text (`{slot}`
//! placeholders) or into per-node workflow input overrides, or both.

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::variable_pool::Combination;

/// Regex matching `{placeholder}` tokens in prompt templates.
static PLACEHOLDER_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\{(\w+)\}").expect("valid regex"));

/// Binds a pool variable to one input of one workflow node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMapping {
    pub variable: String,
    pub node_id: String,
    pub input_name: String,
}

/// Output of rendering one combination.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedPrompt {
    pub text: String,
    /// Node ID -> `{input_name: value}` overrides.
    pub applied_inputs: Map<String, Value>,
}

/// Extract the placeholder names referenced by a template, in order of
/// first appearance.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let name = caps[1].to_string();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Substitute every `{slot}` in `template` with the combination's value.
///
/// Fails with [`CoreError::Template`] if a placeholder names a slot the
/// combination does not bind.
pub fn render_text(template: &str, combination: &Combination) -> Result<String, CoreError> {
    let missing: Vec<String> = placeholders(template)
        .into_iter()
        .filter(|name| combination.get(name).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(CoreError::Template(format!(
            "Template references unknown variables: {}",
            missing.join(", ")
        )));
    }

    let text = PLACEHOLDER_RE
        .replace_all(template, |caps: &regex::Captures| {
            combination.get(&caps[1]).unwrap_or_default().to_string()
        })
        .to_string();
    Ok(text)
}

/// Build per-node input overrides for one combination.
///
/// Mappings whose variable is not bound, or whose node/input name is empty,
/// are skipped.
pub fn render_node_inputs(mappings: &[InputMapping], combination: &Combination) -> Map<String, Value> {
    let mut overrides = Map::new();
    for mapping in mappings {
        let Some(value) = combination.get(&mapping.variable) else {
            continue;
        };
        if mapping.node_id.is_empty() || mapping.input_name.is_empty() {
            continue;
        }
        let node_inputs = overrides
            .entry(mapping.node_id.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(inputs) = node_inputs {
            inputs.insert(mapping.input_name.clone(), Value::String(value.to_string()));
        }
    }
    overrides
}

/// The rendering strategies chosen by a task.
#[derive(Debug, Clone, Copy)]
pub struct PromptRenderer<'a> {
    template: Option<&'a str>,
    mappings: &'a [InputMapping],
}

impl<'a> PromptRenderer<'a> {
    /// Fails with [`CoreError::Configuration`] when neither a template nor
    /// any node mapping is supplied.
    pub fn new(template: Option<&'a str>, mappings: &'a [InputMapping]) -> Result<Self, CoreError> {
        let template = template.filter(|t| !t.trim().is_empty());
        if template.is_none() && mappings.is_empty() {
            return Err(CoreError::Configuration(
                "Provide a prompt_template or variable_input_mappings to generate prompts from pools"
                    .to_string(),
            ));
        }
        Ok(Self { template, mappings })
    }

    pub fn render(&self, combination: &Combination) -> Result<RenderedPrompt, CoreError> {
        let applied_inputs = render_node_inputs(self.mappings, combination);
        let text = match self.template {
            Some(template) => render_text(template, combination)?,
            None if !applied_inputs.is_empty() => {
                format!("Node inputs: {}", Value::Object(applied_inputs.clone()))
            }
            None => String::new(),
        };
        Ok(RenderedPrompt {
            text,
            applied_inputs,
        })
    }
}
