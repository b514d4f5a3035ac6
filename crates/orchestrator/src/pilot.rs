//! Worst-case prompt sampling for pilot runs.

use datalabel_core::task_status::{MODE_MASS, MODE_PILOT, PROMPT_DRAFT};
use datalabel_core::workflow_graph::{apply_overrides, normalize_graph, prompt_cost};
use datalabel_db::models::task_prompt::{CreateTaskPrompt, TaskPrompt};
use datalabel_db::models::workflow::Workflow;

/// Rendering cost of `prompt` on `workflow`, overrides included.
pub fn score(workflow: &Workflow, prompt: &TaskPrompt) -> u64 {
    let mut graph = normalize_graph(&workflow.workflow_api);
    if let Some(overrides) = prompt.applied_inputs.as_object() {
        apply_overrides(&mut graph, overrides);
    }
    prompt_cost(&graph)
}

/// The `sample_size` most expensive draft mass prompts, costliest first.
/// Ties keep persisted order.
pub fn rank_candidates<'a>(
    workflow: &Workflow,
    prompts: &'a [TaskPrompt],
    sample_size: usize,
) -> Vec<&'a TaskPrompt> {
    let mut scored: Vec<(u64, &TaskPrompt)> = prompts
        .iter()
        .filter(|p| p.mode == MODE_MASS && p.status == PROMPT_DRAFT)
        .map(|p| (score(workflow, p), p))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(sample_size).map(|(_, p)| p).collect()
}

/// Pilot copy of a mass prompt: same text, seeds and overrides, batch 1.
pub fn pilot_clone(prompt: &TaskPrompt) -> CreateTaskPrompt {
    CreateTaskPrompt {
        prompt: prompt.prompt.clone(),
        seeds: prompt.seeds.clone(),
        mode: MODE_PILOT.to_string(),
        batch_size: 1,
        applied_inputs: prompt.applied_inputs.clone(),
        client_id: prompt.client_id.clone(),
    }
}
