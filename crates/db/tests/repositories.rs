//! Repository integration tests.
//!
//! These need a live PostgreSQL reachable through `DATABASE_URL` and are
//! ignored by default: `cargo test -p datalabel-db -- --ignored`.

use datalabel_core::template::InputMapping;
use datalabel_core::variable_pool::VariableSlot;
use datalabel_db::models::annotation::CreateAnnotation;
use datalabel_db::models::task::CreateTask;
use datalabel_db::models::task_prompt::CreateTaskPrompt;
use datalabel_db::models::variable_pool::CreateVariablePool;
use datalabel_db::models::worker::CreateWorker;
use datalabel_db::models::workflow::CreateWorkflow;
use datalabel_db::repositories::{
    AnnotationRepo, TaskPromptRepo, TaskRepo, VariablePoolRepo, WorkerRepo, WorkflowRepo,
};
use serde_json::json;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn seed_task_parents(pool: &PgPool) -> (i64, i64) {
    let workflow = WorkflowRepo::create(
        pool,
        &CreateWorkflow {
            name: "txt2img".to_string(),
            workflow_api: json!({"6": {"class_type": "CLIPTextEncode", "inputs": {"text": ""}}}),
            max_batch_size: None,
            prompt_nodes: vec!["6".to_string()],
            seed_nodes: vec![],
            allow_controlnet: false,
            allow_dynamic_resolution: false,
        },
    )
    .await
    .unwrap();
    let variable_pool = VariablePoolRepo::create(
        pool,
        &CreateVariablePool {
            name: "styles".to_string(),
            version: "v1".to_string(),
            sampling_mode: None,
            variables: vec![VariableSlot::new("style", &["photo", "anime"])],
        },
    )
    .await
    .unwrap();
    (workflow.id, variable_pool.id)
}

fn new_task(workflow_id: i64, variable_pool_id: i64) -> CreateTask {
    CreateTask {
        workflow_id,
        variable_pool_id,
        prompt_template: Some("a {style} cat".to_string()),
        variable_input_mappings: vec![InputMapping {
            variable: "style".to_string(),
            node_id: "6".to_string(),
            input_name: "style".to_string(),
        }],
        batch_size: 2,
        seeds_per_prompt: 2,
        target_prompts: 2,
        client_id: None,
        extra_data: None,
    }
}

fn new_prompt(text: &str) -> CreateTaskPrompt {
    CreateTaskPrompt {
        prompt: text.to_string(),
        seeds: vec![11, 22],
        mode: "mass".to_string(),
        batch_size: 2,
        applied_inputs: json!({}),
        client_id: None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_worker_defaults_and_runtime_update(pool: PgPool) {
    let mut worker = WorkerRepo::create(
        &pool,
        &CreateWorker {
            name: "gpu-1".to_string(),
            base_url: "http://gpu-1:8188".to_string(),
            api_key: None,
            enabled: None,
            priority: None,
            max_concurrent_jobs: None,
            tags: None,
        },
    )
    .await
    .unwrap();
    assert_eq!(worker.status, "UNKNOWN");
    assert!(worker.enabled);
    assert_eq!(worker.max_concurrent_jobs, 1);
    assert!(worker.tags.is_empty());

    worker.status = "HEALTHY".to_string();
    worker.queue_length = 3;
    worker.current_jobs = 1;
    let updated = WorkerRepo::update_runtime(&pool, &worker)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, "HEALTHY");
    assert_eq!(updated.queue_length, 3);
    assert_eq!(updated.current_jobs, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_variable_slots_keep_declaration_order(pool: PgPool) {
    let created = VariablePoolRepo::create(
        &pool,
        &CreateVariablePool {
            name: "ordered".to_string(),
            version: "1".to_string(),
            sampling_mode: Some("no_replacement".to_string()),
            variables: vec![
                VariableSlot::new("zeta", &["z"]),
                VariableSlot::new("alpha", &["a"]),
            ],
        },
    )
    .await
    .unwrap();
    let found = VariablePoolRepo::find_by_id(&pool, created.id)
        .await
        .unwrap()
        .unwrap();
    let names: Vec<&str> = found.variables.0.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["zeta", "alpha"]);
    assert_eq!(found.key(), "ordered:1");
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_task_created_with_prompts_atomically(pool: PgPool) {
    let (workflow_id, pool_id) = seed_task_parents(&pool).await;
    let (task, prompts) = TaskRepo::create_with_prompts(
        &pool,
        &new_task(workflow_id, pool_id),
        &[new_prompt("a photo cat"), new_prompt("a anime cat")],
    )
    .await
    .unwrap();

    assert_eq!(task.status, "draft");
    assert_eq!(task.extra_data, json!({}));
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts[0].seed, 11);
    assert_eq!(prompts[0].status, "draft");

    let listed = TaskPromptRepo::list_by_task(&pool, task.id).await.unwrap();
    assert_eq!(listed, prompts);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_failed_prompt_insert_rolls_back_task(pool: PgPool) {
    let (workflow_id, pool_id) = seed_task_parents(&pool).await;
    let mut bad = new_prompt("bad");
    bad.mode = "neither".to_string();

    let result =
        TaskRepo::create_with_prompts(&pool, &new_task(workflow_id, pool_id), &[new_prompt("ok"), bad])
            .await;
    assert!(result.is_err());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_snapshot_kept_when_not_replaced(pool: PgPool) {
    let (workflow_id, pool_id) = seed_task_parents(&pool).await;
    let (task, _) = TaskRepo::create_with_prompts(&pool, &new_task(workflow_id, pool_id), &[])
        .await
        .unwrap();

    let snapshot = json!({"name": "txt2img"});
    TaskRepo::update_state(&pool, task.id, "draft", "pilot_passed", Some(&snapshot))
        .await
        .unwrap();
    let frozen = TaskRepo::update_state(&pool, task.id, "pilot_passed", "frozen", None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frozen.status, "frozen");
    assert_eq!(frozen.workflow_snapshot, Some(snapshot));

    let stale = TaskRepo::update_state(&pool, task.id, "pilot_passed", "frozen", None)
        .await
        .unwrap();
    assert!(stale.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_tracking_update_and_annotation(pool: PgPool) {
    let (workflow_id, pool_id) = seed_task_parents(&pool).await;
    let (_, prompts) =
        TaskRepo::create_with_prompts(&pool, &new_task(workflow_id, pool_id), &[new_prompt("p")])
            .await
            .unwrap();

    let mut prompt = prompts[0].clone();
    prompt.prompt_id = Some("remote-1".to_string());
    prompt.status = "completed".to_string();
    prompt.node_outputs = json!({"images": ["a.png"]});
    let saved = TaskPromptRepo::update_tracking(&pool, &prompt)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(saved.prompt_id.as_deref(), Some("remote-1"));
    assert_eq!(saved.node_outputs["images"][0], "a.png");

    let annotation = AnnotationRepo::create(
        &pool,
        saved.id,
        &CreateAnnotation {
            chosen_index: Some(0),
            rejected_index: Some(1),
            spam: false,
            comment: None,
        },
    )
    .await
    .unwrap();
    let listed = AnnotationRepo::list_by_prompt(&pool, saved.id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, annotation.id);

    let by_task = AnnotationRepo::list_by_task(&pool, saved.task_id).await.unwrap();
    assert_eq!(by_task.len(), 1);
    assert_eq!(by_task[0].id, annotation.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_prompt_claim_only_moves_expected_status(pool: PgPool) {
    let (workflow_id, pool_id) = seed_task_parents(&pool).await;
    let (_, prompts) =
        TaskRepo::create_with_prompts(&pool, &new_task(workflow_id, pool_id), &[new_prompt("p")])
            .await
            .unwrap();
    let id = prompts[0].id;

    let claimed = TaskPromptRepo::transition_status(&pool, id, "draft", "submitting")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.status, "submitting");

    let second = TaskPromptRepo::transition_status(&pool, id, "draft", "submitting")
        .await
        .unwrap();
    assert!(second.is_none());
}
