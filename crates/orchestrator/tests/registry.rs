//! Worker registration, health checks and selection.

mod common;

use assert_matches::assert_matches;
use common::{base_url, new_worker, Harness};
use datalabel_core::error::CoreError;
use datalabel_orchestrator::error::OrchestratorError;
use datalabel_orchestrator::store::Store;

#[tokio::test]
async fn registered_worker_becomes_healthy_after_check() {
    let h = Harness::new();
    h.backend.set_queue(&base_url("gpu-a"), &[2]);

    let worker = h.worker("gpu-a", 0, 4).await;

    assert_eq!(worker.status, "HEALTHY");
    assert_eq!(worker.queue_length, 2);
    assert!(worker.last_health_check.is_some());
}

#[tokio::test]
async fn registration_without_check_stays_unknown() {
    let h = Harness::new();
    let worker = h
        .orchestrator
        .register_worker(&new_worker("gpu-a", 0, 1), false)
        .await
        .unwrap();
    assert_eq!(worker.status, "UNKNOWN");
    assert!(h.orchestrator.registry().select(None).await.unwrap().is_none());
}

#[tokio::test]
async fn registration_rejects_zero_capacity() {
    let h = Harness::new();
    let result = h
        .orchestrator
        .register_worker(&new_worker("gpu-a", 0, 0), false)
        .await;
    assert_matches!(result, Err(OrchestratorError::Core(CoreError::Validation(_))));
}

#[tokio::test]
async fn outdated_or_incomplete_workers_are_unhealthy() {
    let h = Harness::new();
    let worker = h.worker("gpu-a", 0, 1).await;
    let registry = h.orchestrator.registry();

    let old = registry
        .check_health_with(&worker, Some("1.6.0"), &[])
        .await
        .unwrap();
    assert_eq!(old.status, "UNHEALTHY");

    let missing = registry
        .check_health_with(&worker, Some("1.5"), &["flux".to_string()])
        .await
        .unwrap();
    assert_eq!(missing.status, "UNHEALTHY");

    let ok = registry
        .check_health_with(&worker, Some("1.5"), &["sdxl".to_string()])
        .await
        .unwrap();
    assert_eq!(ok.status, "HEALTHY");
}

#[tokio::test]
async fn unreachable_worker_is_unhealthy_with_empty_queue() {
    let h = Harness::new();
    h.backend.set_queue(&base_url("gpu-a"), &[3]);
    let worker = h.worker("gpu-a", 0, 4).await;
    assert_eq!(worker.queue_length, 3);

    h.backend.script(&base_url("gpu-a"), |s| s.reachable = false);
    let checked = h.orchestrator.registry().check_health(&worker).await.unwrap();

    assert_eq!(checked.status, "UNHEALTHY");
    assert_eq!(checked.queue_length, 0);
}

#[tokio::test]
async fn periodic_check_skips_disabled_workers() {
    let h = Harness::new();
    h.worker("gpu-a", 0, 1).await;
    let mut disabled = new_worker("gpu-b", 0, 1);
    disabled.enabled = Some(false);
    h.orchestrator.register_worker(&disabled, false).await.unwrap();
    h.backend.script(&base_url("gpu-c"), |s| s.reachable = false);
    h.worker("gpu-c", 0, 1).await;

    let healthy = h.orchestrator.registry().periodic_health_check().await.unwrap();

    assert_eq!(healthy, 1);
    let workers = h.store.list_workers().await.unwrap();
    let gpu_b = workers.iter().find(|w| w.name == "gpu-b").unwrap();
    assert_eq!(gpu_b.status, "UNKNOWN");
}

#[tokio::test]
async fn periodic_check_continues_past_deleted_worker() {
    let h = Harness::new();
    let doomed = h.worker("gpu-a", 0, 1).await;
    h.worker("gpu-b", 0, 1).await;
    let store = h.store.clone();
    h.backend.script(&base_url("gpu-a"), move |s| {
        s.on_system_stats = Some(Box::new(move || store.remove_worker(doomed.id)));
    });

    let healthy = h.orchestrator.registry().periodic_health_check().await.unwrap();

    assert_eq!(healthy, 1);
    let workers = h.store.list_workers().await.unwrap();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].name, "gpu-b");
    assert!(workers[0].last_health_check.is_some());
}

#[tokio::test]
async fn selection_prefers_priority_then_queue_then_name() {
    let h = Harness::new();
    h.backend.set_queue(&base_url("busy-high"), &[1]);
    h.worker("zeta", 1, 4).await;
    h.worker("alpha", 1, 4).await;
    h.worker("busy-high", 5, 4).await;
    let registry = h.orchestrator.registry();

    let first = registry.select(None).await.unwrap().unwrap();
    assert_eq!(first.name, "busy-high");

    h.backend.set_queue(&base_url("busy-high"), &[4]);
    let second = registry.select(None).await.unwrap().unwrap();
    assert_eq!(second.name, "alpha");
}

#[tokio::test]
async fn candidate_list_restricts_selection() {
    let h = Harness::new();
    h.worker("gpu-a", 9, 1).await;
    let b = h.worker("gpu-b", 0, 1).await;

    let picked = h
        .orchestrator
        .registry()
        .select(Some(&[b.id]))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(picked.id, b.id);
}

#[tokio::test]
async fn full_worker_is_not_selected_until_queue_drains() {
    let h = Harness::new();
    h.worker("gpu-a", 0, 1).await;
    let registry = h.orchestrator.registry();

    h.backend.set_queue(&base_url("gpu-a"), &[1]);
    assert!(registry.select(None).await.unwrap().is_none());

    h.backend.set_queue(&base_url("gpu-a"), &[0]);
    let picked = registry.select(None).await.unwrap().unwrap();
    assert_eq!(picked.queue_length, 0);
}

#[tokio::test]
async fn failed_queue_read_falls_back_to_job_counter() {
    let h = Harness::new();
    let worker = h.worker("gpu-a", 0, 1).await;
    let registry = h.orchestrator.registry();
    h.backend.script(&base_url("gpu-a"), |s| s.reachable = false);

    assert!(registry.select(None).await.unwrap().is_some());

    registry.record_job(worker.id).await.unwrap();
    assert!(registry.select(None).await.unwrap().is_none());
}

#[tokio::test]
async fn job_counter_never_goes_negative() {
    let h = Harness::new();
    let worker = h.worker("gpu-a", 0, 1).await;
    let registry = h.orchestrator.registry();

    registry.record_job(worker.id).await.unwrap();
    registry.complete_job(worker.id).await.unwrap();
    let released = registry.complete_job(worker.id).await.unwrap();

    assert_eq!(released.current_jobs, 0);
}
