//! Background generation queue and health monitor.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use common::{base_url, new_worker, Harness};
use datalabel_core::error::CoreError;
use datalabel_orchestrator::background::{GenerationEvent, GenerationQueue};
use datalabel_orchestrator::error::OrchestratorError;
use datalabel_orchestrator::health_monitor::HealthMonitor;
use datalabel_orchestrator::store::Store;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(5);

fn queue(h: &Harness, cancel: CancellationToken) -> GenerationQueue {
    GenerationQueue::start(h.store_handle(), h.backend_handle(), &h.config, cancel)
}

#[tokio::test]
async fn queued_task_is_generated_in_background() {
    let h = Harness::new();
    h.worker("gpu-a", 0, 4).await;
    let task = h.frozen_task().await;
    let queue = queue(&h, CancellationToken::new());
    let mut events = queue.subscribe();

    let ticket = queue.enqueue(task.id).await.unwrap();
    assert_eq!(ticket.task_id, task.id);

    let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(
        event,
        GenerationEvent::Completed {
            task_id: task.id,
            submitted: 4
        }
    );
    let task = h.store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, "completed");

    queue.shutdown(WAIT).await;
}

#[tokio::test]
async fn enqueue_checks_preconditions_up_front() {
    let h = Harness::new();
    h.worker("gpu-a", 0, 4).await;
    let task = h.draft_task().await;
    let queue = queue(&h, CancellationToken::new());

    assert_matches!(
        queue.enqueue(task.id).await,
        Err(OrchestratorError::Core(CoreError::InvalidState { action: "generate", .. }))
    );
    assert_matches!(
        queue.enqueue(9999).await,
        Err(OrchestratorError::Core(CoreError::NotFound { entity: "task", .. }))
    );

    queue.shutdown(WAIT).await;
}

#[tokio::test]
async fn background_failure_is_reported_and_task_stays_frozen() {
    let h = Harness::new();
    h.worker("gpu-a", 0, 4).await;
    let task = h.frozen_task().await;
    let queue = queue(&h, CancellationToken::new());
    let mut events = queue.subscribe();

    h.backend.script(&base_url("gpu-a"), |s| {
        s.submit_error = Some((400, "bad graph".to_string()))
    });
    queue.enqueue(task.id).await.unwrap();

    let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_matches!(event, GenerationEvent::Failed { task_id, .. } if task_id == task.id);
    let task = h.store.get_task(task.id).await.unwrap().unwrap();
    assert_eq!(task.status, "frozen");

    queue.shutdown(WAIT).await;
}

#[tokio::test]
async fn cancelled_queue_refuses_work() {
    let h = Harness::new();
    h.worker("gpu-a", 0, 4).await;
    let task = h.frozen_task().await;
    let cancel = CancellationToken::new();
    let queue = queue(&h, cancel.clone());

    cancel.cancel();

    assert_matches!(queue.enqueue(task.id).await, Err(OrchestratorError::QueueClosed));
    queue.shutdown(WAIT).await;
}

#[tokio::test]
async fn health_monitor_sweeps_until_cancelled() {
    let h = Harness::new();
    let worker = h
        .orchestrator
        .register_worker(&new_worker("gpu-a", 0, 1), false)
        .await
        .unwrap();
    assert_eq!(worker.status, "UNKNOWN");

    let cancel = CancellationToken::new();
    let monitor = HealthMonitor::new(h.orchestrator.registry().clone(), h.config.health_check_interval);
    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { monitor.run(cancel).await }
    });

    let store = h.store.clone();
    tokio::time::timeout(WAIT, async move {
        loop {
            let worker = store.get_worker(worker.id).await.unwrap().unwrap();
            if worker.status == "HEALTHY" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
}
