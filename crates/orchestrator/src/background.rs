//! Background mass generation.
//!
//! [`GenerationQueue`] is a bounded channel feeding a fixed pool of
//! consumer tasks. Callers get an acknowledgment as soon as a task passes
//! the `generate` preconditions; the actual submissions run on a consumer.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use datalabel_comfyui::backend::ComfyUIBackend;
use datalabel_core::types::{DbId, Timestamp};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::orchestrator::TaskOrchestrator;
use crate::store::Store;

/// Capacity of the outcome broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Acknowledgment returned when a task is accepted for generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationTicket {
    pub task_id: DbId,
    pub accepted_at: Timestamp,
}

/// Outcome of one background generation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationEvent {
    Completed { task_id: DbId, submitted: usize },
    Failed { task_id: DbId, error: String },
}

pub struct GenerationQueue {
    sender: mpsc::Sender<GenerationTicket>,
    orchestrator: TaskOrchestrator,
    events: broadcast::Sender<GenerationEvent>,
    cancel: CancellationToken,
    consumers: Vec<JoinHandle<()>>,
}

impl GenerationQueue {
    /// Spawn `config.generation_consumers` consumers, each with its own
    /// orchestrator over a clone of `store`.
    pub fn start(
        store: Arc<dyn Store>,
        backend: Arc<dyn ComfyUIBackend>,
        config: &OrchestratorConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.generation_queue_capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let consumers = (0..config.generation_consumers.max(1))
            .map(|consumer| {
                let orchestrator =
                    TaskOrchestrator::new(Arc::clone(&store), Arc::clone(&backend), config);
                tokio::spawn(consume(
                    consumer,
                    orchestrator,
                    Arc::clone(&receiver),
                    events.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        tracing::info!(
            consumers = config.generation_consumers.max(1),
            capacity = config.generation_queue_capacity.max(1),
            "Generation queue started",
        );

        Self {
            sender,
            orchestrator: TaskOrchestrator::new(store, backend, config),
            events,
            cancel,
            consumers,
        }
    }

    /// Validate the `generate` preconditions and queue the task.
    ///
    /// Waits for queue space when the channel is full.
    pub async fn enqueue(&self, task_id: DbId) -> Result<GenerationTicket, OrchestratorError> {
        if self.cancel.is_cancelled() {
            return Err(OrchestratorError::QueueClosed);
        }
        self.orchestrator.preflight_generate(task_id).await?;

        let ticket = GenerationTicket {
            task_id,
            accepted_at: Utc::now(),
        };
        self.sender
            .send(ticket.clone())
            .await
            .map_err(|_| OrchestratorError::QueueClosed)?;
        tracing::info!(task_id, "Task queued for generation");
        Ok(ticket)
    }

    /// Receive outcomes of runs that finish after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.events.subscribe()
    }

    /// Stop the consumers, waiting up to `timeout` for each. A run in
    /// progress is abandoned when its consumer does not stop in time.
    pub async fn shutdown(self, timeout: Duration) {
        self.cancel.cancel();
        drop(self.sender);
        for handle in self.consumers {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                tracing::warn!("Generation consumer did not stop in time");
            }
        }
        tracing::info!("Generation queue stopped");
    }
}

async fn consume(
    consumer: usize,
    orchestrator: TaskOrchestrator,
    receiver: Arc<Mutex<mpsc::Receiver<GenerationTicket>>>,
    events: broadcast::Sender<GenerationEvent>,
    cancel: CancellationToken,
) {
    loop {
        let ticket = tokio::select! {
            _ = cancel.cancelled() => break,
            ticket = async { receiver.lock().await.recv().await } => match ticket {
                Some(ticket) => ticket,
                None => break,
            },
        };

        let task_id = ticket.task_id;
        tracing::debug!(consumer, task_id, "Generation picked up");
        let event = match orchestrator.generate(task_id).await {
            Ok(report) => GenerationEvent::Completed {
                task_id,
                submitted: report.submitted,
            },
            Err(e) => {
                tracing::error!(consumer, task_id, error = %e, "Background generation failed");
                GenerationEvent::Failed {
                    task_id,
                    error: e.to_string(),
                }
            }
        };
        // No subscribers is fine.
        let _ = events.send(event);
    }
    tracing::debug!(consumer, "Generation consumer stopped");
}
