//! Worker health, capacity and selection.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use datalabel_comfyui::backend::{ComfyUIBackend, WorkerEndpoint};
use datalabel_core::error::CoreError;
use datalabel_core::types::DbId;
use datalabel_core::versioning::version_at_least;
use datalabel_core::worker_selection::{fallback_load, has_capacity, RankKey, WorkerStatus};
use datalabel_db::models::worker::{CreateWorker, Worker};

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;
use crate::store::Store;

/// Tracks reachability and load of the worker pool.
///
/// Every mutation re-reads the worker row before writing it back.
/// Concurrent writers may overwrite each other; queue lengths are
/// advisory and re-queried before each submission.
#[derive(Clone)]
pub struct WorkerRegistry {
    store: Arc<dyn Store>,
    backend: Arc<dyn ComfyUIBackend>,
    min_version: Option<String>,
    required_features: Vec<String>,
    stagger: Duration,
}

impl WorkerRegistry {
    pub fn new(
        store: Arc<dyn Store>,
        backend: Arc<dyn ComfyUIBackend>,
        config: &OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            backend,
            min_version: config.worker_min_version.clone(),
            required_features: config.worker_required_features.clone(),
            stagger: config.health_check_stagger,
        }
    }

    // ---------------------------------------------------------------------
    // Registration
    // ---------------------------------------------------------------------

    /// Persist a new worker (status `UNKNOWN`), optionally checking its
    /// health straight away.
    pub async fn register_worker(
        &self,
        input: &CreateWorker,
        check: bool,
    ) -> Result<Worker, OrchestratorError> {
        if input.name.trim().is_empty() || input.base_url.trim().is_empty() {
            return Err(CoreError::Validation(
                "Worker name and base_url are required".to_string(),
            )
            .into());
        }
        if input.max_concurrent_jobs.is_some_and(|max| max < 1) {
            return Err(CoreError::Validation(
                "max_concurrent_jobs must be at least 1".to_string(),
            )
            .into());
        }

        let worker = self.store.insert_worker(input).await?;
        tracing::info!(worker_id = worker.id, name = %worker.name, "Worker registered");
        if check {
            return self.check_health(&worker).await;
        }
        Ok(worker)
    }

    // ---------------------------------------------------------------------
    // Health
    // ---------------------------------------------------------------------

    /// Check a worker against the configured version and feature
    /// requirements.
    pub async fn check_health(&self, worker: &Worker) -> Result<Worker, OrchestratorError> {
        self.check_health_with(worker, self.min_version.as_deref(), &self.required_features)
            .await
    }

    /// Query `/system_stats` (and `/queue` on success) and persist the
    /// outcome. Returns the updated worker; only persistence failures are
    /// errors.
    pub async fn check_health_with(
        &self,
        worker: &Worker,
        min_version: Option<&str>,
        required_features: &[String],
    ) -> Result<Worker, OrchestratorError> {
        let endpoint = WorkerEndpoint::from(worker);
        let outcome = self.query_worker(&endpoint, min_version, required_features).await;

        let mut updated = self.reload(worker.id).await?;
        match outcome {
            Ok(queue_length) => {
                updated.status = WorkerStatus::Healthy.as_str().to_string();
                if let Some(queue_length) = queue_length {
                    updated.queue_length = queue_length;
                }
                tracing::debug!(
                    worker_id = worker.id,
                    queue_length = updated.queue_length,
                    "Worker healthy",
                );
            }
            Err(reason) => {
                updated.status = WorkerStatus::Unhealthy.as_str().to_string();
                updated.queue_length = 0;
                tracing::warn!(worker_id = worker.id, reason = %reason, "Worker unhealthy");
            }
        }
        updated.last_health_check = Some(Utc::now());
        Ok(self.store.update_worker(&updated).await?)
    }

    /// Returns the observed queue length (`None` if the stats call passed
    /// but the queue could not be read) or the reason the worker is
    /// unhealthy.
    async fn query_worker(
        &self,
        endpoint: &WorkerEndpoint,
        min_version: Option<&str>,
        required_features: &[String],
    ) -> Result<Option<i32>, String> {
        let stats = self
            .backend
            .system_stats(endpoint)
            .await
            .map_err(|e| e.to_string())?;

        if let Some(minimum) = min_version {
            if !version_at_least(stats.version(), minimum) {
                return Err(format!(
                    "version {} is below the minimum {minimum}",
                    stats.version()
                ));
            }
        }
        let missing = stats.missing_features(required_features);
        if !missing.is_empty() {
            return Err(format!("missing required features: {}", missing.join(", ")));
        }

        match self.backend.queue(endpoint).await {
            Ok(queue) => Ok(Some(queue.total() as i32)),
            Err(e) => {
                tracing::debug!(
                    base_url = %endpoint.base_url,
                    error = %e,
                    "Queue read failed during health check",
                );
                Ok(None)
            }
        }
    }

    /// Check every enabled worker, pausing between checks. Returns how
    /// many came back healthy.
    ///
    /// A worker whose check fails (for example because its row was deleted
    /// mid-sweep) is logged and skipped.
    pub async fn periodic_health_check(&self) -> Result<usize, OrchestratorError> {
        let workers: Vec<Worker> = self
            .store
            .list_workers()
            .await?
            .into_iter()
            .filter(|w| w.enabled)
            .collect();

        let mut healthy = 0;
        for (index, worker) in workers.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.stagger).await;
            }
            match self.check_health(worker).await {
                Ok(checked) if WorkerStatus::parse(&checked.status) == WorkerStatus::Healthy => {
                    healthy += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(worker_id = worker.id, error = %e, "Health check failed, skipping worker");
                }
            }
        }
        tracing::info!(checked = workers.len(), healthy, "Health sweep finished");
        Ok(healthy)
    }

    // ---------------------------------------------------------------------
    // Load
    // ---------------------------------------------------------------------

    /// Read the live pending + running count and persist it.
    ///
    /// Worker call failures propagate as [`OrchestratorError::Worker`].
    pub async fn sync_queue_length(&self, worker: &Worker) -> Result<Worker, OrchestratorError> {
        let queue = self.backend.queue(&WorkerEndpoint::from(worker)).await?;
        let mut updated = self.reload(worker.id).await?;
        updated.queue_length = queue.total() as i32;
        Ok(self.store.update_worker(&updated).await?)
    }

    /// Pick the best healthy, enabled worker with live spare capacity.
    ///
    /// `candidates` restricts the search to the given worker IDs.
    /// Candidates are ranked on cached values and then re-verified one by
    /// one against the worker's live queue.
    pub async fn select(
        &self,
        candidates: Option<&[DbId]>,
    ) -> Result<Option<Worker>, OrchestratorError> {
        let mut workers: Vec<Worker> = self
            .store
            .list_workers()
            .await?
            .into_iter()
            .filter(|w| w.enabled && WorkerStatus::parse(&w.status) == WorkerStatus::Healthy)
            .filter(|w| candidates.map_or(true, |ids| ids.contains(&w.id)))
            .collect();
        workers.sort_by(|a, b| rank(a).cmp(&rank(b)));

        for worker in workers {
            let (worker, load) = match self.sync_queue_length(&worker).await {
                Ok(fresh) => {
                    let load = fresh.queue_length;
                    (fresh, load)
                }
                Err(OrchestratorError::Worker(e)) => {
                    let load = fallback_load(worker.queue_length, worker.current_jobs);
                    tracing::warn!(
                        worker_id = worker.id,
                        error = %e,
                        fallback_load = load,
                        "Live queue read failed, using cached load",
                    );
                    (worker, load)
                }
                Err(e) => return Err(e),
            };

            if has_capacity(load, worker.max_concurrent_jobs) {
                tracing::debug!(worker_id = worker.id, load, "Worker selected");
                return Ok(Some(worker));
            }
        }
        Ok(None)
    }

    /// Count a dispatched job against the worker.
    pub async fn record_job(&self, worker_id: DbId) -> Result<Worker, OrchestratorError> {
        let mut worker = self.reload(worker_id).await?;
        worker.current_jobs += 1;
        Ok(self.store.update_worker(&worker).await?)
    }

    /// Release a dispatched job. Never drops below zero.
    pub async fn complete_job(&self, worker_id: DbId) -> Result<Worker, OrchestratorError> {
        let mut worker = self.reload(worker_id).await?;
        worker.current_jobs = (worker.current_jobs - 1).max(0);
        Ok(self.store.update_worker(&worker).await?)
    }

    async fn reload(&self, worker_id: DbId) -> Result<Worker, OrchestratorError> {
        self.store
            .get_worker(worker_id)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound {
                    entity: "worker",
                    id: worker_id,
                }
                .into()
            })
    }
}

fn rank(worker: &Worker) -> RankKey<'_> {
    RankKey::new(worker.priority, worker.queue_length, &worker.name)
}
