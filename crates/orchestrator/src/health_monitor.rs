//! Periodic health checks of the worker pool.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::registry::WorkerRegistry;

pub struct HealthMonitor {
    registry: WorkerRegistry,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(registry: WorkerRegistry, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Run health sweeps every `interval` until cancelled. The first sweep
    /// runs immediately.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Health monitor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.registry.periodic_health_check().await {
                        tracing::error!(error = %e, "Health sweep failed");
                    }
                }
            }
        }
    }
}
