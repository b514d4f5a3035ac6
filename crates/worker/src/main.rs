//! Orchestration worker process.
//!
//! Runs the periodic worker health monitor and the background generation
//! queue. Task IDs given as arguments are queued for mass generation at
//! start-up.

use std::sync::Arc;
use std::time::Duration;

use datalabel_comfyui::api::ComfyUIApi;
use datalabel_comfyui::backend::ComfyUIBackend;
use datalabel_orchestrator::background::GenerationQueue;
use datalabel_orchestrator::config::OrchestratorConfig;
use datalabel_orchestrator::health_monitor::HealthMonitor;
use datalabel_orchestrator::registry::WorkerRegistry;
use datalabel_orchestrator::store::{PgStore, Store};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "datalabel_worker=debug,datalabel_orchestrator=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = OrchestratorConfig::from_env();
    tracing::info!(
        consumers = config.generation_consumers,
        health_check_interval_secs = config.health_check_interval.as_secs(),
        "Loaded orchestrator configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = datalabel_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    datalabel_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    datalabel_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Worker client ---
    let api = ComfyUIApi::new(config.worker_request_timeout).expect("Failed to build HTTP client");
    let backend: Arc<dyn ComfyUIBackend> = Arc::new(api);
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    // --- Background services ---
    let cancel = CancellationToken::new();

    let monitor = HealthMonitor::new(
        WorkerRegistry::new(Arc::clone(&store), Arc::clone(&backend), &config),
        config.health_check_interval,
    );
    let monitor_handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { monitor.run(cancel).await }
    });
    tracing::info!("Health monitor started");

    let queue = GenerationQueue::start(store, backend, &config, cancel.clone());
    let mut events = queue.subscribe();
    let events_handle = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(?event, "Generation finished"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Generation event log fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    for arg in std::env::args().skip(1) {
        let Ok(task_id) = arg.parse::<i64>() else {
            tracing::warn!(arg = %arg, "Ignoring argument that is not a task ID");
            continue;
        };
        match queue.enqueue(task_id).await {
            Ok(ticket) => tracing::info!(task_id = ticket.task_id, "Task accepted"),
            Err(e) => tracing::error!(task_id, error = %e, "Task rejected"),
        }
    }

    shutdown_signal().await;

    // --- Shutdown ---
    cancel.cancel();
    queue.shutdown(SHUTDOWN_TIMEOUT).await;
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, monitor_handle).await.is_err() {
        tracing::warn!("Health monitor did not stop in time");
    }
    events_handle.abort();

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
