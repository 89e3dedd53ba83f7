use std::sync::Arc;

use studytime_backend::config::Config;
use studytime_backend::engine::config::EngineConfig;
use studytime_backend::engine::StudyTimeEngine;
use studytime_backend::logging::{init_tracing, LogConfig};
use studytime_backend::store::Store;
use studytime_backend::workers::WorkerManager;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env();

    init_tracing(&LogConfig {
        log_level: config.log_level.clone(),
        enable_file_logs: config.enable_file_logs,
        log_dir: config.log_dir.clone(),
        retention_days: config.log_retention_days,
    });
    tracing::info!("Starting studytime-backend");

    let store = Arc::new(Store::open(&config.sled_path).expect("Failed to open sled database"));

    let engine_config = EngineConfig::from_env(&config.engine);
    let engine = Arc::new(
        StudyTimeEngine::new(engine_config, store.clone())
            .expect("Invalid engine configuration"),
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let worker_manager = WorkerManager::new(
        store.clone(),
        engine.clone(),
        shutdown_tx.subscribe(),
        &config.worker,
    );

    let worker_handle = tokio::spawn(async move {
        if let Err(e) = worker_manager.start().await {
            tracing::error!(error = %e, "Worker manager failed");
        }
    });

    shutdown_signal(shutdown_tx.clone()).await;

    if let Err(e) = worker_handle.await {
        tracing::error!(error = %e, "Worker task panicked");
    }

    tracing::info!("Flushing store before exit");
    if let Err(e) = store.flush() {
        tracing::error!(error = %e, "Failed to flush store before exit");
    }
    tracing::info!("Shutdown complete");
}

async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
