//! model-swap - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use model_swap::{
    FileSystemStore, ModelRegistry, RefreshMonitor, StoreModelLoader, api, config::ServeConfig,
    metrics,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "model-swap")]
#[command(about = "Prediction server with zero-downtime model swaps", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override API port
    #[arg(long)]
    port: Option<u16>,

    /// Override artifact store root directory
    #[arg(long)]
    store_root: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (json or pretty)
    #[arg(long, default_value = "json")]
    log_format: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    match cli.log_format.as_str() {
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(&cli.log_level)
                .json()
                .init();
        }
    }

    tracing::info!("Starting model-swap");

    // Load configuration
    let mut config = ServeConfig::load(cli.config)?;

    // CLI overrides
    if let Some(port) = cli.port {
        config.api_port = port;
    }
    if let Some(store_root) = cli.store_root {
        config.store_root = store_root;
    }

    config.validate()?;

    tracing::info!(
        api_port = config.api_port,
        store_root = ?config.store_root,
        manifest = %config.manifest_location(),
        refresh_interval_secs = config.refresh_interval_secs,
        load_timeout_secs = config.load_timeout_secs,
        "Configuration loaded"
    );

    // Setup metrics
    let prometheus_handle = metrics::setup_metrics()?;

    // Initialize registry; models load lazily on first request
    let store = Arc::new(FileSystemStore::new(config.store_root.clone()));
    let loader = Arc::new(StoreModelLoader::new(store.clone(), config.bucket.clone()));
    let registry = Arc::new(ModelRegistry::new(
        store,
        loader,
        config.manifest_location(),
        config.registry_policy(),
    ));

    if let Err(e) = registry.ensure_manifest_loaded().await {
        tracing::warn!(
            error = %e,
            "Manifest unavailable at startup, requests will retry"
        );
    }

    // Start refresh monitor
    let refresh_monitor = Arc::new(RefreshMonitor::new(registry.clone()));
    let monitor_handle = tokio::spawn({
        let monitor = refresh_monitor.clone();
        async move {
            monitor.run().await;
        }
    });

    // Setup API
    let app_state = api::AppState::new(
        registry.clone(),
        config.default_model.clone(),
        prometheus_handle,
    );
    let app = api::create_router(app_state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.api_port));
    tracing::info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API server")?;

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    tracing::info!("Shutting down...");

    // Cancel refresh monitor
    monitor_handle.abort();

    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
