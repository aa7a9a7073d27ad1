//! LogPrompt API server - Main entry point

use anyhow::{Context, Result};
use clap::Parser;
use logprompt::{
    HubModelLoader, ModelCache, ModelRegistry, ModelStorage, accelerator, api,
    config::ServiceConfig, metrics,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "logprompt")]
#[command(about = "Transformer models API", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override bind address
    #[arg(long)]
    host: Option<String>,

    /// Override API port
    #[arg(long)]
    port: Option<u16>,

    /// Override models storage directory
    #[arg(long)]
    models_dir: Option<PathBuf>,

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

    tracing::info!("LogPrompt API starting");

    // Load configuration
    let mut config = ServiceConfig::load(cli.config)?;

    // CLI overrides
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(models_dir) = cli.models_dir {
        config.models_dir = models_dir;
    }

    config.validate()?;

    tracing::info!(
        host = %config.host,
        port = config.port,
        models_dir = ?config.models_dir,
        "Configuration loaded"
    );

    // Setup metrics
    let prometheus_handle = metrics::setup_metrics()?;

    let accelerator = *accelerator::get_or_init();
    let storage = ModelStorage::new(config.models_dir.clone());
    storage.ensure_root()?;

    report_stored_models(&storage);

    let loader = Arc::new(HubModelLoader::with_accelerator(storage, accelerator));
    let cache = Arc::new(ModelCache::new(loader));

    // Setup API
    let app_state = api::AppState {
        cache,
        accelerator,
        prometheus_handle,
    };

    let app = api::create_router(app_state);

    let addr = config.bind_addr()?;
    tracing::info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind API server")?;

    // Graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    tracing::info!("LogPrompt API shut down");

    Ok(())
}

/// Log which registry models are already on disk
fn report_stored_models(storage: &ModelStorage) {
    let stored = storage.stored_models();

    tracing::info!(
        models_dir = ?storage.root(),
        stored = stored.len(),
        supported = ModelRegistry::count(),
        "Pre-downloaded models"
    );

    if stored.is_empty() {
        tracing::warn!(
            "No pre-downloaded models found, run logprompt-download to fetch them ahead of time"
        );
    } else {
        tracing::info!(models = %stored.join(", "), "Available models");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
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
