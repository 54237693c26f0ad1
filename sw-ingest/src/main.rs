//! sw-ingest - cetacean observation ingest service
//!
//! Serves the observation workflow (upload, data entry, validation,
//! classification, review, upload to dataset) over HTTP, one independent
//! workflow per session.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sw_common::config::{load_config, TomlConfig};
use sw_common::events::EventBus;
use sw_common::log_buffer::LogBuffer;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sw_ingest::services::{
    Classifier, DatasetStore, ExifMetadataReader, HfClassifier, HfDatasetStore, MemoryDatasetStore,
};
use sw_ingest::AppState;

/// Command-line arguments for sw-ingest
#[derive(Parser, Debug)]
#[command(name = "sw-ingest")]
#[command(about = "Cetacean observation ingest service")]
#[command(version)]
struct Args {
    /// TOML config file (default: platform config dir)
    #[arg(short, long, env = "SW_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on, e.g. 127.0.0.1:5731
    #[arg(short, long)]
    bind: Option<String>,

    /// Target dataset, e.g. Saving-Willy/main_dataset
    #[arg(long)]
    dataset_id: Option<String>,

    /// Classifier inference endpoint
    #[arg(long)]
    classifier_endpoint: Option<String>,

    /// Publish to the dataset (otherwise uploads stay in memory)
    #[arg(long)]
    enable_push: bool,
}

impl Args {
    fn apply_to(&self, config: &mut TomlConfig) {
        if let Some(bind) = &self.bind {
            config.bind_address = bind.clone();
        }
        if let Some(id) = &self.dataset_id {
            config.dataset.dataset_id = id.clone();
        }
        if let Some(endpoint) = &self.classifier_endpoint {
            config.classifier.endpoint = endpoint.clone();
        }
        if self.enable_push {
            config.dataset.enable_push = true;
        }
    }
}

fn resolve_config(args: &Args) -> Result<TomlConfig> {
    let mut config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    args.apply_to(&mut config);
    config.validate().context("Invalid configuration")?;
    sw_ingest::check_workflow_config(&config).context("Invalid workflow.states")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = resolve_config(&args)?;

    let log_buffer = LogBuffer::new(config.logging.buffer_len);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(log_buffer.layer())
        .init();

    info!("Starting sw-ingest (Observation Ingest)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(states = ?config.workflow.states, "Workflow configured");

    let classifier: Arc<dyn Classifier> = Arc::new(
        HfClassifier::new(
            config.classifier.endpoint.clone(),
            config.hf_token.clone(),
            config.classifier.timeout(),
        )
        .context("Failed to create classifier client")?,
    );
    info!(endpoint = %config.classifier.endpoint, "Classifier client initialized");

    let dataset_store: Arc<dyn DatasetStore> = if config.dataset.enable_push {
        if config.hf_token.is_none() {
            warn!("Dataset push enabled without HF_TOKEN; commits will likely be rejected");
        }
        Arc::new(
            HfDatasetStore::new(
                config.dataset.endpoint.clone(),
                config.hf_token.clone(),
                config.dataset.timeout(),
            )
            .context("Failed to create dataset client")?,
        )
    } else {
        warn!("Dataset push disabled; uploads are kept in memory only");
        Arc::new(MemoryDatasetStore::new())
    };
    info!(
        dataset_id = %config.dataset.dataset_id,
        store = dataset_store.kind(),
        "Dataset store initialized"
    );

    let event_bus = EventBus::new(100);
    let state = AppState::new(
        &config,
        classifier,
        dataset_store,
        Arc::new(ExifMetadataReader),
        event_bus,
        log_buffer,
    );

    let app = sw_ingest::build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;
    info!("Listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
