//! Docent application binary - composition root.
//!
//! Ties together all Docent crates into a single executable:
//! 1. Load and validate configuration from TOML
//! 2. Open the SQLite passage store
//! 3. Ingest the configured document directories
//! 4. Build the chat engine over the generation backend and retrieval tool
//! 5. Serve the axum REST API until Ctrl-C

mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;

use docent_api::{start_server, AppState};
use docent_chat::{ChatEngine, OpenAiBackend, RetrievalToolDispatcher, StoreRetrieval};
use docent_core::config::DocentConfig;
use docent_core::error::DocentError;
use docent_storage::{ingest_directory, Database, PassageStore};

use crate::cli::{expand_home, CliArgs};

/// Ingest one directory, logging the outcome. Failed files never abort start-up.
fn ingest(store: &PassageStore, dir: &Path, max_passage_chars: usize) {
    if !dir.is_dir() {
        tracing::warn!(path = %dir.display(), "Documents directory not found, skipping");
        return;
    }
    match ingest_directory(store, dir, max_passage_chars) {
        Ok(report) => {
            tracing::info!(
                path = %dir.display(),
                documents = report.documents,
                passages = report.passages,
                skipped = report.skipped,
                failed = report.failed.len(),
                "Ingestion finished"
            );
            for (path, reason) in &report.failed {
                tracing::warn!(path = %path.display(), reason = %reason, "Document not ingested");
            }
        }
        Err(e) => tracing::error!(path = %dir.display(), error = %e, "Ingestion failed"),
    }
}

/// Read the configuration file. A missing file is `Ok(None)`; a file that
/// exists but cannot be read or parsed is an error.
fn load_config(path: &Path) -> Result<Option<DocentConfig>, DocentError> {
    if !path.exists() {
        return Ok(None);
    }
    DocentConfig::load(path).map(Some)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. Read before tracing starts so the configured level applies;
    // a load failure is reported once the subscriber is installed.
    let config_file = args.resolve_config_path();
    let loaded = load_config(&config_file);
    let mut config = match &loaded {
        Ok(Some(config)) => config.clone(),
        _ => DocentConfig::default(),
    };
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }
    config.general.port = args.resolve_port(config.general.port);
    config.general.log_level = args.resolve_log_level(&config.general.log_level);

    // Tracing. RUST_LOG overrides the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Docent v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Ok(Some(_)) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Ok(None) => tracing::info!(
            path = %config_file.display(),
            "No configuration file, using defaults"
        ),
        Err(e) => {
            tracing::error!(path = %config_file.display(), error = %e, "Invalid configuration file");
            return Err(e.into());
        }
    }
    config.validate()?;

    // Storage.
    let data_dir = expand_home(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join("docent.db");
    let store = PassageStore::new(Arc::new(Database::new(&db_path)?));
    tracing::info!(path = %db_path.display(), "Passage store opened");

    // Ingestion.
    let max_chars = config.retrieval.max_passage_chars;
    if let Some(ref dir) = config.retrieval.documents_dir {
        ingest(&store, &expand_home(dir), max_chars);
    }
    if let Some(ref dir) = args.ingest {
        ingest(&store, dir, max_chars);
    }
    tracing::info!(passages = store.count()?, "Knowledge store ready");

    if args.ingest_only {
        return Ok(());
    }

    // Chat engine.
    let backend = OpenAiBackend::new(&config.generation)?;
    tracing::info!(
        endpoint = %config.generation.endpoint,
        model = %config.generation.model,
        "Generation backend configured"
    );
    let dispatcher =
        RetrievalToolDispatcher::new(Arc::new(StoreRetrieval::new(store.clone())));
    let engine = Arc::new(ChatEngine::new(Arc::new(backend), dispatcher));

    // API server.
    let state = AppState::new(config, engine, store);
    start_server(state, shutdown_signal()).await?;

    tracing::info!("Docent stopped");
    Ok(())
}
