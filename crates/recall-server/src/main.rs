// ============================================================================
// recall-server: webhook service turning live transcripts into memories
// ============================================================================
// Usage:
//   recall-server                            Serve with settings from .env
//   recall-server --bind 127.0.0.1:9000      Override the listen address
//   recall-server --in-memory                Keep memories in process
// ============================================================================

mod config;
mod routes;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use recall_core::memory::{EmbeddingService, InMemoryVectorStore, MemoryManager, QdrantStore, VectorStore};
use recall_core::{ChatCompletionGenerator, RecallService};

use crate::config::{Cli, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("recall_server=debug".parse()?)
                .add_directive("recall_core=debug".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::from_env(&cli)?;

    info!("Starting recall server on {}", config.bind);

    let embedder = Arc::new(EmbeddingService::new_custom(
        config.api_key.clone(),
        config.api_base_url.clone(),
        config.embedding_model.clone(),
    ));

    let store: Arc<dyn VectorStore> = match &config.qdrant_url {
        Some(url) => {
            let store = QdrantStore::new(url)
                .await
                .with_context(|| format!("Failed to connect to Qdrant at {}", url))?;
            info!("Memory store: Qdrant at {}", url);
            Arc::new(store)
        }
        None => {
            warn!("QDRANT_URL not set - memories are kept in process and lost on restart");
            Arc::new(InMemoryVectorStore::new())
        }
    };

    let generator = Arc::new(ChatCompletionGenerator::new(
        config.api_key.clone(),
        config.api_base_url.clone(),
        config.chat_model.clone(),
    ));

    let service = RecallService::new(
        config.recall.clone(),
        MemoryManager::new(embedder, store),
        generator,
    );
    let sweeper = service.spawn_eviction_sweeper();

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, routes::router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Recall server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
