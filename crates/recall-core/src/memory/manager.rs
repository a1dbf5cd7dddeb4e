//! ============================================================================
//! Memory Manager - Orchestrates memory storage and retrieval
//! ============================================================================
//! High-level API pairing an embedder with a vector store: every write embeds
//! then stores, every search embeds the query then ranks by distance.
//! ============================================================================

use std::sync::Arc;
use tracing::{debug, info};

use super::embeddings::Embedder;
use super::store::VectorStore;
use super::types::{Memory, MemoryKind, MemoryRecord, ScoredMemory};
use crate::error::Result;

/// Memory manager combining store and embeddings
#[derive(Clone)]
pub struct MemoryManager {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl MemoryManager {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Embed and store one piece of text for a session
    pub async fn remember(&self, session_id: &str, content: &str, kind: MemoryKind) -> Result<Memory> {
        let embedding = self.embedder.embed(content).await?;

        let memory = Memory::new(session_id.to_string(), content.to_string(), kind)
            .with_embedding(embedding);

        self.store.store(&memory).await?;

        info!(
            "Stored {} memory {} for session {} ({} chars)",
            kind,
            memory.id,
            session_id,
            content.len()
        );

        Ok(memory)
    }

    /// Search memories by semantic similarity, most similar first
    pub async fn recall(&self, session_id: &str, query: &str, top_k: u64) -> Result<Vec<ScoredMemory>> {
        debug!("Searching memories for session {} with query: {}", session_id, query);

        let embedding = self.embedder.embed(query).await?;
        self.store.query(session_id, embedding, top_k).await
    }

    /// Store every entry of a structured record as its own memory
    pub async fn ingest_record(&self, uid: &str, record: &MemoryRecord) -> Result<Vec<Memory>> {
        let mut stored = Vec::new();
        for (kind, content) in record.entries() {
            stored.push(self.remember(uid, &content, kind).await?);
        }

        info!("Ingested {} memories from structured record for {}", stored.len(), uid);
        Ok(stored)
    }

    /// Check if the memory system is healthy
    pub async fn health_check(&self) -> Result<bool> {
        self.store.health_check().await
    }
}
