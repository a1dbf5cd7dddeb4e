//! ============================================================================
//! Memory Store - Vector database operations
//! ============================================================================
//! `VectorStore` is the seam between the recall logic and whatever holds the
//! vectors. `QdrantStore` is the production backend.
//! ============================================================================

use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use super::embeddings::EMBEDDING_DIM;
use super::types::{Memory, ScoredMemory};
use crate::error::{RecallError, Result};

/// Collection name for memories
pub const COLLECTION_NAME: &str = "recall_memories";

/// Persists embedded memories and answers similarity queries
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Store one memory. Not idempotent: every call creates a new entry.
    async fn store(&self, memory: &Memory) -> Result<()>;

    /// Nearest memories for `session_id`, ascending by distance
    async fn query(
        &self,
        session_id: &str,
        embedding: Vec<f32>,
        top_k: u64,
    ) -> Result<Vec<ScoredMemory>>;

    async fn health_check(&self) -> Result<bool>;
}

/// Memory store backed by Qdrant vector database
pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    /// Create a new memory store, connecting to Qdrant
    pub async fn new(url: &str) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| RecallError::provider("Failed to create Qdrant client", e))?;

        let store = Self { client };
        store.ensure_collection().await?;

        Ok(store)
    }

    /// Ensure the memories collection exists
    async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(COLLECTION_NAME)
            .await
            .map_err(|e| RecallError::provider("Failed to check collection existence", e))?;

        if exists {
            debug!("Collection {} already exists", COLLECTION_NAME);
            return Ok(());
        }

        info!("Creating collection: {}", COLLECTION_NAME);

        self.client
            .create_collection(
                CreateCollectionBuilder::new(COLLECTION_NAME).vectors_config(
                    VectorParamsBuilder::new(EMBEDDING_DIM as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(|e| RecallError::provider("Failed to create collection", e))?;

        info!("Collection {} created successfully", COLLECTION_NAME);
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn store(&self, memory: &Memory) -> Result<()> {
        if memory.embedding.is_empty() {
            return Err(RecallError::Provider(
                "Cannot store memory without embedding".to_string(),
            ));
        }

        debug!("Storing memory {} for session {}", memory.id, memory.session_id);

        let payload: HashMap<String, Value> = [
            ("session_id".to_string(), Value::from(memory.session_id.clone())),
            ("content".to_string(), Value::from(memory.content.clone())),
            ("kind".to_string(), Value::from(memory.kind.to_string())),
            ("created_at".to_string(), Value::from(memory.created_at)),
        ]
        .into_iter()
        .collect();

        let point = PointStruct::new(memory.id.to_string(), memory.embedding.clone(), payload);

        self.client
            .upsert_points(UpsertPointsBuilder::new(COLLECTION_NAME, vec![point]))
            .await
            .map_err(|e| RecallError::provider("Failed to upsert memory", e))?;

        Ok(())
    }

    async fn query(
        &self,
        session_id: &str,
        embedding: Vec<f32>,
        top_k: u64,
    ) -> Result<Vec<ScoredMemory>> {
        debug!("Searching memories for session {} (top {})", session_id, top_k);

        let filter = Filter::must([Condition::matches("session_id", session_id.to_string())]);

        let search_result = self
            .client
            .search_points(
                SearchPointsBuilder::new(COLLECTION_NAME, embedding, top_k)
                    .filter(filter)
                    .with_payload(true),
            )
            .await
            .map_err(|e| RecallError::provider("Failed to search memories", e))?;

        // Qdrant reports cosine similarity; callers work in distance
        let mut hits: Vec<ScoredMemory> = search_result
            .result
            .into_iter()
            .filter_map(|point| {
                Some(ScoredMemory {
                    content: get_string(&point.payload, "content")?,
                    distance: 1.0 - point.score,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        debug!("Found {} matching memories", hits.len());
        Ok(hits)
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.health_check().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Qdrant health check failed: {}", e);
                Ok(false)
            }
        }
    }
}

fn get_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    payload.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}
