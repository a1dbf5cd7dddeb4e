//! ============================================================================
//! Memory Module - Searchable conversation memory
//! ============================================================================
//! Provides vector-based memory storage for semantic recall.
//!
//! ## Architecture
//! ```text
//! Flushed sentence ─► Embed ─► Store (tagged with session id)
//!
//! Recall question ─► Embed ─► Query (session-scoped, top-k by distance)
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use recall_core::memory::{EmbeddingService, MemoryManager, QdrantStore};
//!
//! let embedder = Arc::new(EmbeddingService::new(api_key));
//! let store = Arc::new(QdrantStore::new("http://localhost:6334").await?);
//! let manager = MemoryManager::new(embedder, store);
//!
//! manager.remember(session_id, "the meeting moved to friday.", MemoryKind::Utterance).await?;
//! let hits = manager.recall(session_id, "when is the meeting", 5).await?;
//! ```
//! ============================================================================

mod embeddings;
mod in_memory;
mod manager;
mod store;
mod types;

pub use embeddings::{Embedder, EmbeddingService, DEFAULT_BASE_URL, DEFAULT_EMBEDDING_MODEL, EMBEDDING_DIM};
pub use in_memory::{cosine_distance, InMemoryVectorStore};
pub use manager::MemoryManager;
pub use store::{QdrantStore, VectorStore, COLLECTION_NAME};
pub use types::{
    ActionItem, AppResponse, Memory, MemoryKind, MemoryRecord, ScoredMemory, StructuredSummary,
    TranscriptSegment,
};
