//! In-process vector store with cosine distance, for local runs without Qdrant.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::store::VectorStore;
use super::types::{Memory, ScoredMemory};
use crate::error::{RecallError, Result};

#[derive(Default)]
pub struct InMemoryVectorStore {
    memories: RwLock<Vec<Memory>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.memories.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.memories.read().await.is_empty()
    }

    /// Contents stored for one session, in insertion order
    pub async fn contents(&self, session_id: &str) -> Vec<String> {
        self.memories
            .read()
            .await
            .iter()
            .filter(|m| m.session_id == session_id)
            .map(|m| m.content.clone())
            .collect()
    }
}

/// 1 - cosine similarity; orthogonal or zero vectors are at distance 1
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn store(&self, memory: &Memory) -> Result<()> {
        if memory.embedding.is_empty() {
            return Err(RecallError::Provider(
                "Cannot store memory without embedding".to_string(),
            ));
        }
        self.memories.write().await.push(memory.clone());
        Ok(())
    }

    async fn query(
        &self,
        session_id: &str,
        embedding: Vec<f32>,
        top_k: u64,
    ) -> Result<Vec<ScoredMemory>> {
        let memories = self.memories.read().await;
        let mut hits: Vec<ScoredMemory> = memories
            .iter()
            .filter(|m| m.session_id == session_id)
            .map(|m| ScoredMemory {
                content: m.content.clone(),
                distance: cosine_distance(&m.embedding, &embedding),
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(top_k as usize);
        Ok(hits)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::MemoryKind;

    fn memory(session: &str, content: &str, embedding: Vec<f32>) -> Memory {
        Memory::new(session.to_string(), content.to_string(), MemoryKind::Utterance)
            .with_embedding(embedding)
    }

    #[test]
    fn test_cosine_distance() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0]).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[tokio::test]
    async fn test_query_is_scoped_and_ordered() {
        let store = InMemoryVectorStore::new();
        store.store(&memory("a", "far", vec![0.0, 1.0])).await.unwrap();
        store.store(&memory("a", "near", vec![1.0, 0.1])).await.unwrap();
        store.store(&memory("b", "other session", vec![1.0, 0.0])).await.unwrap();

        let hits = store.query("a", vec![1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].content, "near");
        assert_eq!(hits[1].content, "far");
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[tokio::test]
    async fn test_query_truncates_to_top_k() {
        let store = InMemoryVectorStore::new();
        for i in 0..8 {
            store
                .store(&memory("a", &format!("m{}", i), vec![1.0, i as f32]))
                .await
                .unwrap();
        }
        assert_eq!(store.query("a", vec![1.0, 0.0], 5).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_rejects_missing_embedding() {
        let store = InMemoryVectorStore::new();
        let bare = Memory::new("a".to_string(), "x".to_string(), MemoryKind::Utterance);
        assert!(store.store(&bare).await.is_err());
        assert!(store.is_empty().await);
    }
}
