//! In-process fakes for the external providers, shared by unit tests here and
//! by the server crate's handler tests.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use crate::config::RecallConfig;
use crate::error::{RecallError, Result};
use crate::generator::ResponseGenerator;
use crate::memory::{Embedder, Memory, MemoryManager, ScoredMemory, VectorStore};
use crate::service::RecallService;

/// Bag-of-words embedder: texts sharing words end up close together
pub struct KeywordEmbedder {
    dims: usize,
}

impl Default for KeywordEmbedder {
    fn default() -> Self {
        Self { dims: 256 }
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; self.dims];
        for word in text
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            vector[(hasher.finish() % self.dims as u64) as usize] += 1.0;
        }
        Ok(vector)
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RecallError::Provider("embedding provider unavailable".to_string()))
    }
}

/// Records every stored memory; answers every query with the same hits
pub struct FixedHitsStore {
    hits: Vec<ScoredMemory>,
    stored: Mutex<Vec<Memory>>,
}

impl FixedHitsStore {
    pub fn new(hits: Vec<ScoredMemory>) -> Self {
        Self {
            hits,
            stored: Mutex::new(Vec::new()),
        }
    }

    pub fn stored_contents(&self) -> Vec<String> {
        self.stored
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }
}

#[async_trait]
impl VectorStore for FixedHitsStore {
    async fn store(&self, memory: &Memory) -> Result<()> {
        self.stored
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(memory.clone());
        Ok(())
    }

    async fn query(&self, _session_id: &str, _embedding: Vec<f32>, top_k: u64) -> Result<Vec<ScoredMemory>> {
        Ok(self.hits.iter().take(top_k as usize).cloned().collect())
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

/// Returns a canned reply and remembers every (question, context) it saw
pub struct RecordingGenerator {
    reply: String,
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingGenerator {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl ResponseGenerator for RecordingGenerator {
    async fn complete(&self, question: &str, context: &str) -> Result<String> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((question.to_string(), context.to_string()));
        Ok(self.reply.clone())
    }
}

/// Service with default timings, a fixed-hits store and a generator replying
/// "it was dana"
pub fn service_with(
    hits: Vec<ScoredMemory>,
) -> (RecallService, Arc<FixedHitsStore>, Arc<RecordingGenerator>) {
    let store = Arc::new(FixedHitsStore::new(hits));
    let generator = Arc::new(RecordingGenerator::new("it was dana"));
    let service = RecallService::new(
        RecallConfig::default(),
        MemoryManager::new(Arc::new(KeywordEmbedder::default()), store.clone()),
        generator.clone(),
    );
    (service, store, generator)
}
