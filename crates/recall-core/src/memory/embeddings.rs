//! ============================================================================
//! Embedding Service - Vector embeddings for semantic memory search
//! ============================================================================
//! Generates text embeddings through an OpenAI-compatible `/embeddings` API.
//! ============================================================================

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RecallError, Result};

/// Default embedding model (OpenAI compatible)
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Expected embedding dimension for text-embedding-3-small
pub const EMBEDDING_DIM: usize = 1536;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Turns text into a vector
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Embedding service for generating text vectors
pub struct EmbeddingService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    model: String,
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct EmbeddingUsage {
    prompt_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl EmbeddingService {
    /// Create a new embedding service against the public OpenAI API
    pub fn new(api_key: String) -> Self {
        Self::new_custom(
            api_key,
            DEFAULT_BASE_URL.to_string(),
            DEFAULT_EMBEDDING_MODEL.to_string(),
        )
    }

    /// Create with custom base URL and model
    pub fn new_custom(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    /// Generate embeddings for multiple texts
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RecallError::provider("Failed to send embedding request", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RecallError::provider("Failed to read embedding response", e))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(RecallError::Provider(format!(
                    "Embedding API error ({}): {}",
                    status, error.error.message
                )));
            }
            return Err(RecallError::Provider(format!(
                "Embedding API error ({}): {}",
                status, body
            )));
        }

        let embedding_response: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| RecallError::provider("Failed to parse embedding response", e))?;

        if let Some(usage) = &embedding_response.usage {
            debug!(
                "Embedding tokens used: {} (model: {})",
                usage.total_tokens, embedding_response.model
            );
        }

        // The API may answer out of order
        let mut embeddings: Vec<(usize, Vec<f32>)> = embedding_response
            .data
            .into_iter()
            .map(|d| (d.index, d.embedding))
            .collect();
        embeddings.sort_by_key(|(idx, _)| *idx);

        Ok(embeddings.into_iter().map(|(_, e)| e).collect())
    }

    /// Get the current model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Embedder for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(vec![text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RecallError::Provider("No embedding returned".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_creation() {
        let service = EmbeddingService::new("test-key".to_string());
        assert_eq!(service.base_url(), DEFAULT_BASE_URL);
        assert_eq!(service.model(), DEFAULT_EMBEDDING_MODEL);
    }

    #[test]
    fn test_custom_base_url_trailing_slash() {
        let service = EmbeddingService::new_custom(
            "test-key".to_string(),
            "http://localhost:8080/v1/".to_string(),
            "nomic-embed-text".to_string(),
        );
        assert_eq!(service.base_url(), "http://localhost:8080/v1");
        assert_eq!(service.model(), "nomic-embed-text");
    }

    #[tokio::test]
    async fn test_empty_input() {
        let service = EmbeddingService::new("test-key".to_string());
        let result = service.embed_batch(vec![]).await;
        assert!(result.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_provider_error() {
        let service = EmbeddingService::new_custom(
            "test-key".to_string(),
            "http://127.0.0.1:9".to_string(),
            DEFAULT_EMBEDDING_MODEL.to_string(),
        );
        let err = service.embed("hello").await.unwrap_err();
        assert!(matches!(err, RecallError::Provider(_)));
    }
}
