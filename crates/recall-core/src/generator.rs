//! ============================================================================
//! Response Generator - Recall answers via chat completions
//! ============================================================================
//! Turns a recall question plus retrieved memories into a short spoken-style
//! answer using an OpenAI-compatible `/chat/completions` API.
//! ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RecallError, Result};

/// Default model for answering recall questions
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You help someone remember things from their own past conversations. \
Answer the question using only the memories provided. Keep the answer to one or two short \
sentences. If the memories do not contain the answer, say so plainly.";

/// Produces an answer from a question and retrieved context
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn complete(&self, question: &str, context: &str) -> Result<String>;
}

/// Generator backed by a chat-completion endpoint
pub struct ChatCompletionGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl ChatCompletionGenerator {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn call_api(&self, messages: Vec<ChatMessage>) -> Result<String> {
        debug!("Calling chat completions ({}) with {} messages", self.model, messages.len());

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: Some(0.3),
            max_tokens: Some(256),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RecallError::provider("Failed to call chat completions API", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RecallError::Provider(format!(
                "Chat completions API error {}: {}",
                status, body
            )));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| RecallError::provider("Failed to parse chat completions response", e))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| RecallError::Provider("No response from chat completions API".to_string()))
    }
}

/// Render the user turn sent alongside the system prompt
pub fn build_prompt(question: &str, context: &str) -> String {
    format!("Memories:\n{}\n\nQuestion: {}", context, question)
}

#[async_trait]
impl ResponseGenerator for ChatCompletionGenerator {
    async fn complete(&self, question: &str, context: &str) -> Result<String> {
        let messages = vec![
            ChatMessage {
                role: "system".to_string(),
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: build_prompt(question, context),
            },
        ];

        self.call_api(messages).await
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
