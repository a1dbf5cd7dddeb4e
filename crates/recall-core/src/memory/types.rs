//! ============================================================================
//! Memory Types - Data structures for stored memories and structured records
//! ============================================================================
//! Defines memory entries, search hits, and the structured record accepted by
//! the one-shot memory ingestion endpoint.
//! ============================================================================

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single memory entry stored in the vector database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Unique identifier for this memory
    pub id: Uuid,
    /// Session (or user) the memory belongs to
    pub session_id: String,
    /// The actual memory content
    pub content: String,
    pub kind: MemoryKind,
    /// Vector embedding (not serialized)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    /// Unix timestamp when memory was created
    pub created_at: i64,
}

impl Memory {
    /// Create a new memory entry
    pub fn new(session_id: String, content: String, kind: MemoryKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            content,
            kind,
            embedding: Vec::new(),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Create a memory with a pre-computed embedding
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = embedding;
        self
    }
}

/// Where a memory came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Sentence flushed from a live session buffer
    Utterance,
    /// Full transcript of a finished conversation
    Transcript,
    /// Synthesized conversation summary
    Summary,
    ActionItem,
    /// Text produced by an external app about the conversation
    AppResponse,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Utterance => "utterance",
            MemoryKind::Transcript => "transcript",
            MemoryKind::Summary => "summary",
            MemoryKind::ActionItem => "action_item",
            MemoryKind::AppResponse => "app_response",
        }
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "utterance" => Ok(MemoryKind::Utterance),
            "transcript" => Ok(MemoryKind::Transcript),
            "summary" => Ok(MemoryKind::Summary),
            "action_item" | "actionitem" => Ok(MemoryKind::ActionItem),
            "app_response" | "appresponse" => Ok(MemoryKind::AppResponse),
            _ => Err(format!("Unknown memory kind: {}", s)),
        }
    }
}

/// A stored document returned by similarity search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub content: String,
    /// Distance to the query; lower is more similar
    pub distance: f32,
}

/// Structured record of a finished conversation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryRecord {
    #[serde(default)]
    pub transcript_segments: Vec<TranscriptSegment>,
    #[serde(default)]
    pub structured: Option<StructuredSummary>,
    #[serde(default, alias = "plugins_response")]
    pub apps_response: Vec<AppResponse>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    #[serde(default)]
    pub speaker: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredSummary {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionItem {
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppResponse {
    #[serde(default)]
    pub content: String,
}

impl MemoryRecord {
    /// Transcript text: segment texts joined by single spaces
    pub fn transcript(&self) -> String {
        self.transcript_segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Summary string synthesized from the structured section
    pub fn summary(&self) -> Option<String> {
        let structured = self.structured.as_ref()?;
        if structured.title.trim().is_empty() && structured.overview.trim().is_empty() {
            return None;
        }

        let mut summary = format!(
            "Title: {}\nOverview: {}",
            structured.title.trim(),
            structured.overview.trim()
        );
        if let Some(category) = structured.category.as_deref().filter(|c| !c.is_empty()) {
            summary.push_str(&format!("\nCategory: {}", category));
        }
        Some(summary)
    }

    /// Every memory this record expands into, in storage order
    pub fn entries(&self) -> Vec<(MemoryKind, String)> {
        let mut entries = Vec::new();

        let transcript = self.transcript();
        if !transcript.is_empty() {
            entries.push((MemoryKind::Transcript, transcript));
        }

        if let Some(summary) = self.summary() {
            entries.push((MemoryKind::Summary, summary));
        }

        if let Some(structured) = &self.structured {
            for item in &structured.action_items {
                let text = item.description.trim();
                if !text.is_empty() {
                    entries.push((MemoryKind::ActionItem, text.to_string()));
                }
            }
        }

        for response in &self.apps_response {
            let text = response.content.trim();
            if !text.is_empty() {
                entries.push((MemoryKind::AppResponse, text.to_string()));
            }
        }

        entries
    }
}
