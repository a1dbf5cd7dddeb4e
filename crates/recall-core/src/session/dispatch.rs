//! ============================================================================
//! Recall Dispatcher - Resolves a question-collection window
//! ============================================================================
//! When a window's timer fires the dispatcher claims the cycle under the
//! session lock (so it can only be claimed once), then answers outside the
//! lock: similarity search, threshold check, and either the fixed "nothing
//! remembered" reply or a generated answer.
//! ============================================================================

use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info};

use super::buffer::SessionBuffer;
use crate::error::Result;
use crate::generator::ResponseGenerator;
use crate::memory::{MemoryManager, ScoredMemory};

/// A cycle claimed for answering
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedRecall {
    pub cycle: u64,
    pub question: String,
    pub opened_at: Option<Instant>,
}

/// Outcome of checking the search results against the threshold
#[derive(Debug, Clone, PartialEq)]
pub enum RecallDecision {
    NothingFound,
    /// Context built from every returned document, not just the best
    Answer { context: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecallAnswer {
    pub message: String,
    /// False when the fixed "nothing remembered" reply was used
    pub found: bool,
}

pub struct RecallDispatcher {
    memory: MemoryManager,
    generator: Arc<dyn ResponseGenerator>,
    similarity_threshold: f32,
    top_k: u64,
    nothing_remembered: String,
}

impl RecallDispatcher {
    pub fn new(
        memory: MemoryManager,
        generator: Arc<dyn ResponseGenerator>,
        similarity_threshold: f32,
        top_k: u64,
        nothing_remembered: String,
    ) -> Self {
        Self {
            memory,
            generator,
            similarity_threshold,
            top_k,
            nothing_remembered,
        }
    }

    /// Take the question of `cycle` if it is still open and unanswered.
    /// Marks the cycle answered and resets the window before returning, so a
    /// duplicate firing finds nothing to claim.
    pub fn claim(buffer: &mut SessionBuffer, cycle: u64) -> Option<ClaimedRecall> {
        if !buffer.trigger_open || buffer.response_sent || buffer.cycle != cycle {
            return None;
        }

        let question = std::mem::take(&mut buffer.collected_question).join(" ");
        buffer.response_sent = true;
        buffer.trigger_open = false;

        Some(ClaimedRecall {
            cycle,
            question,
            opened_at: buffer.trigger_opened_at.take(),
        })
    }

    /// Accept the best hit only if its distance is within the threshold
    pub fn decide(hits: &[ScoredMemory], threshold: f32) -> RecallDecision {
        match hits.first() {
            Some(best) if best.distance <= threshold => RecallDecision::Answer {
                context: hits
                    .iter()
                    .map(|h| h.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n"),
            },
            _ => RecallDecision::NothingFound,
        }
    }

    pub async fn answer(&self, session_id: &str, question: &str) -> Result<RecallAnswer> {
        let hits = self.memory.recall(session_id, question, self.top_k).await?;
        debug!(
            "Recall for session {}: {} hits, best distance {:?}",
            session_id,
            hits.len(),
            hits.first().map(|h| h.distance)
        );

        match Self::decide(&hits, self.similarity_threshold) {
            RecallDecision::NothingFound => {
                info!("Nothing remembered for session {}", session_id);
                Ok(RecallAnswer {
                    message: self.nothing_remembered.clone(),
                    found: false,
                })
            }
            RecallDecision::Answer { context } => {
                let message = self.generator.complete(question, &context).await?;
                info!("Generated recall answer for session {}", session_id);
                Ok(RecallAnswer {
                    message,
                    found: true,
                })
            }
        }
    }
}
