//! ============================================================================
//! Recall Config - Timing windows and thresholds for session buffering
//! ============================================================================

use std::time::Duration;

/// Phrases whose presence in a fragment opens a question-collection window
pub const DEFAULT_TRIGGER_PHRASES: &[&str] = &[
    "forgot",
    "don't remember",
    "do not remember",
    "can't remember",
    "cannot remember",
    "can't recall",
];

/// Reply used when no stored memory is close enough to the question
pub const NOTHING_REMEMBERED: &str = "I couldn't find anything in your memories about that.";

/// Tunable behavior of the session state machine
#[derive(Debug, Clone)]
pub struct RecallConfig {
    /// How long a trigger window collects question text before dispatch
    pub question_window: Duration,
    /// Inactivity after which unpunctuated pending text is flushed anyway
    pub stale_after: Duration,
    /// Maximum accepted distance for the best match (lower = more similar)
    pub similarity_threshold: f32,
    /// Number of memories retrieved per recall
    pub top_k: u64,
    /// A lone fragment longer than this (in chars) is flushed immediately
    pub long_utterance_chars: usize,
    pub trigger_phrases: Vec<String>,
    pub nothing_remembered: String,
    /// Idle sessions with no pending state are evicted after this long
    pub evict_after: Duration,
    /// How often the eviction sweeper runs
    pub sweep_interval: Duration,
    /// Undelivered answers kept per session before the oldest is dropped
    pub outbox_capacity: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            question_window: Duration::from_millis(2000),
            stale_after: Duration::from_millis(5000),
            similarity_threshold: 0.4,
            top_k: 5,
            long_utterance_chars: 50,
            trigger_phrases: DEFAULT_TRIGGER_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            nothing_remembered: NOTHING_REMEMBERED.to_string(),
            evict_after: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
            outbox_capacity: 16,
        }
    }
}
