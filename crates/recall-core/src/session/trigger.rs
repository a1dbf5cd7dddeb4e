//! Trigger detection: opens a question-collection window when the speaker asks
//! to recall something, then gathers the rest of the question.

use tokio::time::Instant;
use tracing::{debug, info};

use super::buffer::SessionBuffer;

/// What a fragment did to the session's trigger state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    /// A new window opened; its dispatch timer must be scheduled
    Opened { cycle: u64 },
    /// The fragment joined the question of the already open window
    Appended,
    Ignored,
}

#[derive(Debug, Clone)]
pub struct TriggerWatcher {
    phrases: Vec<String>,
}

impl TriggerWatcher {
    pub fn new(phrases: Vec<String>) -> Self {
        Self {
            phrases: phrases.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// Substring containment, no tokenization
    pub fn matches(&self, fragment: &str) -> bool {
        self.phrases.iter().any(|phrase| fragment.contains(phrase.as_str()))
    }

    pub fn on_fragment(&self, buffer: &mut SessionBuffer, fragment: &str, now: Instant) -> TriggerEvent {
        if buffer.trigger_open {
            buffer.collected_question.push(fragment.to_string());
            debug!(
                "Appended to open question ({} fragments)",
                buffer.collected_question.len()
            );
            return TriggerEvent::Appended;
        }

        if !self.matches(fragment) {
            return TriggerEvent::Ignored;
        }

        buffer.trigger_open = true;
        buffer.trigger_opened_at = Some(now);
        buffer.collected_question = vec![fragment.to_string()];
        buffer.response_sent = false;
        buffer.cycle += 1;

        info!("Recall trigger detected, window {} opened", buffer.cycle);
        TriggerEvent::Opened {
            cycle: buffer.cycle,
        }
    }
}
