//! Segment ingestion: append fragments and decide when a sentence is complete.

use tokio::time::Instant;
use tracing::debug;

use super::buffer::SessionBuffer;

const SENTENCE_TERMINALS: [char; 3] = ['.', '!', '?'];

/// Appends fragments to a session buffer and decides per fragment whether the
/// accumulated text should be flushed as a memory
#[derive(Debug, Clone)]
pub struct SegmentIngestor {
    long_utterance_chars: usize,
}

impl SegmentIngestor {
    pub fn new(long_utterance_chars: usize) -> Self {
        Self {
            long_utterance_chars,
        }
    }

    /// Flush on a sentence boundary, or when a single long fragment arrived
    /// on its own
    pub fn should_flush(&self, fragment: &str, batch_len: usize) -> bool {
        if fragment.ends_with(SENTENCE_TERMINALS) {
            return true;
        }
        batch_len == 1 && fragment.chars().count() > self.long_utterance_chars
    }

    /// Append a normalized fragment. Returns the joined text to persist when
    /// this fragment completes a flush; the pending list is already empty then.
    pub fn ingest(
        &self,
        buffer: &mut SessionBuffer,
        fragment: &str,
        batch_len: usize,
        now: Instant,
    ) -> Option<String> {
        buffer.pending_messages.push(fragment.to_string());
        buffer.last_activity_at = now;

        if !self.should_flush(fragment, batch_len) {
            debug!("Buffered fragment ({} pending)", buffer.pending_messages.len());
            return None;
        }
        buffer.take_pending()
    }
}
