//! ============================================================================
//! Session Module - Per-session buffering and recall state machine
//! ============================================================================
//! ```text
//! fragment ─► normalize ─► SegmentIngestor ──(boundary)──► flush to memory
//!                      └─► TriggerWatcher ──(opened)──► 2s timer ─► RecallDispatcher ─► outbox
//! request end ─► 5s timer ─► StaleBufferReaper ──(quiet)──► flush to memory
//! ```
//! ============================================================================

mod buffer;
mod dispatch;
mod ingest;
mod outbox;
mod reaper;
mod trigger;

pub use buffer::{SessionBuffer, SessionBufferStore, SharedBuffer};
pub use dispatch::{ClaimedRecall, RecallAnswer, RecallDecision, RecallDispatcher};
pub use ingest::SegmentIngestor;
pub use outbox::{RecallResponse, ResponseOutbox};
pub use reaper::StaleBufferReaper;
pub use trigger::{TriggerEvent, TriggerWatcher};

/// Lower-case, unify typographic apostrophes and trim. `None` for blank text.
pub fn normalize_fragment(raw: &str) -> Option<String> {
    let fragment = raw.trim().to_lowercase().replace('\u{2019}', "'");
    if fragment.is_empty() {
        None
    } else {
        Some(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_fragment() {
        assert_eq!(normalize_fragment("  I Don\u{2019}t Remember "), Some("i don't remember".to_string()));
        assert_eq!(normalize_fragment("   "), None);
        assert_eq!(normalize_fragment(""), None);
    }
}
