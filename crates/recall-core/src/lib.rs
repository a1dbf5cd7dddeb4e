//! ============================================================================
//! RECALL-CORE: Conversational memory and recall
//! ============================================================================
//! Handles all backend logic for the recall webhook service:
//! - Per-session buffering of live transcript fragments into memories
//! - Trigger-phrase detection and bounded question collection
//! - Similarity search + answer generation, delivered at most once per cycle
//! - Stale-buffer reaping and idle-session eviction
//! ============================================================================

pub mod config;
pub mod error;
pub mod generator;
pub mod memory;
pub mod service;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export main types for convenience
pub use config::RecallConfig;
pub use error::{RecallError, Result};
pub use generator::{ChatCompletionGenerator, ResponseGenerator};
pub use service::{IngestReport, RecallService};
pub use session::RecallResponse;
