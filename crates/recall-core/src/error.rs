//! ============================================================================
//! Errors - Failure taxonomy for the recall service
//! ============================================================================

/// Error types for the recall core
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecallError {
    /// A required identifier was missing or empty. Never retried.
    #[error("{0}")]
    Validation(String),

    /// Embedding, vector search or completion call failed upstream.
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RecallError {
    pub fn provider(context: &str, err: impl std::fmt::Display) -> Self {
        RecallError::Provider(format!("{}: {}", context, err))
    }
}

pub type Result<T> = std::result::Result<T, RecallError>;
