use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// The index was created for a different embedding size. Not retryable.
    #[error("Embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid index configuration: {0}")]
    Config(String),

    #[error("Vector index database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt record payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl IndexError {
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::DimensionMismatch { .. } | Self::Config(_))
    }
}
