//! Error types for the retrieval core
//!
//! One enum covers the whole taxonomy: per-record ingestion failures,
//! degradations of the external encoder and generator, fatal query errors,
//! and the infrastructure errors of the on-disk store.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for retrieval-core operations
pub type CtseResult<T> = std::result::Result<T, CtseError>;

/// Error types for the retrieval core
#[derive(Debug, Error)]
pub enum CtseError {
    /// Raw record could not be turned into a `Document` (rejects that record only)
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// External encoder failed or is not reachable
    #[error("Encoder unavailable: {0}")]
    EncoderUnavailable(String),

    /// External encoder did not answer within the caller's budget
    #[error("Encoder timed out after {0:?}")]
    EncoderTimeout(Duration),

    /// Encoder returned a vector the ANN index cannot hold
    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    /// Vector length differs from the configured dimension
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension
        expected: usize,
        /// Dimension actually supplied
        actual: usize,
    },

    /// Index Store cannot produce a snapshot
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// External generative model failed or is not configured
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// External generative model did not answer within the caller's budget
    #[error("Generation timed out after {0:?}")]
    GenerationTimeout(Duration),

    /// Query had no terms and no embedding could be derived
    #[error("Empty query")]
    EmptyQuery,

    /// Caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Configuration rejected at startup
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error (file operations, network, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Data corruption detected
    #[error("Data corruption: {0}")]
    Corruption(String),
}

impl CtseError {
    /// Whether this error only degrades the vector path of a document or query
    /// instead of failing the operation.
    pub fn is_encoder_degradation(&self) -> bool {
        matches!(
            self,
            CtseError::EncoderUnavailable(_)
                | CtseError::EncoderTimeout(_)
                | CtseError::InvalidEmbedding(_)
                | CtseError::DimensionMismatch { .. }
        )
    }

    /// Whether this error comes from the optional generation stage
    pub fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            CtseError::GenerationUnavailable(_) | CtseError::GenerationTimeout(_)
        )
    }
}

impl From<rmp_serde::encode::Error> for CtseError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        CtseError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CtseError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        CtseError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for CtseError {
    fn from(e: serde_json::Error) -> Self {
        CtseError::Serialization(e.to_string())
    }
}
