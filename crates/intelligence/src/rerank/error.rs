//! Error types for re-ranking

use crate::generator::GenerationError;
use ctse_core::CtseError;
use thiserror::Error;

/// Errors that can occur during re-ranking
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RerankError {
    /// The generator failed, timed out or was cancelled
    #[error(transparent)]
    Generation(#[from] GenerationError),
    /// Model response held no usable scores
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<RerankError> for CtseError {
    fn from(e: RerankError) -> Self {
        match e {
            RerankError::Generation(g) => g.into(),
            RerankError::Parse(msg) => CtseError::GenerationUnavailable(msg),
        }
    }
}
