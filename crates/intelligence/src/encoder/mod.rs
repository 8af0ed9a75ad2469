//! Encoder service boundary
//!
//! `encode(text) -> vector of dimension D`. Implementations may block; the
//! engine always calls them through `GuardedEncoder`, which enforces the
//! caller's deadline and cancellation and validates the output.
//!
//! # Implementations
//!
//! - `HashingEncoder`: local feature hashing, always available
//! - `ApiEncoder`: OpenAI-compatible `/embeddings` endpoint

pub mod api;
pub mod hashing;

pub use api::ApiEncoder;
pub use hashing::HashingEncoder;

use crate::guard::{run_guarded, GuardError};
use ctse_core::{CallContext, CtseError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while encoding text
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodeError {
    /// Encoder failed or cannot be reached
    #[error("encoder unavailable: {0}")]
    Unavailable(String),
    /// Encoder did not answer in time
    #[error("encoder timed out after {0:?}")]
    Timeout(Duration),
    /// Caller cancelled the request
    #[error("encode request cancelled")]
    Cancelled,
    /// Encoder answered with an unusable vector
    #[error("invalid encoder output: {0}")]
    InvalidOutput(String),
    /// Text has nothing the encoder can represent
    #[error("no encodable text")]
    EmptyInput,
}

impl From<EncodeError> for CtseError {
    fn from(e: EncodeError) -> Self {
        match e {
            EncodeError::Unavailable(msg) => CtseError::EncoderUnavailable(msg),
            EncodeError::Timeout(d) => CtseError::EncoderTimeout(d),
            EncodeError::Cancelled => CtseError::Cancelled,
            EncodeError::InvalidOutput(msg) => CtseError::InvalidEmbedding(msg),
            EncodeError::EmptyInput => CtseError::InvalidEmbedding("no encodable text".to_string()),
        }
    }
}

/// Text encoder producing fixed-dimension embeddings.
///
/// The trait is object-safe for use as `Arc<dyn Encoder>`.
pub trait Encoder: Send + Sync {
    /// Embed `text`. Implementations should respect `ctx` where they can.
    fn encode(&self, text: &str, ctx: &CallContext) -> Result<Vec<f32>, EncodeError>;

    /// Output dimension `D`
    fn dimension(&self) -> usize;

    /// Name for logs
    fn name(&self) -> &str;

    /// Whether a call may block for non-trivial time
    fn is_remote(&self) -> bool {
        true
    }
}

/// Deadline-, cancellation- and output-checking wrapper around an encoder
#[derive(Clone)]
pub struct GuardedEncoder {
    inner: Arc<dyn Encoder>,
    max_input_chars: usize,
}

impl std::fmt::Debug for GuardedEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedEncoder")
            .field("inner", &self.inner.name())
            .field("dimension", &self.inner.dimension())
            .field("max_input_chars", &self.max_input_chars)
            .finish()
    }
}

impl GuardedEncoder {
    /// Wrap `inner`; input longer than `max_input_chars` characters is cut.
    pub fn new(inner: Arc<dyn Encoder>, max_input_chars: usize) -> Self {
        GuardedEncoder {
            inner,
            max_input_chars,
        }
    }

    /// Wrapped encoder
    pub fn inner(&self) -> &Arc<dyn Encoder> {
        &self.inner
    }

    fn check_output(&self, vector: Vec<f32>) -> Result<Vec<f32>, EncodeError> {
        let expected = self.inner.dimension();
        if vector.len() != expected {
            return Err(EncodeError::InvalidOutput(format!(
                "expected {} dimensions, got {}",
                expected,
                vector.len()
            )));
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(EncodeError::InvalidOutput("non-finite component".to_string()));
        }
        if vector.iter().all(|x| *x == 0.0) {
            return Err(EncodeError::InvalidOutput("zero vector".to_string()));
        }
        Ok(vector)
    }
}

impl Encoder for GuardedEncoder {
    fn encode(&self, text: &str, ctx: &CallContext) -> Result<Vec<f32>, EncodeError> {
        let text = truncate_chars(text, self.max_input_chars);
        if text.trim().is_empty() {
            return Err(EncodeError::EmptyInput);
        }
        let vector = if self.inner.is_remote() {
            let inner = Arc::clone(&self.inner);
            let owned = text.to_string();
            let call_ctx = ctx.clone();
            run_guarded(ctx, "encode", move || inner.encode(&owned, &call_ctx)).map_err(
                |e| match e {
                    GuardError::TimedOut(waited) => EncodeError::Timeout(waited),
                    GuardError::Cancelled => EncodeError::Cancelled,
                    GuardError::Crashed(msg) => EncodeError::Unavailable(msg),
                },
            )??
        } else {
            if ctx.is_cancelled() {
                return Err(EncodeError::Cancelled);
            }
            self.inner.encode(text, ctx)?
        };
        self.check_output(vector)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_remote(&self) -> bool {
        self.inner.is_remote()
    }
}

/// Prefix of at most `max` characters
pub(crate) fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
