//! Core types and traits for the CTSE retrieval core
//!
//! This crate defines the foundational types used throughout the system:
//! - Document / DocumentId / RawRecord: the canonical document schema
//! - CtseError: the error taxonomy
//! - CtseConfig: the validated configuration record
//! - CallContext / CancellationToken: deadlines and cancellation for blocking calls
//! - Search types: SearchOptions, ScoredResult, SearchResponse, QueryState
//! - codec: framed, checksummed on-disk encoding

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cancel;
pub mod codec;
pub mod config;
pub mod document;
pub mod error;
pub mod search_types;

pub use cancel::{CallContext, CancellationToken};
pub use config::{
    AnnConfig, Bm25Config, CompactionConfig, CtseConfig, EncoderConfig, ExpansionConfig,
    FusionConfig, IngestConfig, ModelConfig, RerankConfig, ScoreNormalization, CONFIG_FILE_NAME,
};
pub use document::{Document, DocumentId, Field, RawRecord, Version};
pub use error::{CtseError, CtseResult};
pub use search_types::{
    DegradationReport, FusionWeights, QueryState, QueryStats, ScoredResult, SearchOptions,
    SearchResponse,
};
