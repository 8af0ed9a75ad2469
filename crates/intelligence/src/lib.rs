//! External model boundaries for CTSE
//!
//! Everything that leaves the process goes through this crate:
//! - `Encoder`: text to a fixed-dimension embedding (`HashingEncoder` locally,
//!   `ApiEncoder` over HTTP)
//! - `Generator`: prompt to text under a token budget (`ApiGenerator`)
//! - `run_guarded`: deadline and cancellation enforcement for blocking calls
//! - `Reranker`: the Re-rank/Generation Adapter over fused results
//! - `QueryExpander`: condition extraction for query expansion
//! - `QueryTranslator`: English rendering of foreign-language queries
//!
//! HTTP calls need the `api` feature; without it the API clients report
//! themselves unavailable.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod encoder;
pub mod expand;
pub mod generator;
pub mod guard;
pub mod llm_client;
pub mod rerank;
pub mod translate;

pub use encoder::{ApiEncoder, EncodeError, Encoder, GuardedEncoder, HashingEncoder};
pub use expand::{GenerativeExpander, QueryExpander};
pub use generator::{ApiGenerator, GenerationError, GenerationRequest, Generator, GuardedGenerator};
pub use guard::{run_guarded, GuardError};
pub use rerank::{GenerativeReranker, RerankCandidate, RerankError, RerankOutcome, RerankScore, Reranker};
pub use translate::{GenerativeTranslator, QueryTranslator};
