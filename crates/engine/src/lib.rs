//! Ingestion pipeline and Query Processor for CTSE
//!
//! This crate ties the lower layers together behind [`Engine`]:
//! - ingestion: normalize, embed and index records on a worker pool, then
//!   commit one snapshot under the store's single-writer lock
//! - search: the per-query state machine over one consistent snapshot,
//!   with parallel lexical/vector sub-queries, fusion and optional re-rank
//! - maintenance: compaction and re-indexing of lexical-only documents
//! - relevance feedback over a result list
//!
//! Library code never installs a tracing subscriber; events use the
//! `ctse::engine` and `ctse::query` targets.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod builder;
mod engine;
mod feedback;
mod ingest;
mod maintenance;
mod query;

pub use builder::EngineBuilder;
pub use engine::{Engine, EngineStats};
pub use feedback::Feedback;
pub use ingest::{IngestOutcome, IngestReport, IngestStatus, RejectedRecord};
pub use maintenance::{CompactionReport, ReindexReport};
