//! Integration tests for hybrid search.
//!
//! End-to-end through `Engine`: ingest raw trial records, then check the
//! fused ranking against what each path alone would produce.

#[path = "../common/mod.rs"]
mod common;

mod fusion;
mod ingestion;
mod ranking;
