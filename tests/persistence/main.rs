//! Integration tests for index persistence.
//!
//! These tests exercise the full lifecycle (open -> ingest -> persist ->
//! reopen) against a real data directory.

#[path = "../common/mod.rs"]
mod common;

mod crash_consistency;
mod lifecycle;
