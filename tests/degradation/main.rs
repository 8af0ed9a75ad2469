//! Integration tests for partial failure.
//!
//! An unavailable or slow encoder, a failing generator and caller
//! cancellation must each leave the engine answering with what it has
//! (or, for cancellation, answering nothing) and saying so.

#[path = "../common/mod.rs"]
mod common;

mod encoder_faults;
mod generator_faults;
