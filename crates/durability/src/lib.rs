//! Index Store for CTSE
//!
//! This crate handles everything that touches disk:
//!
//! - `IndexSnapshot`: a consistent view of the lexical index, the vector
//!   index and the document catalog
//! - `IndexManifest`: which document versions a snapshot reflects, and which
//!   documents are served lexical-only
//! - `IndexStore`: atomic snapshot swap (single writer, many readers) and
//!   crash-consistent persistence through staging directories

#![warn(missing_docs)]

pub mod manifest;
pub mod paths;
pub mod snapshot;
pub mod store;

pub use manifest::{
    DocumentState, IndexManifest, MissingVector, SegmentDescriptor, VectorState,
    MANIFEST_FORMAT_VERSION,
};
pub use paths::StorePaths;
pub use snapshot::{Catalog, CatalogEntry, IndexSnapshot};
pub use store::{IndexStore, PersistOutcome, WriteGuard};
