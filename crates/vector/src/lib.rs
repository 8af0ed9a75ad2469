//! Vector indexing for CTSE
//!
//! Document embeddings are stored in sealed segments, each carrying an HNSW
//! graph for approximate cosine search. `VectorIndex` is the immutable
//! published view; `VectorWriter` stages the next one.

#![warn(missing_docs)]

pub mod distance;
mod hnsw;
pub mod index;
pub mod segment;

pub use distance::{cosine_similarity, dot_product, l2_norm, normalized};
pub use index::{VectorChange, VectorHit, VectorIndex, VectorLive, VectorStats, VectorWriter};
pub use segment::{VectorEntry, VectorSegment};
