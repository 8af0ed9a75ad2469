//! Sealed vector segments
//!
//! A segment stores unit-length vectors for a batch of documents in a flat
//! row-major buffer, addressed by slot, together with the HNSW graph built
//! over them. Slots follow ascending document id.
//!
//! ## File Format
//!
//! ```text
//! magic "CVEC" | version u32 | crc32 u32 | len u64 | MessagePack(VectorSegment)
//! ```

use crate::hnsw::{brute_force, HnswGraph, ScoredSlot, VectorSlab};
use ctse_core::codec;
use ctse_core::{AnnConfig, CtseError, CtseResult, DocumentId, Version};
use serde::{Deserialize, Serialize};
use std::path::Path;

const SEGMENT_MAGIC: &[u8; 4] = b"CVEC";
const SEGMENT_VERSION: u32 = 1;

/// Document stored at a slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorEntry {
    /// Document id
    pub doc_id: DocumentId,
    /// Version the embedding was computed from
    pub version: Version,
}

/// An immutable, searchable set of document embeddings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorSegment {
    segment_id: u64,
    dimension: usize,
    params: AnnConfig,
    entries: Vec<VectorEntry>,
    vectors: Vec<f32>,
    graph: HnswGraph,
    min_version: Version,
    max_version: Version,
}

impl VectorSegment {
    /// Seal a segment from `(id, version, unit vector)` items sorted by id.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if any vector has the wrong length.
    pub fn build(
        segment_id: u64,
        dimension: usize,
        params: AnnConfig,
        items: Vec<(DocumentId, Version, Vec<f32>)>,
    ) -> CtseResult<Self> {
        let mut entries = Vec::with_capacity(items.len());
        let mut vectors = Vec::with_capacity(items.len() * dimension);
        let mut min_version = Version::MAX;
        let mut max_version = 0;
        for (doc_id, version, vector) in items {
            if vector.len() != dimension {
                return Err(CtseError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            debug_assert!(entries.last().map_or(true, |e: &VectorEntry| e.doc_id < doc_id));
            min_version = min_version.min(version);
            max_version = max_version.max(version);
            vectors.extend_from_slice(&vector);
            entries.push(VectorEntry { doc_id, version });
        }
        if entries.is_empty() {
            min_version = 0;
        }
        let graph = HnswGraph::build(&params, VectorSlab::new(&vectors, dimension));
        Ok(VectorSegment {
            segment_id,
            dimension,
            params,
            entries,
            vectors,
            graph,
            min_version,
            max_version,
        })
    }

    /// Segment id
    pub fn segment_id(&self) -> u64 {
        self.segment_id
    }

    /// Vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the segment holds no vectors
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored documents in slot order
    pub fn entries(&self) -> &[VectorEntry] {
        &self.entries
    }

    /// Document at `slot`
    pub fn entry(&self, slot: u32) -> Option<&VectorEntry> {
        self.entries.get(slot as usize)
    }

    /// Unit vector at `slot`
    pub fn vector(&self, slot: u32) -> Option<&[f32]> {
        if (slot as usize) < self.entries.len() {
            Some(self.slab().get(slot))
        } else {
            None
        }
    }

    /// Slot of a document
    pub fn slot_of(&self, id: &DocumentId) -> Option<u32> {
        self.entries
            .binary_search_by(|e| e.doc_id.cmp(id))
            .ok()
            .map(|i| i as u32)
    }

    /// `(min, max)` version of the stored embeddings
    pub fn version_range(&self) -> (Version, Version) {
        (self.min_version, self.max_version)
    }

    fn slab(&self) -> VectorSlab<'_> {
        VectorSlab::new(&self.vectors, self.dimension)
    }

    /// Top `k` slots by cosine similarity to a unit-length query.
    ///
    /// Segments no larger than the beam are scanned exactly.
    pub(crate) fn search(&self, query: &[f32], k: usize, ef: usize) -> Vec<ScoredSlot> {
        if self.entries.len() <= ef.max(k) {
            brute_force(query, k, self.slab())
        } else {
            self.graph.search(query, k, ef, self.slab())
        }
    }

    // ========================================================================
    // I/O
    // ========================================================================

    /// Encode with header and checksum
    pub fn to_bytes(&self) -> CtseResult<Vec<u8>> {
        codec::encode_framed(SEGMENT_MAGIC, SEGMENT_VERSION, self)
    }

    /// Decode and verify
    pub fn from_bytes(buf: &[u8]) -> CtseResult<Self> {
        let segment: VectorSegment = codec::decode_framed(SEGMENT_MAGIC, SEGMENT_VERSION, buf)?;
        segment.check()?;
        Ok(segment)
    }

    /// Write to `path` and fsync
    pub fn write_to_file(&self, path: &Path) -> CtseResult<()> {
        codec::write_synced(path, &self.to_bytes()?)
    }

    /// Read and verify a segment file
    pub fn read_from_file(path: &Path) -> CtseResult<Self> {
        let segment: VectorSegment = codec::read_framed(path, SEGMENT_MAGIC, SEGMENT_VERSION)?;
        segment.check()?;
        Ok(segment)
    }

    fn check(&self) -> CtseResult<()> {
        if self.vectors.len() != self.entries.len() * self.dimension
            || self.graph.len() != self.entries.len()
        {
            return Err(CtseError::Corruption(format!(
                "vector segment {} has inconsistent sizes",
                self.segment_id
            )));
        }
        Ok(())
    }
}
