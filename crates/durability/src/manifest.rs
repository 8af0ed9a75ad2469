//! Index manifest
//!
//! The manifest (`MANIFEST`) is the authoritative record of which document
//! versions a snapshot reflects:
//! - Lexical and vector segment lists, each with its version range
//! - Per-document state: indexed version, lexical location, and either the
//!   vector location or why the vector is missing
//! - Embedding dimension and the next segment id to assign
//!
//! Written once per snapshot directory; never modified in place.

use crate::snapshot::IndexSnapshot;
use chrono::{DateTime, Utc};
use ctse_core::codec;
use ctse_core::{CtseError, CtseResult, DocumentId, Version};
use ctse_search::LiveEntry;
use ctse_vector::VectorLive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Magic bytes for manifest files
const MANIFEST_MAGIC: &[u8; 4] = b"CMNF";
/// Current manifest version
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Manifest Data
// ============================================================================

/// Why a document has no vector, and how often embedding was attempted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingVector {
    /// Last failure reason
    pub reason: String,
    /// Failed embedding attempts so far
    pub attempts: u32,
}

/// Vector-side state of one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VectorState {
    /// Embedding for the current version is indexed
    Indexed(VectorLive),
    /// Document is served lexical-only until re-indexing succeeds
    Missing(MissingVector),
}

/// Manifest entry for one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentState {
    /// Current document version
    pub version: Version,
    /// Where its postings live
    pub lexical: LiveEntry,
    /// Vector status
    pub vector: VectorState,
}

/// Manifest entry for one segment file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDescriptor {
    /// Segment id
    pub segment_id: u64,
    /// File name inside the snapshot directory
    pub file: String,
    /// Entries stored in the segment
    pub doc_count: usize,
    /// Entries still live
    pub live_count: usize,
    /// Lowest covered document version
    pub min_version: Version,
    /// Highest covered document version
    pub max_version: Version,
}

/// Serializable description of an index snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    /// Format version
    pub format_version: u32,
    /// Snapshot generation
    pub generation: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Embedding dimension of every vector segment
    pub embedding_dimension: usize,
    /// Next segment id to assign
    pub next_segment_id: u64,
    /// Lexical segments, ascending id
    pub lexical_segments: Vec<SegmentDescriptor>,
    /// Vector segments, ascending id
    pub vector_segments: Vec<SegmentDescriptor>,
    /// Every live document
    pub documents: BTreeMap<DocumentId, DocumentState>,
}

impl IndexManifest {
    /// Describe `snapshot`.
    ///
    /// # Errors
    ///
    /// `Corruption` if a catalogued document has no lexical entry.
    pub fn describe(snapshot: &IndexSnapshot) -> CtseResult<Self> {
        let lexical = snapshot.lexical();
        let vectors = snapshot.vectors();

        let lex_live = lexical.live_per_segment();
        let lexical_segments = lexical
            .segments()
            .iter()
            .map(|s| {
                let (min_version, max_version) = s.version_range();
                SegmentDescriptor {
                    segment_id: s.segment_id(),
                    file: crate::paths::lexical_segment_name(s.segment_id()),
                    doc_count: s.doc_count(),
                    live_count: lex_live.get(&s.segment_id()).copied().unwrap_or(0),
                    min_version,
                    max_version,
                }
            })
            .collect();

        let vec_live = vectors.live_per_segment();
        let vector_segments = vectors
            .segments()
            .iter()
            .map(|s| {
                let (min_version, max_version) = s.version_range();
                SegmentDescriptor {
                    segment_id: s.segment_id(),
                    file: crate::paths::vector_segment_name(s.segment_id()),
                    doc_count: s.len(),
                    live_count: vec_live.get(&s.segment_id()).copied().unwrap_or(0),
                    min_version,
                    max_version,
                }
            })
            .collect();

        let mut documents = BTreeMap::new();
        for (id, entry) in snapshot.catalog().iter() {
            let lex = lexical.live().get(id).cloned().ok_or_else(|| {
                CtseError::Corruption(format!("document {} has no lexical entry", id))
            })?;
            let vector = match (vectors.live().get(id), &entry.missing_vector) {
                (Some(live), _) if live.version == entry.document.version => {
                    VectorState::Indexed(*live)
                }
                (_, Some(missing)) => VectorState::Missing(missing.clone()),
                (Some(_), None) => VectorState::Missing(MissingVector {
                    reason: "stale vector".to_string(),
                    attempts: 0,
                }),
                (None, None) => VectorState::Missing(MissingVector {
                    reason: "not embedded".to_string(),
                    attempts: 0,
                }),
            };
            documents.insert(
                id.clone(),
                DocumentState {
                    version: entry.document.version,
                    lexical: lex,
                    vector,
                },
            );
        }

        Ok(IndexManifest {
            format_version: MANIFEST_FORMAT_VERSION,
            generation: snapshot.generation(),
            created_at: Utc::now(),
            embedding_dimension: vectors.dimension(),
            next_segment_id: snapshot.next_segment_id(),
            lexical_segments,
            vector_segments,
            documents,
        })
    }

    /// Documents served lexical-only, ascending id
    pub fn missing_vectors(&self) -> impl Iterator<Item = (&DocumentId, &MissingVector)> {
        self.documents.iter().filter_map(|(id, state)| match &state.vector {
            VectorState::Missing(m) => Some((id, m)),
            VectorState::Indexed(_) => None,
        })
    }

    /// True if the snapshot reflects `id` at exactly `version`
    pub fn reflects(&self, id: &DocumentId, version: Version) -> bool {
        self.documents
            .get(id)
            .is_some_and(|state| state.version == version)
    }

    // ========================================================================
    // I/O
    // ========================================================================

    /// Write to `path` and fsync
    pub fn write_to_file(&self, path: &Path) -> CtseResult<()> {
        codec::write_synced(path, &codec::encode_framed(MANIFEST_MAGIC, MANIFEST_FORMAT_VERSION, self)?)
    }

    /// Read and verify a manifest file
    pub fn read_from_file(path: &Path) -> CtseResult<Self> {
        codec::read_framed(path, MANIFEST_MAGIC, MANIFEST_FORMAT_VERSION)
    }
}
