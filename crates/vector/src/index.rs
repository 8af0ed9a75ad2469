//! Published vector index and its single writer
//!
//! Mirrors the lexical side: an immutable view of `Arc`'d segments plus a
//! live map from document to `(segment, slot, version)`. Superseded and
//! removed vectors stay in their segments, invisible to queries, until
//! `compact` rewrites the live ones into a fresh segment.

use crate::distance::normalized;
use crate::segment::VectorSegment;
use ctse_core::{AnnConfig, CancellationToken, CtseError, CtseResult, DocumentId, Version};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Where a document's current embedding lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorLive {
    /// Owning segment
    pub segment_id: u64,
    /// Slot inside the segment
    pub slot: u32,
    /// Document version the embedding was computed from
    pub version: Version,
}

/// One nearest-neighbor hit
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    /// Document id
    pub doc_id: DocumentId,
    /// Cosine similarity, [-1, 1]
    pub similarity: f32,
    /// Version of the embedded document
    pub version: Version,
}

/// Outcome of `VectorWriter::upsert`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorChange {
    /// First embedding for the document
    Inserted,
    /// Replaced an older embedding
    Updated,
    /// A newer embedding is already indexed; input ignored
    Stale,
}

/// Summary statistics of a view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VectorStats {
    /// Documents with a live embedding
    pub live_vectors: usize,
    /// Segments
    pub segments: usize,
    /// Stored vectors across all segments, live or not
    pub segment_vectors: usize,
}

impl VectorStats {
    /// Vectors no longer reachable from the live map
    pub fn dead_entries(&self) -> usize {
        self.segment_vectors.saturating_sub(self.live_vectors)
    }
}

// ============================================================================
// VectorIndex
// ============================================================================

/// Immutable published view of all document embeddings
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dimension: usize,
    params: AnnConfig,
    segments: Vec<Arc<VectorSegment>>,
    live: Arc<HashMap<DocumentId, VectorLive>>,
}

impl VectorIndex {
    /// Empty index for `dimension`-sized embeddings
    pub fn new(dimension: usize, params: AnnConfig) -> Self {
        VectorIndex {
            dimension,
            params,
            segments: Vec::new(),
            live: Arc::new(HashMap::new()),
        }
    }

    /// Rebuild a view from persisted segments and live map.
    ///
    /// # Errors
    ///
    /// `Corruption` if a segment has another dimension or a live entry does
    /// not resolve to the document and version it names.
    pub fn from_parts(
        dimension: usize,
        params: AnnConfig,
        mut segments: Vec<Arc<VectorSegment>>,
        live: HashMap<DocumentId, VectorLive>,
    ) -> CtseResult<Self> {
        segments.sort_by_key(|s| s.segment_id());
        if let Some(bad) = segments.iter().find(|s| s.dimension() != dimension) {
            return Err(CtseError::Corruption(format!(
                "vector segment {} has dimension {}, index expects {}",
                bad.segment_id(),
                bad.dimension(),
                dimension
            )));
        }
        for (id, entry) in &live {
            let resolved = find_segment(&segments, entry.segment_id)
                .and_then(|s| s.entry(entry.slot))
                .filter(|e| &e.doc_id == id && e.version == entry.version);
            if resolved.is_none() {
                return Err(CtseError::Corruption(format!(
                    "vector entry for {} v{} not found in segment {} slot {}",
                    id, entry.version, entry.segment_id, entry.slot
                )));
            }
        }
        Ok(VectorIndex {
            dimension,
            params,
            segments,
            live: Arc::new(live),
        })
    }

    /// Embedding dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Graph parameters used for new segments
    pub fn params(&self) -> AnnConfig {
        self.params
    }

    /// Segments, oldest first
    pub fn segments(&self) -> &[Arc<VectorSegment>] {
        &self.segments
    }

    /// Live map
    pub fn live(&self) -> &HashMap<DocumentId, VectorLive> {
        &self.live
    }

    /// Documents with a live embedding
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// True if no document has an embedding
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// True if `id` has a live embedding
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.live.contains_key(id)
    }

    /// Version of `id`'s live embedding
    pub fn version_of(&self, id: &DocumentId) -> Option<Version> {
        self.live.get(id).map(|e| e.version)
    }

    /// Unit-length embedding of `id`
    pub fn get_vector(&self, id: &DocumentId) -> Option<&[f32]> {
        let entry = self.live.get(id)?;
        find_segment(&self.segments, entry.segment_id)?.vector(entry.slot)
    }

    /// View statistics
    pub fn stats(&self) -> VectorStats {
        VectorStats {
            live_vectors: self.live.len(),
            segments: self.segments.len(),
            segment_vectors: self.segments.iter().map(|s| s.len()).sum(),
        }
    }

    /// Live vector count per segment id
    pub fn live_per_segment(&self) -> BTreeMap<u64, usize> {
        let mut counts: BTreeMap<u64, usize> =
            self.segments.iter().map(|s| (s.segment_id(), 0)).collect();
        for entry in self.live.values() {
            *counts.entry(entry.segment_id).or_insert(0) += 1;
        }
        counts
    }

    /// The `k` live documents most similar to `query`.
    ///
    /// Sorted by similarity descending, ties broken by ascending document
    /// id. Each segment is over-fetched by its dead entry count so filtering
    /// out superseded vectors cannot starve the result.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` for a wrong-sized query, `InvalidEmbedding` for a
    /// zero or non-finite one, `Cancelled` if the token fires between
    /// segments.
    pub fn query(
        &self,
        query: &[f32],
        k: usize,
        cancel: &CancellationToken,
    ) -> CtseResult<Vec<VectorHit>> {
        if query.len() != self.dimension {
            return Err(CtseError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let query = normalized(query).ok_or_else(|| {
            CtseError::InvalidEmbedding("query vector is zero or non-finite".to_string())
        })?;
        if k == 0 || self.live.is_empty() {
            return Ok(Vec::new());
        }

        let live_counts = self.live_per_segment();
        let mut hits = Vec::new();
        for segment in &self.segments {
            cancel.check()?;
            let live = live_counts.get(&segment.segment_id()).copied().unwrap_or(0);
            if live == 0 {
                continue;
            }
            let fetch = k + (segment.len() - live.min(segment.len()));
            let ef = self.params.ef_search.max(fetch);
            for scored in segment.search(&query, fetch, ef) {
                let Some(entry) = segment.entry(scored.slot) else {
                    continue;
                };
                let current = self.live.get(&entry.doc_id).is_some_and(|l| {
                    l.segment_id == segment.segment_id() && l.slot == scored.slot
                });
                if current {
                    hits.push(VectorHit {
                        doc_id: entry.doc_id.clone(),
                        similarity: scored.score,
                        version: entry.version,
                    });
                }
            }
        }
        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Rewrite all live vectors into a single segment.
    pub fn compact(&self, segment_id: u64) -> CtseResult<VectorIndex> {
        let mut ids: Vec<&DocumentId> = self.live.keys().collect();
        ids.sort();
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let version = self.live[id].version;
            let vector = self.get_vector(id).ok_or_else(|| {
                CtseError::Corruption(format!("live vector for {} is unreadable", id))
            })?;
            items.push((id.clone(), version, vector.to_vec()));
        }
        let mut writer = VectorWriter::new(&VectorIndex::new(self.dimension, self.params), segment_id);
        writer.stage_sorted(items);
        writer.publish()
    }
}

fn find_segment(segments: &[Arc<VectorSegment>], segment_id: u64) -> Option<&Arc<VectorSegment>> {
    segments
        .binary_search_by_key(&segment_id, |s| s.segment_id())
        .ok()
        .map(|i| &segments[i])
}

// ============================================================================
// VectorWriter
// ============================================================================

/// Stages embedding changes and publishes the next view
#[derive(Debug)]
pub struct VectorWriter {
    dimension: usize,
    params: AnnConfig,
    segments: Vec<Arc<VectorSegment>>,
    live: Arc<HashMap<DocumentId, VectorLive>>,
    pending: BTreeMap<DocumentId, (Version, Vec<f32>)>,
    pending_segment_id: u64,
}

impl VectorWriter {
    /// Start a writer on top of `base`; `segment_id` is reserved for the new segment.
    pub fn new(base: &VectorIndex, segment_id: u64) -> Self {
        VectorWriter {
            dimension: base.dimension,
            params: base.params,
            segments: base.segments.clone(),
            live: Arc::clone(&base.live),
            pending: BTreeMap::new(),
            pending_segment_id: segment_id,
        }
    }

    /// Version of the embedding `id` would have after publish
    pub fn version_of(&self, id: &DocumentId) -> Option<Version> {
        self.pending
            .get(id)
            .map(|(v, _)| *v)
            .or_else(|| self.live.get(id).map(|e| e.version))
    }

    /// Stage an embedding for `id` at `version`.
    ///
    /// The vector is L2-normalized before storage.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` or `InvalidEmbedding`; nothing is staged then.
    pub fn upsert(
        &mut self,
        id: DocumentId,
        version: Version,
        vector: &[f32],
    ) -> CtseResult<VectorChange> {
        if vector.len() != self.dimension {
            return Err(CtseError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let unit = normalized(vector).ok_or_else(|| {
            CtseError::InvalidEmbedding(format!("embedding for {} is zero or non-finite", id))
        })?;
        let change = match self.version_of(&id) {
            Some(current) if current > version => return Ok(VectorChange::Stale),
            Some(_) => VectorChange::Updated,
            None => VectorChange::Inserted,
        };
        self.pending.insert(id, (version, unit));
        Ok(change)
    }

    /// Drop `id`'s embedding. Returns whether one existed.
    pub fn remove(&mut self, id: &DocumentId) -> bool {
        let staged = self.pending.remove(id).is_some();
        let live = if self.live.contains_key(id) {
            Arc::make_mut(&mut self.live).remove(id).is_some()
        } else {
            false
        };
        staged || live
    }

    fn stage_sorted(&mut self, items: Vec<(DocumentId, Version, Vec<f32>)>) {
        for (id, version, vector) in items {
            self.pending.insert(id, (version, vector));
        }
    }

    /// Number of staged embeddings
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Seal staged embeddings (slots in id order) and return the next view.
    pub fn publish(self) -> CtseResult<VectorIndex> {
        let mut segments = self.segments;
        let mut live = self.live;
        if !self.pending.is_empty() {
            let items: Vec<(DocumentId, Version, Vec<f32>)> = self
                .pending
                .into_iter()
                .map(|(id, (version, v))| (id, version, v))
                .collect();
            let segment = VectorSegment::build(self.pending_segment_id, self.dimension, self.params, items)?;
            let live_map = Arc::make_mut(&mut live);
            for (slot, entry) in segment.entries().iter().enumerate() {
                live_map.insert(
                    entry.doc_id.clone(),
                    VectorLive {
                        segment_id: segment.segment_id(),
                        slot: slot as u32,
                        version: entry.version,
                    },
                );
            }
            segments.push(Arc::new(segment));
        }
        Ok(VectorIndex {
            dimension: self.dimension,
            params: self.params,
            segments,
            live,
        })
    }
}
