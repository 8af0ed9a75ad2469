//! Published lexical index and its single writer
//!
//! A `LexicalIndex` is an immutable, cheaply clonable view: a list of
//! `Arc`'d segments plus a live map naming, for each document, the one
//! segment (and version) whose postings count. Everything a query needs,
//! including BM25 statistics, is inside the view, so a query never sees a
//! half-applied update.
//!
//! `LexicalWriter` stages changes against a base view and produces the
//! next view on `publish`. Readers of the old view are unaffected.
//!
//! Removal is a tombstone: the document leaves the live map and the global
//! statistics immediately, while its postings stay in their segment until
//! `compact` rewrites the segments.

use crate::normalizer::AnalyzedDocument;
use crate::scorer::{Scorer, ScoringContext};
use crate::segment::{LexicalSegment, Posting, SegmentBuilder};
use ctse_core::{CancellationToken, CtseError, CtseResult, DocumentId, Version};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

// ============================================================================
// Types
// ============================================================================

/// Where the current version of a document lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveEntry {
    /// Segment holding the document's current postings
    pub segment_id: u64,
    /// Indexed version
    pub version: Version,
    /// Token count
    pub length: u32,
    /// Content fingerprint
    pub fingerprint: u64,
}

/// One lexical hit
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalHit {
    /// Document id
    pub doc_id: DocumentId,
    /// BM25 score
    pub score: f32,
    /// Indexed version
    pub version: Version,
}

/// Outcome of `LexicalWriter::add_or_update`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexicalChange {
    /// New document
    Inserted,
    /// Previous version's postings replaced
    Updated,
    /// Same version and content already indexed; nothing changed
    Unchanged,
    /// A newer version is already indexed; input ignored
    Stale,
}

/// Summary statistics of a view
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LexicalStats {
    /// Live documents
    pub live_docs: usize,
    /// Segments
    pub segments: usize,
    /// Document entries across all segments, live or not
    pub segment_docs: usize,
    /// Distinct live terms
    pub terms: usize,
    /// Total live token count
    pub total_len: u64,
}

impl LexicalStats {
    /// Dead (tombstoned or superseded) segment entries
    pub fn dead_entries(&self) -> usize {
        self.segment_docs.saturating_sub(self.live_docs)
    }
}

// ============================================================================
// LexicalIndex
// ============================================================================

/// Immutable published view of the inverted index
#[derive(Debug, Clone, Default)]
pub struct LexicalIndex {
    segments: Vec<Arc<LexicalSegment>>,
    live: Arc<HashMap<DocumentId, LiveEntry>>,
    doc_freqs: Arc<HashMap<String, u32>>,
    total_len: u64,
}

impl LexicalIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a view from persisted segments and live map.
    ///
    /// # Errors
    ///
    /// `Corruption` if a live entry names a missing segment or a version the
    /// segment does not hold.
    pub fn from_parts(
        mut segments: Vec<Arc<LexicalSegment>>,
        live: HashMap<DocumentId, LiveEntry>,
    ) -> CtseResult<Self> {
        segments.sort_by_key(|s| s.segment_id());
        let mut doc_freqs: HashMap<String, u32> = HashMap::new();
        let mut total_len = 0u64;
        for (id, entry) in &live {
            let segment = find_segment(&segments, entry.segment_id).ok_or_else(|| {
                CtseError::Corruption(format!(
                    "document {} references missing lexical segment {}",
                    id, entry.segment_id
                ))
            })?;
            let meta = segment
                .doc(id)
                .filter(|m| m.version == entry.version)
                .ok_or_else(|| {
                    CtseError::Corruption(format!(
                        "lexical segment {} does not hold {} v{}",
                        entry.segment_id, id, entry.version
                    ))
                })?;
            for term in &meta.terms {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            total_len += meta.length as u64;
        }
        Ok(LexicalIndex {
            segments,
            live: Arc::new(live),
            doc_freqs: Arc::new(doc_freqs),
            total_len,
        })
    }

    /// Segments, oldest first
    pub fn segments(&self) -> &[Arc<LexicalSegment>] {
        &self.segments
    }

    /// Live map
    pub fn live(&self) -> &HashMap<DocumentId, LiveEntry> {
        &self.live
    }

    /// Number of live documents
    pub fn doc_count(&self) -> usize {
        self.live.len()
    }

    /// Whether a document is live
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.live.contains_key(id)
    }

    /// Indexed version of a live document
    pub fn version_of(&self, id: &DocumentId) -> Option<Version> {
        self.live.get(id).map(|e| e.version)
    }

    /// Live document frequency of a term
    pub fn doc_freq(&self, term: &str) -> u32 {
        self.doc_freqs.get(term).copied().unwrap_or(0)
    }

    /// Average live document length
    pub fn avg_doc_len(&self) -> f32 {
        if self.live.is_empty() {
            0.0
        } else {
            self.total_len as f32 / self.live.len() as f32
        }
    }

    /// Summary statistics
    pub fn stats(&self) -> LexicalStats {
        LexicalStats {
            live_docs: self.live.len(),
            segments: self.segments.len(),
            segment_docs: self.segments.iter().map(|s| s.doc_count()).sum(),
            terms: self.doc_freqs.len(),
            total_len: self.total_len,
        }
    }

    /// Live documents per segment id
    pub fn live_per_segment(&self) -> BTreeMap<u64, usize> {
        let mut out = BTreeMap::new();
        for entry in self.live.values() {
            *out.entry(entry.segment_id).or_insert(0) += 1;
        }
        out
    }

    /// Live postings of a term across segments, sorted by document id.
    ///
    /// Field ids inside each posting refer to the segment it came from.
    pub fn postings(&self, term: &str) -> Vec<&Posting> {
        let mut out: Vec<&Posting> = Vec::new();
        for segment in &self.segments {
            for posting in segment.postings(term) {
                if self.is_live_in(&posting.doc_id, segment.segment_id()) {
                    out.push(posting);
                }
            }
        }
        out.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
        out
    }

    fn is_live_in(&self, id: &DocumentId, segment_id: u64) -> bool {
        matches!(self.live.get(id), Some(e) if e.segment_id == segment_id)
    }

    /// Term frequencies of a live document, in term order
    pub fn term_frequencies(&self, id: &DocumentId) -> Vec<(&str, u32)> {
        let Some(entry) = self.live.get(id) else {
            return Vec::new();
        };
        let Some(segment) = find_segment(&self.segments, entry.segment_id) else {
            return Vec::new();
        };
        let Some(meta) = segment.doc(id).filter(|m| m.version == entry.version) else {
            return Vec::new();
        };
        meta.terms
            .iter()
            .filter_map(|term| {
                let postings = segment.postings(term);
                postings
                    .binary_search_by(|p| p.doc_id.cmp(id))
                    .ok()
                    .map(|i| (term.as_str(), postings[i].term_frequency))
            })
            .collect()
    }

    /// Live occurrences of a term across all documents
    pub fn collection_frequency(&self, term: &str) -> u64 {
        self.postings(term)
            .iter()
            .map(|p| p.term_frequency as u64)
            .sum()
    }

    /// BM25-score live documents matching any of `terms`.
    ///
    /// Results are sorted by score descending, ties broken by ascending
    /// document id, and truncated to `limit`. Cancellation is checked
    /// between segments.
    pub fn query(
        &self,
        terms: &[String],
        scorer: &dyn Scorer,
        limit: usize,
        cancel: &CancellationToken,
    ) -> CtseResult<Vec<LexicalHit>> {
        let weighted: Vec<(String, f32)> = terms.iter().map(|t| (t.clone(), 1.0)).collect();
        self.query_weighted(&weighted, scorer, limit, cancel)
    }

    /// Like [`LexicalIndex::query`], with each term's BM25 contribution
    /// scaled by its weight. A term listed twice counts once, at its
    /// highest weight; non-positive weights are ignored.
    pub fn query_weighted(
        &self,
        terms: &[(String, f32)],
        scorer: &dyn Scorer,
        limit: usize,
        cancel: &CancellationToken,
    ) -> CtseResult<Vec<LexicalHit>> {
        if terms.is_empty() || self.live.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let ctx = ScoringContext {
            total_docs: self.live.len(),
            avg_doc_len: self.avg_doc_len(),
        };

        let mut unique: Vec<(&str, f32)> = terms
            .iter()
            .filter(|(_, w)| *w > 0.0)
            .map(|(t, w)| (t.as_str(), *w))
            .collect();
        unique.sort_by(|a, b| a.0.cmp(b.0).then_with(|| b.1.total_cmp(&a.1)));
        unique.dedup_by(|later, earlier| later.0 == earlier.0);

        let mut scores: HashMap<&DocumentId, f32> = HashMap::new();
        for segment in &self.segments {
            cancel.check()?;
            for &(term, weight) in &unique {
                let df = self.doc_freq(term);
                if df == 0 {
                    continue;
                }
                let idf = ctx.idf(df);
                for posting in segment.postings(term) {
                    let Some(entry) = self.live.get(&posting.doc_id) else {
                        continue;
                    };
                    if entry.segment_id != segment.segment_id() {
                        continue;
                    }
                    let s = scorer.score_term(posting, segment, entry.length, idf, &ctx);
                    *scores.entry(&posting.doc_id).or_insert(0.0) += s * weight;
                }
            }
        }

        let mut hits: Vec<LexicalHit> = scores
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .filter_map(|(id, score)| {
                self.live.get(id).map(|e| LexicalHit {
                    doc_id: id.clone(),
                    score,
                    version: e.version,
                })
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    /// Rewrite all live postings into one segment, dropping tombstoned and
    /// superseded entries and rebuilding global statistics.
    ///
    /// Query results over the returned view equal those over `self`.
    pub fn compact(&self, segment_id: u64) -> LexicalIndex {
        let mut builder = SegmentBuilder::new();
        for segment in &self.segments {
            let id = segment.segment_id();
            for doc in segment.reconstruct(|doc_id, meta| {
                matches!(self.live.get(doc_id), Some(e) if e.segment_id == id && e.version == meta.version)
            }) {
                builder.insert(doc);
            }
        }
        let segment = builder.build(segment_id);
        let mut doc_freqs: HashMap<String, u32> = HashMap::new();
        for term in segment.terms() {
            doc_freqs.insert(term.to_string(), segment.postings(term).len() as u32);
        }
        let live: HashMap<DocumentId, LiveEntry> = self
            .live
            .iter()
            .map(|(id, e)| {
                (
                    id.clone(),
                    LiveEntry {
                        segment_id,
                        ..e.clone()
                    },
                )
            })
            .collect();
        let segments = if segment.doc_count() == 0 {
            Vec::new()
        } else {
            vec![Arc::new(segment)]
        };
        LexicalIndex {
            segments,
            live: Arc::new(live),
            doc_freqs: Arc::new(doc_freqs),
            total_len: self.total_len,
        }
    }
}

fn find_segment(segments: &[Arc<LexicalSegment>], segment_id: u64) -> Option<&Arc<LexicalSegment>> {
    segments
        .binary_search_by_key(&segment_id, |s| s.segment_id())
        .ok()
        .map(|i| &segments[i])
}

// ============================================================================
// LexicalWriter
// ============================================================================

/// Stages lexical changes and publishes the next immutable view
///
/// Staged documents live in a pending builder under a reserved segment id;
/// `publish` seals it. Live map and statistics are maintained eagerly, with
/// copy-on-write so the base view stays untouched.
#[derive(Debug)]
pub struct LexicalWriter {
    segments: Vec<Arc<LexicalSegment>>,
    live: Arc<HashMap<DocumentId, LiveEntry>>,
    doc_freqs: Arc<HashMap<String, u32>>,
    total_len: u64,
    pending: SegmentBuilder,
    pending_segment_id: u64,
}

impl LexicalWriter {
    /// Start a writer on top of `base`; `segment_id` is reserved for the new segment.
    pub fn new(base: &LexicalIndex, segment_id: u64) -> Self {
        LexicalWriter {
            segments: base.segments.clone(),
            live: Arc::clone(&base.live),
            doc_freqs: Arc::clone(&base.doc_freqs),
            total_len: base.total_len,
            pending: SegmentBuilder::new(),
            pending_segment_id: segment_id,
        }
    }

    /// Currently indexed version (including staged changes)
    pub fn version_of(&self, id: &DocumentId) -> Option<Version> {
        self.live.get(id).map(|e| e.version)
    }

    /// Index a document, first removing the postings of its previous version.
    pub fn add_or_update(&mut self, doc: AnalyzedDocument) -> LexicalChange {
        let change = match self.live.get(&doc.id) {
            Some(e) if e.version == doc.version && e.fingerprint == doc.fingerprint => {
                return LexicalChange::Unchanged
            }
            Some(e) if e.version > doc.version => return LexicalChange::Stale,
            Some(_) => LexicalChange::Updated,
            None => LexicalChange::Inserted,
        };
        if change == LexicalChange::Updated {
            self.remove(&doc.id);
        }

        let length = doc.length();
        let mut terms: Vec<&str> = doc
            .fields
            .iter()
            .flat_map(|f| f.terms.iter().map(|(t, _)| t.as_str()))
            .collect();
        terms.sort_unstable();
        terms.dedup();
        let doc_freqs = Arc::make_mut(&mut self.doc_freqs);
        for term in terms {
            *doc_freqs.entry(term.to_string()).or_insert(0) += 1;
        }
        self.total_len += length as u64;
        Arc::make_mut(&mut self.live).insert(
            doc.id.clone(),
            LiveEntry {
                segment_id: self.pending_segment_id,
                version: doc.version,
                length,
                fingerprint: doc.fingerprint,
            },
        );
        self.pending.insert(doc);
        change
    }

    /// Tombstone a document. Returns whether it was live.
    pub fn remove(&mut self, id: &DocumentId) -> bool {
        if !self.live.contains_key(id) {
            return false;
        }
        let Some(entry) = Arc::make_mut(&mut self.live).remove(id) else {
            return false;
        };
        let terms: Vec<String> = if entry.segment_id == self.pending_segment_id {
            self.pending
                .remove(id)
                .map(|doc| {
                    let mut terms: Vec<String> = doc
                        .fields
                        .iter()
                        .flat_map(|f| f.terms.iter().map(|(t, _)| t.clone()))
                        .collect();
                    terms.sort_unstable();
                    terms.dedup();
                    terms
                })
                .unwrap_or_default()
        } else {
            find_segment(&self.segments, entry.segment_id)
                .and_then(|s| s.doc(id))
                .map(|meta| meta.terms.clone())
                .unwrap_or_default()
        };
        let doc_freqs = Arc::make_mut(&mut self.doc_freqs);
        for term in terms {
            if let Some(df) = doc_freqs.get_mut(&term) {
                *df = df.saturating_sub(1);
                if *df == 0 {
                    doc_freqs.remove(&term);
                }
            }
        }
        self.total_len = self.total_len.saturating_sub(entry.length as u64);
        true
    }

    /// Number of staged documents
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Seal staged documents and return the next view.
    ///
    /// No segment is added when nothing is staged.
    pub fn publish(self) -> LexicalIndex {
        let mut segments = self.segments;
        if !self.pending.is_empty() {
            segments.push(Arc::new(self.pending.build(self.pending_segment_id)));
        }
        LexicalIndex {
            segments,
            live: self.live,
            doc_freqs: self.doc_freqs,
            total_len: self.total_len,
        }
    }
}
