//! Immutable lexical segments
//!
//! A segment is built once from a batch of analyzed documents and never
//! mutated afterwards. Updates and removals are expressed by the index's
//! live map pointing elsewhere (or nowhere); compaction rewrites the live
//! entries of many segments into one.
//!
//! ## File Format
//!
//! ```text
//! magic "CLEX" | version u32 | crc32 u32 | len u64 | MessagePack(LexicalSegment)
//! ```
//!
//! Each segment describes the document-version range it covers.

use crate::normalizer::{AnalyzedDocument, AnalyzedField};
use ctse_core::codec;
use ctse_core::{CtseResult, DocumentId, Version};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Magic bytes for lexical segment files
const SEGMENT_MAGIC: &[u8; 4] = b"CLEX";
/// Current format version
const SEGMENT_VERSION: u32 = 1;

// ============================================================================
// Postings
// ============================================================================

/// Positions of a term inside one field
///
/// `field` indexes the owning segment's field table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPositions {
    /// Segment-local field id
    pub field: u16,
    /// Token positions within the field
    pub positions: Vec<u32>,
}

/// One `(term, document)` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// Document id
    pub doc_id: DocumentId,
    /// Occurrences across all fields
    pub term_frequency: u32,
    /// Per-field positions
    pub field_positions: Vec<FieldPositions>,
}

/// Per-document metadata kept in a segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentDoc {
    /// Version the postings were built from
    pub version: Version,
    /// Token count (BM25 document length)
    pub length: u32,
    /// Content fingerprint of the source document
    pub fingerprint: u64,
    /// Distinct terms, sorted (forward index for stats maintenance)
    pub terms: Vec<String>,
}

// ============================================================================
// LexicalSegment
// ============================================================================

/// An immutable, searchable segment of the inverted index.
///
/// Posting lists are sorted by document id and hold at most one entry per
/// document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalSegment {
    segment_id: u64,
    fields: Vec<String>,
    postings: BTreeMap<String, Vec<Posting>>,
    docs: BTreeMap<DocumentId, SegmentDoc>,
    min_version: Version,
    max_version: Version,
}

impl LexicalSegment {
    /// Segment id (monotonic, shared id space with vector segments)
    pub fn segment_id(&self) -> u64 {
        self.segment_id
    }

    /// Field name of a segment-local field id
    pub fn field_name(&self, field: u16) -> Option<&str> {
        self.fields.get(field as usize).map(String::as_str)
    }

    /// Field table
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Posting list for a term (empty if absent)
    pub fn postings(&self, term: &str) -> &[Posting] {
        self.postings.get(term).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Terms in sorted order
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.postings.keys().map(String::as_str)
    }

    /// Metadata of a document held by this segment
    pub fn doc(&self, id: &DocumentId) -> Option<&SegmentDoc> {
        self.docs.get(id)
    }

    /// All documents held by this segment, in id order
    pub fn docs(&self) -> impl Iterator<Item = (&DocumentId, &SegmentDoc)> {
        self.docs.iter()
    }

    /// Number of documents (live or not) in this segment
    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    /// Number of distinct terms
    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    /// Inclusive document-version range covered
    pub fn version_range(&self) -> (Version, Version) {
        (self.min_version, self.max_version)
    }

    /// Rebuild the analyzed form of the documents accepted by `keep`.
    ///
    /// Used by compaction; field order follows the segment's field table.
    pub fn reconstruct<F>(&self, keep: F) -> Vec<AnalyzedDocument>
    where
        F: Fn(&DocumentId, &SegmentDoc) -> bool,
    {
        let mut per_doc: BTreeMap<&DocumentId, BTreeMap<u16, Vec<(String, u32)>>> =
            BTreeMap::new();
        for (id, meta) in &self.docs {
            if keep(id, meta) {
                per_doc.insert(id, BTreeMap::new());
            }
        }
        for (term, list) in &self.postings {
            for posting in list {
                if let Some(fields) = per_doc.get_mut(&posting.doc_id) {
                    for fp in &posting.field_positions {
                        let terms = fields.entry(fp.field).or_default();
                        terms.extend(fp.positions.iter().map(|&p| (term.clone(), p)));
                    }
                }
            }
        }
        per_doc
            .into_iter()
            .filter_map(|(id, fields)| {
                let meta = self.docs.get(id)?;
                let fields = fields
                    .into_iter()
                    .map(|(field, mut terms)| {
                        terms.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
                        AnalyzedField {
                            name: self.fields[field as usize].clone(),
                            terms,
                        }
                    })
                    .collect();
                Some(AnalyzedDocument {
                    id: id.clone(),
                    version: meta.version,
                    fingerprint: meta.fingerprint,
                    fields,
                })
            })
            .collect()
    }

    /// Encode into the framed file format.
    pub fn to_bytes(&self) -> CtseResult<Vec<u8>> {
        codec::encode_framed(SEGMENT_MAGIC, SEGMENT_VERSION, self)
    }

    /// Decode from the framed file format.
    pub fn from_bytes(buf: &[u8]) -> CtseResult<Self> {
        codec::decode_framed(SEGMENT_MAGIC, SEGMENT_VERSION, buf)
    }

    /// Write to `path` and fsync.
    pub fn write_to_file(&self, path: &Path) -> CtseResult<()> {
        codec::write_synced(path, &self.to_bytes()?)
    }

    /// Load from `path`.
    pub fn read_from_file(path: &Path) -> CtseResult<Self> {
        codec::read_framed(path, SEGMENT_MAGIC, SEGMENT_VERSION)
    }
}

// ============================================================================
// SegmentBuilder
// ============================================================================

/// Mutable staging area that becomes a `LexicalSegment` on `build`
#[derive(Debug, Clone, Default)]
pub struct SegmentBuilder {
    docs: BTreeMap<DocumentId, AnalyzedDocument>,
}

impl SegmentBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a document, replacing any staged document with the same id
    pub fn insert(&mut self, doc: AnalyzedDocument) -> Option<AnalyzedDocument> {
        self.docs.insert(doc.id.clone(), doc)
    }

    /// Drop a staged document
    pub fn remove(&mut self, id: &DocumentId) -> Option<AnalyzedDocument> {
        self.docs.remove(id)
    }

    /// Staged document
    pub fn get(&self, id: &DocumentId) -> Option<&AnalyzedDocument> {
        self.docs.get(id)
    }

    /// Number of staged documents
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Whether nothing is staged
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Seal staged documents into an immutable segment.
    pub fn build(self, segment_id: u64) -> LexicalSegment {
        let mut fields: Vec<String> = Vec::new();
        let mut field_ids: HashMap<String, u16> = HashMap::new();
        let mut postings: BTreeMap<String, Vec<Posting>> = BTreeMap::new();
        let mut docs = BTreeMap::new();
        let mut min_version = Version::MAX;
        let mut max_version = 0;

        // BTreeMap iteration is id-ordered, so every posting list comes out sorted.
        for (id, doc) in self.docs {
            let mut per_term: BTreeMap<String, Vec<FieldPositions>> = BTreeMap::new();
            for field in &doc.fields {
                let field_id = *field_ids.entry(field.name.clone()).or_insert_with(|| {
                    fields.push(field.name.clone());
                    (fields.len() - 1) as u16
                });
                for (term, pos) in &field.terms {
                    let entries = per_term.entry(term.clone()).or_default();
                    match entries.last_mut() {
                        Some(fp) if fp.field == field_id => fp.positions.push(*pos),
                        _ => entries.push(FieldPositions {
                            field: field_id,
                            positions: vec![*pos],
                        }),
                    }
                }
            }

            let terms: Vec<String> = per_term.keys().cloned().collect();
            for (term, field_positions) in per_term {
                let term_frequency = field_positions
                    .iter()
                    .map(|fp| fp.positions.len() as u32)
                    .sum();
                postings.entry(term).or_default().push(Posting {
                    doc_id: id.clone(),
                    term_frequency,
                    field_positions,
                });
            }

            min_version = min_version.min(doc.version);
            max_version = max_version.max(doc.version);
            docs.insert(
                id,
                SegmentDoc {
                    version: doc.version,
                    length: doc.length(),
                    fingerprint: doc.fingerprint,
                    terms,
                },
            );
        }

        if docs.is_empty() {
            min_version = 0;
        }
        LexicalSegment {
            segment_id,
            fields,
            postings,
            docs,
            min_version,
            max_version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::analyze;
    use ctse_core::Document;

    fn doc(id: &str, version: Version, title: &str, summary: &str) -> AnalyzedDocument {
        let mut d = Document::new(DocumentId::new(id).unwrap())
            .with_field("title", title)
            .with_version(version);
        if !summary.is_empty() {
            d = d.with_field("summary", summary);
        }
        analyze(&d)
    }

    fn build(docs: Vec<AnalyzedDocument>) -> LexicalSegment {
        let mut builder = SegmentBuilder::new();
        for d in docs {
            builder.insert(d);
        }
        builder.build(7)
    }

    #[test]
    fn test_empty_segment() {
        let seg = SegmentBuilder::new().build(0);
        assert_eq!(seg.doc_count(), 0);
        assert_eq!(seg.term_count(), 0);
        assert!(seg.postings("cardiac").is_empty());
        assert_eq!(seg.version_range(), (0, 0));
    }

    #[test]
    fn test_postings_sorted_without_duplicates() {
        let seg = build(vec![
            doc("C", 1, "cardiac bypass study", ""),
            doc("A", 2, "cardiac arrhythmia trial", "cardiac monitoring"),
            doc("B", 5, "diabetes trial", ""),
        ]);
        let ids: Vec<&str> = seg
            .postings("cardiac")
            .iter()
            .map(|p| p.doc_id.as_str())
            .collect();
        assert_eq!(ids, vec!["A", "C"]);
        assert_eq!(seg.version_range(), (1, 5));
        assert_eq!(seg.segment_id(), 7);
    }

    #[test]
    fn test_field_positions_per_field() {
        let seg = build(vec![doc("A", 1, "cardiac arrhythmia", "cardiac monitoring cardiac")]);
        let posting = &seg.postings("cardiac")[0];
        assert_eq!(posting.term_frequency, 3);
        assert_eq!(posting.field_positions.len(), 2);
        let summary = &posting.field_positions[1];
        assert_eq!(seg.field_name(summary.field), Some("summary"));
        assert_eq!(summary.positions, vec![0, 2]);
    }

    #[test]
    fn test_doc_metadata() {
        let seg = build(vec![doc("A", 3, "cardiac arrhythmia trial", "")]);
        let meta = seg.doc(&DocumentId::new("A").unwrap()).unwrap();
        assert_eq!(meta.version, 3);
        assert_eq!(meta.length, 3);
        assert_eq!(meta.terms, vec!["arrhythmia", "cardiac", "trial"]);
    }

    #[test]
    fn test_builder_replace_and_remove() {
        let mut builder = SegmentBuilder::new();
        builder.insert(doc("A", 1, "old text", ""));
        assert!(builder.insert(doc("A", 2, "new text", "")).is_some());
        builder.insert(doc("B", 1, "other", ""));
        assert!(builder.remove(&DocumentId::new("B").unwrap()).is_some());
        let seg = builder.build(1);
        assert_eq!(seg.doc_count(), 1);
        assert!(seg.postings("old").is_empty());
        assert_eq!(seg.postings("new").len(), 1);
    }

    #[test]
    fn test_reconstruct_rebuilds_same_segment() {
        let original = build(vec![
            doc("A", 1, "cardiac arrhythmia trial", "heart rhythm"),
            doc("B", 4, "diabetes type 2 trial", ""),
        ]);
        let mut builder = SegmentBuilder::new();
        for d in original.reconstruct(|_, _| true) {
            builder.insert(d);
        }
        assert_eq!(builder.build(7), original);
    }

    #[test]
    fn test_reconstruct_filters() {
        let seg = build(vec![
            doc("A", 1, "cardiac", ""),
            doc("B", 1, "diabetes", ""),
        ]);
        let kept = seg.reconstruct(|id, _| id.as_str() == "B");
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id.as_str(), "B");
    }

    #[test]
    fn test_bytes_roundtrip_and_corruption() {
        let seg = build(vec![doc("A", 1, "cardiac arrhythmia trial", "")]);
        let mut bytes = seg.to_bytes().unwrap();
        assert_eq!(LexicalSegment::from_bytes(&bytes).unwrap(), seg);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x55;
        assert!(LexicalSegment::from_bytes(&bytes).is_err());
    }
}
