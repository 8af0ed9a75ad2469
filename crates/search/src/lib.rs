//! Lexical side of the CTSE retrieval core
//!
//! This crate provides:
//! - Normalizer: raw trial record → canonical `Document`, plus its lexical view
//! - Tokenizer shared by ingestion and querying
//! - LexicalSegment / SegmentBuilder: immutable posting segments
//! - LexicalIndex / LexicalWriter: published views and their single writer
//! - Scorer trait and Bm25Scorer
//! - Bo1Expander: pseudo-relevance feedback over a first lexical pass
//! - XML reader for ClinicalTrials.gov study records
//! - Fuser trait and WeightedFuser for combining lexical and vector lists
//!
//! # Usage
//!
//! ```
//! use ctse_core::{CancellationToken, RawRecord};
//! use ctse_search::{analyze, tokenize_unique, Bm25Scorer, LexicalIndex, LexicalWriter, Normalizer};
//!
//! let raw = RawRecord::from_json(r#"{"nct_id": "NCT01", "brief_title": "Cardiac trial"}"#).unwrap();
//! let doc = Normalizer::new().normalize(&raw).unwrap().with_version(1);
//!
//! let mut writer = LexicalWriter::new(&LexicalIndex::new(), 0);
//! writer.add_or_update(analyze(&doc));
//! let index = writer.publish();
//!
//! let hits = index
//!     .query(&tokenize_unique("cardiac"), &Bm25Scorer::default(), 10, &CancellationToken::new())
//!     .unwrap();
//! assert_eq!(hits[0].doc_id.as_str(), "NCT01");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod expansion;
pub mod fuser;
pub mod index;
pub mod normalizer;
pub mod scorer;
pub mod segment;
pub mod tokenizer;
pub mod xml;

// Re-export commonly used types
pub use expansion::Bo1Expander;
pub use fuser::{
    normalize_scores, sort_results, FusionInput, Fuser, RankedList, WeightedFuser, MIN_MAX_FLOOR,
};
pub use index::{LexicalChange, LexicalHit, LexicalIndex, LexicalStats, LexicalWriter, LiveEntry};
pub use normalizer::{analyze, AnalyzedDocument, AnalyzedField, Normalizer};
pub use scorer::{Bm25Scorer, Scorer, ScoringContext};
pub use segment::{FieldPositions, LexicalSegment, Posting, SegmentBuilder, SegmentDoc};
pub use tokenizer::{tokenize, tokenize_unique};
pub use xml::{record_from_xml, record_from_xml_file};
