//! Scoring infrastructure for lexical search
//!
//! This module provides:
//! - Scorer trait for pluggable term scoring
//! - ScoringContext for corpus-level statistics
//! - Bm25Scorer default implementation with per-field weights

use crate::segment::{LexicalSegment, Posting};
use ctse_core::Bm25Config;
use std::collections::BTreeMap;

// ============================================================================
// ScoringContext
// ============================================================================

/// Corpus-level statistics for one query, taken from a single snapshot
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext {
    /// Live documents in the corpus
    pub total_docs: usize,
    /// Average live document length in tokens
    pub avg_doc_len: f32,
}

impl ScoringContext {
    /// Compute IDF for a term with document frequency `df`
    ///
    /// Uses standard IDF formula with smoothing:
    /// IDF(t) = ln((N - df + 0.5) / (df + 0.5) + 1)
    pub fn idf(&self, df: u32) -> f32 {
        let df = df as f32;
        let n = self.total_docs as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }
}

// ============================================================================
// Scorer Trait
// ============================================================================

/// Pluggable per-term scoring interface
///
/// The index sums `score_term` over query terms. Higher = more relevant.
/// Scores are not normalized; fusion handles cross-signal comparisons.
///
/// # Thread Safety
///
/// Scorers must be Send + Sync for concurrent search operations.
pub trait Scorer: Send + Sync {
    /// Contribution of one term's posting to its document's score
    fn score_term(
        &self,
        posting: &Posting,
        segment: &LexicalSegment,
        doc_len: u32,
        idf: f32,
        ctx: &ScoringContext,
    ) -> f32;

    /// Name for debugging and logging
    fn name(&self) -> &str;
}

// ============================================================================
// Bm25Scorer
// ============================================================================

/// BM25 with field-weighted term frequency
///
/// # BM25 Formula
///
/// For each query term t:
/// score += IDF(t) * (tf * (k1 + 1)) / (tf + k1 * (1 - b + b * dl/avgdl))
///
/// Where:
/// - tf = Σ over fields of field_weight * occurrences in that field
/// - dl = document length
/// - avgdl = average document length
/// - k1 = term saturation parameter (default 1.2)
/// - b = length normalization parameter (default 0.75)
#[derive(Debug, Clone)]
pub struct Bm25Scorer {
    k1: f32,
    b: f32,
    field_weights: BTreeMap<String, f32>,
    default_field_weight: f32,
}

impl Default for Bm25Scorer {
    fn default() -> Self {
        Bm25Scorer::new(1.2, 0.75)
    }
}

impl Bm25Scorer {
    /// Unweighted BM25 with custom parameters
    pub fn new(k1: f32, b: f32) -> Self {
        Bm25Scorer {
            k1,
            b,
            field_weights: BTreeMap::new(),
            default_field_weight: 1.0,
        }
    }

    /// BM25 configured from `[bm25]`
    pub fn from_config(config: &Bm25Config) -> Self {
        Bm25Scorer {
            k1: config.k1,
            b: config.b,
            field_weights: config.field_weights.clone(),
            default_field_weight: config.default_field_weight,
        }
    }

    /// Builder: weight one field
    pub fn with_field_weight(mut self, field: impl Into<String>, weight: f32) -> Self {
        self.field_weights.insert(field.into(), weight);
        self
    }

    fn weighted_tf(&self, posting: &Posting, segment: &LexicalSegment) -> f32 {
        posting
            .field_positions
            .iter()
            .map(|fp| {
                let weight = segment
                    .field_name(fp.field)
                    .and_then(|name| self.field_weights.get(name))
                    .copied()
                    .unwrap_or(self.default_field_weight);
                weight * fp.positions.len() as f32
            })
            .sum()
    }
}

impl Scorer for Bm25Scorer {
    fn score_term(
        &self,
        posting: &Posting,
        segment: &LexicalSegment,
        doc_len: u32,
        idf: f32,
        ctx: &ScoringContext,
    ) -> f32 {
        let tf = self.weighted_tf(posting, segment);
        if tf <= 0.0 {
            return 0.0;
        }
        let avg_len = ctx.avg_doc_len.max(1.0);
        let tf_component = (tf * (self.k1 + 1.0))
            / (tf + self.k1 * (1.0 - self.b + self.b * doc_len as f32 / avg_len));
        idf * tf_component
    }

    fn name(&self) -> &str {
        "bm25"
    }
}

// ============================================================================
// Tests
// ============================================================================
