//! Fusion of the lexical and vector ranked lists
//!
//! This module provides:
//! - Fuser trait for pluggable fusion algorithms
//! - WeightedFuser: per-list normalization to `[0, 1]` followed by
//!   `fused = w_lex * lex_norm + w_vec * vec_norm`
//!
//! Normalization is either min-max or reciprocal-rank (`k / (k + rank)`);
//! the latter makes the weighted sum a weighted reciprocal-rank fusion.
//! Min-max maps a list onto `[MIN_MAX_FLOOR, 1]`, so the weakest hit of a
//! list still outscores a document the list did not return. A document
//! missing from one list gets 0 for that signal unless "require both" is
//! set. A list with weight 0 contributes no candidates,
//! so weights `(1, 0)` reproduce the lexical ranking exactly and `(0, 1)`
//! the vector ranking.

use ctse_core::{DocumentId, FusionWeights, ScoreNormalization, ScoredResult};
use std::collections::{BTreeSet, HashMap};

/// One sub-index's ranked list, best first
pub type RankedList = [(DocumentId, f32)];

/// The two lists of one query; `None` marks a path that could not run
#[derive(Debug, Clone, Copy, Default)]
pub struct FusionInput<'a> {
    /// BM25 hits
    pub lexical: Option<&'a RankedList>,
    /// Cosine hits
    pub vector: Option<&'a RankedList>,
}

// ============================================================================
// Fuser Trait
// ============================================================================

/// Pluggable fusion interface
///
/// # Thread Safety
///
/// Fusers must be Send + Sync for concurrent search operations.
pub trait Fuser: Send + Sync {
    /// Fuse both lists into one ranking, sorted by fused score descending
    /// with ties broken by ascending document id, truncated to `k`.
    fn fuse(&self, input: FusionInput<'_>, k: usize) -> Vec<ScoredResult>;

    /// Name for debugging and logging
    fn name(&self) -> &str;
}

// ============================================================================
// Normalization
// ============================================================================

/// Normalized min-max score of the lowest hit in a list
pub const MIN_MAX_FLOOR: f32 = 0.1;

/// Map a ranked list's scores into `[0, 1]`.
///
/// Min-max puts the best hit at 1.0 and the worst at [`MIN_MAX_FLOOR`];
/// a list whose scores are all equal maps to 1.0.
pub fn normalize_scores(
    list: &RankedList,
    normalization: ScoreNormalization,
    rrf_k: u32,
) -> HashMap<&DocumentId, f32> {
    match normalization {
        ScoreNormalization::MinMax => {
            let (min, max) = list.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |acc, (_, s)| {
                (acc.0.min(*s), acc.1.max(*s))
            });
            let range = max - min;
            list.iter()
                .map(|(id, s)| {
                    let norm = if range > f32::EPSILON {
                        MIN_MAX_FLOOR + (1.0 - MIN_MAX_FLOOR) * (s - min) / range
                    } else {
                        1.0
                    };
                    (id, norm)
                })
                .collect()
        }
        ScoreNormalization::ReciprocalRank => {
            let k = rrf_k.max(1) as f32;
            list.iter()
                .enumerate()
                .map(|(i, (id, _))| (id, k / (k + (i + 1) as f32)))
                .collect()
        }
    }
}

// ============================================================================
// WeightedFuser
// ============================================================================

/// Normalized weighted-sum fusion
#[derive(Debug, Clone)]
pub struct WeightedFuser {
    normalization: ScoreNormalization,
    rrf_k: u32,
    weights: FusionWeights,
    require_both: bool,
}

impl WeightedFuser {
    /// Fuser with the given normalization and weights
    pub fn new(normalization: ScoreNormalization, weights: FusionWeights) -> Self {
        WeightedFuser {
            normalization,
            rrf_k: 60,
            weights,
            require_both: false,
        }
    }

    /// Builder: reciprocal-rank `k`
    pub fn with_rrf_k(mut self, k: u32) -> Self {
        self.rrf_k = k;
        self
    }

    /// Builder: keep only documents present in both lists
    ///
    /// Only applies when both paths ran; with one path unavailable the
    /// remaining list is used alone.
    pub fn with_require_both(mut self, require_both: bool) -> Self {
        self.require_both = require_both;
        self
    }
}

impl Fuser for WeightedFuser {
    fn fuse(&self, input: FusionInput<'_>, k: usize) -> Vec<ScoredResult> {
        let lexical = input.lexical.unwrap_or(&[]);
        let vector = input.vector.unwrap_or(&[]);
        let lex_norm = normalize_scores(lexical, self.normalization, self.rrf_k);
        let vec_norm = normalize_scores(vector, self.normalization, self.rrf_k);
        let lex_raw: HashMap<&DocumentId, f32> = lexical.iter().map(|(id, s)| (id, *s)).collect();
        let vec_raw: HashMap<&DocumentId, f32> = vector.iter().map(|(id, s)| (id, *s)).collect();

        let both_ran = input.lexical.is_some() && input.vector.is_some();
        let mut candidates: BTreeSet<&DocumentId> = BTreeSet::new();
        if self.weights.lexical > 0.0 || self.weights.vector == 0.0 {
            candidates.extend(lexical.iter().map(|(id, _)| id));
        }
        if self.weights.vector > 0.0 {
            candidates.extend(vector.iter().map(|(id, _)| id));
        }

        let mut results: Vec<ScoredResult> = candidates
            .into_iter()
            .filter(|id| {
                !(self.require_both && both_ran)
                    || (lex_raw.contains_key(id) && vec_raw.contains_key(id))
            })
            .map(|id| {
                let l = lex_norm.get(id).copied().unwrap_or(0.0);
                let v = vec_norm.get(id).copied().unwrap_or(0.0);
                ScoredResult {
                    document_id: id.clone(),
                    lexical_score: lex_raw.get(id).copied(),
                    vector_score: vec_raw.get(id).copied(),
                    fused_score: self.weights.lexical * l + self.weights.vector * v,
                }
            })
            .collect();

        sort_results(&mut results);
        results.truncate(k);
        results
    }

    fn name(&self) -> &str {
        match self.normalization {
            ScoreNormalization::MinMax => "weighted-minmax",
            ScoreNormalization::ReciprocalRank => "weighted-rrf",
        }
    }
}

/// Sort by fused score descending, ties by ascending document id.
pub fn sort_results(results: &mut [ScoredResult]) {
    results.sort_by(|a, b| {
        b.fused_score
            .total_cmp(&a.fused_score)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
}

// ============================================================================
// Tests
// ============================================================================
