//! Position-aware score blending for re-ranking
//!
//! Blends fused retrieval scores with model relevance scores using
//! position-aware weights:
//! - Ranks 1-3: 75% fused + 25% model (trust established ranking)
//! - Ranks 4-10: 60% fused + 40% model
//! - Ranks 11+: 40% fused + 60% model (model dominates tail)

use super::RerankScore;
use ctse_core::ScoredResult;

/// Reorder `results` (in fused order) by blended score.
///
/// Fused scores are min-max normalized over `results`; a result without a
/// model score keeps its normalized fused score. Ties keep fused order.
/// The results themselves, including `fused_score`, are not modified.
pub fn blend_scores(results: Vec<ScoredResult>, scores: &[RerankScore]) -> Vec<ScoredResult> {
    if results.is_empty() || scores.is_empty() {
        return results;
    }

    let max = results
        .iter()
        .map(|r| r.fused_score)
        .fold(f32::NEG_INFINITY, f32::max);
    let min = results
        .iter()
        .map(|r| r.fused_score)
        .fold(f32::INFINITY, f32::min);
    let range = max - min;

    let mut blended: Vec<(f32, usize, ScoredResult)> = results
        .into_iter()
        .enumerate()
        .map(|(pos, result)| {
            let norm = if range > 0.0 {
                (result.fused_score - min) / range
            } else {
                1.0
            };
            let score = match scores.iter().find(|s| s.index == pos) {
                Some(rerank) => {
                    let (w_fused, w_model) = position_weights(pos);
                    w_fused * norm + w_model * rerank.relevance_score
                }
                None => norm,
            };
            (score, pos, result)
        })
        .collect();

    blended.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    blended.into_iter().map(|(_, _, r)| r).collect()
}

/// Position-aware weights: (fused_weight, model_weight).
fn position_weights(position: usize) -> (f32, f32) {
    match position {
        0..=2 => (0.75, 0.25),
        3..=9 => (0.60, 0.40),
        _ => (0.40, 0.60),
    }
}
