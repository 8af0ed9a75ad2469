//! Relevance feedback
//!
//! After the caller marks one result relevant (or not), the results below
//! it are re-ordered by cosine similarity to the marked document's
//! embedding: most similar first for positive feedback, least similar
//! first for negative feedback.

use crate::engine::Engine;
use ctse_core::{CtseError, CtseResult, ScoredResult};
use ctse_vector::cosine_similarity;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

/// Direction of a relevance judgement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    /// The selected result is what the user wants
    Positive,
    /// The selected result is not what the user wants
    Negative,
}

impl Engine {
    /// Re-order `results` after `selected` by similarity to it.
    ///
    /// Results up to and including `selected` keep their position, as do
    /// all scores. Results without a stored vector go last in their
    /// original order.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `selected` is out of range; `EncoderUnavailable`
    /// or a related encoder error if the selected document has no stored
    /// vector and cannot be embedded now.
    pub fn apply_feedback(
        &self,
        results: &[ScoredResult],
        selected: usize,
        feedback: Feedback,
    ) -> CtseResult<Vec<ScoredResult>> {
        let Some(anchor) = results.get(selected) else {
            return Err(CtseError::InvalidConfig(format!(
                "selected result {} out of range ({} results)",
                selected,
                results.len()
            )));
        };
        let snapshot = self.store.snapshot()?;
        let anchor_vector = match snapshot.vectors().get_vector(&anchor.document_id) {
            Some(v) => v.to_vec(),
            None => {
                let doc = snapshot.document(&anchor.document_id).ok_or_else(|| {
                    CtseError::InvalidConfig(format!("{} is no longer indexed", anchor.document_id))
                })?;
                self.embed_document(doc)?
            }
        };

        let (head, tail) = results.split_at(selected + 1);
        let mut scored: Vec<(Option<f32>, &ScoredResult)> = tail
            .iter()
            .map(|r| {
                let sim = snapshot
                    .vectors()
                    .get_vector(&r.document_id)
                    .map(|v| cosine_similarity(&anchor_vector, v));
                (sim, r)
            })
            .collect();
        scored.sort_by(|a, b| match (a.0, b.0) {
            (Some(x), Some(y)) => match feedback {
                Feedback::Positive => y.total_cmp(&x),
                Feedback::Negative => x.total_cmp(&y),
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        debug!(
            target: "ctse::engine",
            selected = %anchor.document_id,
            feedback = ?feedback,
            reordered = scored.len(),
            "Relevance feedback applied"
        );
        Ok(head
            .iter()
            .cloned()
            .chain(scored.into_iter().map(|(_, r)| r.clone()))
            .collect())
    }
}
