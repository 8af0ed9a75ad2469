//! Pseudo-relevance feedback (Bo1)
//!
//! The top documents of a first lexical pass are taken as relevant. Each
//! term they contain is weighted with the Bose-Einstein Bo1 model:
//!
//! ```text
//! w(t) = tf_x * log2((1 + Pn) / Pn) + log2(1 + Pn)      Pn = F / N
//! ```
//!
//! `tf_x` is the term's frequency inside the feedback documents, `F` its
//! frequency in the whole index and `N` the number of live documents.
//! The best terms the query does not already hold are returned with
//! weights relative to the best one, ready for
//! [`LexicalIndex::query_weighted`].

use crate::index::LexicalIndex;
use ctse_core::DocumentId;
use std::collections::HashMap;
use tracing::debug;

/// Bo1 query expansion over a set of feedback documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bo1Expander {
    feedback_docs: usize,
    feedback_terms: usize,
    min_documents: usize,
}

impl Default for Bo1Expander {
    fn default() -> Self {
        Bo1Expander {
            feedback_docs: 3,
            feedback_terms: 10,
            min_documents: 2,
        }
    }
}

impl Bo1Expander {
    /// Expander reading the top `feedback_docs` hits and adding at most
    /// `feedback_terms` terms
    pub fn new(feedback_docs: usize, feedback_terms: usize) -> Self {
        Bo1Expander {
            feedback_docs,
            feedback_terms,
            ..Bo1Expander::default()
        }
    }

    /// A candidate must occur in this many feedback documents (capped at
    /// the number of feedback documents)
    pub fn with_min_documents(mut self, min_documents: usize) -> Self {
        self.min_documents = min_documents;
        self
    }

    /// How many first-pass hits feed the expansion
    pub fn feedback_docs(&self) -> usize {
        self.feedback_docs
    }

    /// Expansion terms with weights in `(0, 1]`, best first, ties by term.
    ///
    /// `feedback` is the first-pass ranking; only its first
    /// `feedback_docs` entries are read. Terms already in `query_terms`
    /// are never returned.
    pub fn expansion_terms(
        &self,
        index: &LexicalIndex,
        feedback: &[DocumentId],
        query_terms: &[String],
    ) -> Vec<(String, f32)> {
        let feedback = &feedback[..feedback.len().min(self.feedback_docs)];
        let total_docs = index.doc_count() as f64;
        if feedback.is_empty() || self.feedback_terms == 0 || total_docs == 0.0 {
            return Vec::new();
        }

        // term -> (frequency in feedback documents, feedback documents holding it)
        let mut in_feedback: HashMap<&str, (u64, usize)> = HashMap::new();
        for id in feedback {
            for (term, tf) in index.term_frequencies(id) {
                let entry = in_feedback.entry(term).or_insert((0, 0));
                entry.0 += tf as u64;
                entry.1 += 1;
            }
        }

        let min_documents = self.min_documents.clamp(1, feedback.len());
        let mut weighted: Vec<(&str, f64)> = in_feedback
            .into_iter()
            .filter(|(term, (_, docs))| {
                *docs >= min_documents && !query_terms.iter().any(|q| q.as_str() == *term)
            })
            .filter_map(|(term, (tf_x, _))| {
                let collection = index.collection_frequency(term) as f64;
                if collection == 0.0 {
                    return None;
                }
                let pn = collection / total_docs;
                let weight = tf_x as f64 * ((1.0 + pn) / pn).log2() + (1.0 + pn).log2();
                (weight.is_finite() && weight > 0.0).then_some((term, weight))
            })
            .collect();
        weighted.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        weighted.truncate(self.feedback_terms);

        let Some(&(_, best)) = weighted.first() else {
            return Vec::new();
        };
        debug!(
            target: "ctse::search",
            feedback_docs = feedback.len(),
            terms = weighted.len(),
            "Bo1 expansion"
        );
        weighted
            .into_iter()
            .map(|(term, weight)| (term.to_string(), (weight / best) as f32))
            .collect()
    }
}
