//! Re-rank/Generation Adapter
//!
//! Post-fusion stage: the top fused candidates and the query go to a
//! generative model in one prompt; the model scores each candidate and
//! explains the best matches.
//!
//! ```text
//! fused results → top-K → truncate longest fields first → generator
//!     → parse "N: score" + "Explanation:" → position-aware blending
//! ```
//!
//! Failure is never load-bearing: the caller keeps the fused order when
//! `rerank` returns an error.

pub mod blend;
pub mod error;
pub mod parse;
pub mod prompt;
pub mod truncate;

pub use blend::blend_scores;
pub use error::RerankError;
pub use parse::{parse_rerank_response, ParsedResponse};
pub use truncate::truncate_longest_first;

use crate::generator::{GenerationRequest, Generator, GuardedGenerator};
use ctse_core::{CallContext, Document, RerankConfig, ScoredResult};
use std::sync::Arc;
use std::time::Duration;

/// A relevance score assigned by the model to one candidate
#[derive(Debug, Clone, PartialEq)]
pub struct RerankScore {
    /// Index into the candidate list (0-based position)
    pub index: usize,
    /// Normalized relevance score in [0.0, 1.0]
    pub relevance_score: f32,
}

/// A fused result plus the document text the model sees
#[derive(Debug, Clone)]
pub struct RerankCandidate {
    /// Fused result
    pub result: ScoredResult,
    /// Stored document
    pub document: Arc<Document>,
}

/// Re-ranked list plus optional explanation
#[derive(Debug, Clone, PartialEq)]
pub struct RerankOutcome {
    /// Reordered results
    pub results: Vec<ScoredResult>,
    /// Model explanation, if any
    pub explanation: Option<String>,
}

/// Re-ranking implementation.
///
/// The trait is object-safe for use as `Arc<dyn Reranker>`.
pub trait Reranker: Send + Sync {
    /// Reorder `candidates` (given in fused order) for `query`.
    fn rerank(
        &self,
        query: &str,
        candidates: Vec<RerankCandidate>,
        ctx: &CallContext,
    ) -> Result<RerankOutcome, RerankError>;

    /// Name for logs
    fn name(&self) -> &str;
}

/// Reranker that prompts a generative model
#[derive(Debug, Clone)]
pub struct GenerativeReranker {
    generator: GuardedGenerator,
    top_k: usize,
    max_input_chars: usize,
    max_tokens: u32,
    timeout: Duration,
}

impl GenerativeReranker {
    /// Rerank with `generator` under the limits of `config`.
    pub fn new(generator: Arc<dyn Generator>, config: &RerankConfig) -> Self {
        GenerativeReranker {
            generator: GuardedGenerator::new(generator),
            top_k: config.top_k.max(1),
            max_input_chars: config.max_input_chars,
            max_tokens: config.max_tokens,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// One text per candidate, fields cut to fit the character budget
    fn build_snippets(&self, candidates: &[RerankCandidate]) -> Vec<String> {
        let texts: Vec<&str> = candidates
            .iter()
            .flat_map(|c| c.document.fields.iter().map(|f| f.text.as_str()))
            .collect();
        let mut truncated = truncate_longest_first(&texts, self.max_input_chars).into_iter();
        candidates
            .iter()
            .map(|c| {
                c.document
                    .fields
                    .iter()
                    .filter_map(|f| {
                        let text = truncated.next()?;
                        (!text.is_empty()).then(|| format!("{}: {}", f.name, text))
                    })
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .collect()
    }
}

impl Reranker for GenerativeReranker {
    fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<RerankCandidate>,
        ctx: &CallContext,
    ) -> Result<RerankOutcome, RerankError> {
        if candidates.is_empty() {
            return Ok(RerankOutcome {
                results: Vec::new(),
                explanation: None,
            });
        }
        let tail: Vec<ScoredResult> = if candidates.len() > self.top_k {
            candidates.split_off(self.top_k).into_iter().map(|c| c.result).collect()
        } else {
            Vec::new()
        };

        let snippets = self.build_snippets(&candidates);
        let request = GenerationRequest::new(
            prompt::SYSTEM_PROMPT,
            prompt::build_rerank_prompt(query, &snippets),
            self.max_tokens,
        );
        let text = self.generator.generate(&request, &ctx.child(self.timeout))?;

        let parsed = parse_rerank_response(&text, candidates.len());
        if parsed.scores.is_empty() {
            return Err(RerankError::Parse("model returned no valid scores".to_string()));
        }
        let head: Vec<ScoredResult> = candidates.into_iter().map(|c| c.result).collect();
        let mut results = blend_scores(head, &parsed.scores);
        results.extend(tail);
        Ok(RerankOutcome {
            results,
            explanation: parsed.explanation,
        })
    }

    fn name(&self) -> &str {
        "generative"
    }
}
