//! Query Processor
//!
//! Per-query state machine:
//!
//! ```text
//! Received → TermsAndEmbeddingDerived → LexicalAndVectorDispatched → Fused
//!          → (ReRanked) → Completed            any non-terminal → Failed
//! ```
//!
//! Lexical and vector sub-queries run in parallel against one snapshot.
//! A failed query embedding leaves the lexical path running and marks the
//! response degraded; a failed re-rank keeps the fused order.
//!
//! Optional query rewriting happens before dispatch:
//! - translation: the generator's English rendering adds its terms and
//!   replaces the text that is embedded and expanded
//! - condition expansion: the generator's condition name adds its terms
//! - feedback expansion: Bo1 terms from the top hits of a first lexical
//!   pass over the same snapshot join the lexical query with their weights

use crate::engine::Engine;
use ctse_core::{
    CallContext, CancellationToken, CtseError, CtseResult, DegradationReport, DocumentId,
    QueryState, QueryStats, SearchOptions, SearchResponse,
};
use ctse_intelligence::{
    EncodeError, Encoder, GenerationError, RerankCandidate, RerankError,
};
use ctse_search::{tokenize_unique, FusionInput, Fuser, LexicalIndex, WeightedFuser};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// States visited by one query
struct QueryRun {
    states: Vec<QueryState>,
}

impl QueryRun {
    fn new() -> Self {
        debug!(target: "ctse::query", state = %QueryState::Received, "Query state");
        QueryRun {
            states: vec![QueryState::Received],
        }
    }

    fn advance(&mut self, next: QueryState) {
        if let Some(last) = self.states.last() {
            debug_assert!(last.can_transition_to(&next), "illegal transition {} -> {}", last, next);
            debug!(target: "ctse::query", from = %last, to = %next, "Query state");
        }
        self.states.push(next);
    }

    fn fail(&mut self, err: CtseError) -> CtseError {
        self.advance(QueryState::Failed(err.to_string()));
        err
    }
}

impl Engine {
    /// Hybrid search with `options`.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` for invalid options
    /// - `EmptyQuery` when the query has no terms and no embedding; no
    ///   index is touched
    /// - `IndexUnavailable` when no snapshot can be obtained
    pub fn search(&self, query: &str, options: &SearchOptions) -> CtseResult<SearchResponse> {
        self.search_with_cancel(query, options, &CancellationToken::new())
    }

    /// Like [`Engine::search`], abandoned with `Cancelled` once `cancel`
    /// fires. Cancellation reaches both sub-queries and any in-flight
    /// encoder or generator call; partial results are discarded.
    pub fn search_with_cancel(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
    ) -> CtseResult<SearchResponse> {
        let started = Instant::now();
        let mut run = QueryRun::new();
        match self.run_query(query, options, cancel, &mut run) {
            Ok(mut response) => {
                response.stats.elapsed_micros = started.elapsed().as_micros() as u64;
                response.states = run.states;
                debug!(
                    target: "ctse::query",
                    results = response.results.len(),
                    degraded = response.degraded,
                    reranked = response.reranked,
                    elapsed_us = response.stats.elapsed_micros,
                    "Query completed"
                );
                Ok(response)
            }
            Err(e) => Err(run.fail(e)),
        }
    }

    fn run_query(
        &self,
        query: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
        run: &mut QueryRun,
    ) -> CtseResult<SearchResponse> {
        options.validate()?;
        cancel.check()?;
        let ctx = match options.timeout_ms {
            Some(ms) => CallContext::with_timeout(Duration::from_millis(ms)),
            None => CallContext::unbounded(),
        }
        .cancelled_by(cancel.clone());
        let mut degradation = DegradationReport::default();

        // 1. Terms and embedding
        let mut terms = tokenize_unique(query);
        let translated = if options.translate_query {
            self.translate_query(query, &ctx)?
        } else {
            None
        };
        if let Some(english) = &translated {
            add_terms(&mut terms, english);
        }
        let rewritten = translated.as_deref().unwrap_or(query);
        if options.expand_query {
            self.expand_terms(rewritten, &ctx, &mut terms)?;
        }
        let embedding = if options.fusion_weights.vector > 0.0 || options.require_both {
            self.embed_query(rewritten, &ctx, &mut degradation)?
        } else {
            None
        };
        if terms.is_empty() && embedding.is_none() {
            return Err(CtseError::EmptyQuery);
        }
        degradation.lexical_path_skipped = terms.is_empty() && options.fusion_weights.lexical > 0.0;
        run.advance(QueryState::TermsAndEmbeddingDerived);

        // 2. Both sub-queries against one snapshot
        let snapshot = self.store.snapshot()?;
        let limit = self.candidate_limit(options);
        let mut weighted: Vec<(String, f32)> = terms.iter().map(|t| (t.clone(), 1.0)).collect();
        if options.feedback_expansion && !terms.is_empty() {
            weighted.extend(self.feedback_terms(snapshot.lexical(), &terms, cancel)?);
        }
        let (lexical, vector) = rayon::join(
            || {
                if weighted.is_empty() {
                    return Ok(None);
                }
                snapshot
                    .lexical()
                    .query_weighted(&weighted, &self.scorer, limit, cancel)
                    .map(Some)
            },
            || match &embedding {
                Some(v) => snapshot.vectors().query(v, limit, cancel).map(Some),
                None => Ok(None),
            },
        );
        let lexical = lexical?;
        let mut vector = vector?;
        cancel.check()?;
        run.advance(QueryState::LexicalAndVectorDispatched);

        if let Some(hits) = vector.as_mut() {
            let before = hits.len();
            hits.retain(|h| snapshot.version_of(&h.doc_id) == Some(h.version));
            degradation.stale_vectors_filtered = before - hits.len();
            degradation.documents_missing_vectors = snapshot.missing_vector_count();
        }
        let stats = QueryStats {
            elapsed_micros: 0,
            lexical_candidates: lexical.as_ref().map_or(0, Vec::len),
            vector_candidates: vector.as_ref().map_or(0, Vec::len),
            snapshot_generation: snapshot.generation(),
        };

        // 3-4. Fuse and sort
        let lexical_list = lexical.map(|hits| {
            hits.into_iter()
                .map(|h| (h.doc_id, h.score))
                .collect::<Vec<_>>()
        });
        let vector_list = vector.map(|hits| {
            hits.into_iter()
                .map(|h| (h.doc_id, h.similarity))
                .collect::<Vec<_>>()
        });
        let fuser = WeightedFuser::new(self.config.fusion.normalization, options.fusion_weights)
            .with_rrf_k(self.config.fusion.rrf_k)
            .with_require_both(options.require_both);
        let mut results = fuser.fuse(
            FusionInput {
                lexical: lexical_list.as_deref(),
                vector: vector_list.as_deref(),
            },
            limit,
        );
        cancel.check()?;
        run.advance(QueryState::Fused);

        // Optional re-rank
        let mut reranked = false;
        let mut explanation = None;
        if options.enable_rerank && !results.is_empty() {
            match &self.reranker {
                None => {
                    degradation.rerank_fallback = Some("re-ranking is not configured".to_string());
                }
                Some(reranker) => {
                    let candidates: Vec<RerankCandidate> = results
                        .iter()
                        .filter_map(|r| {
                            snapshot.document(&r.document_id).map(|doc| RerankCandidate {
                                result: r.clone(),
                                document: Arc::clone(doc),
                            })
                        })
                        .collect();
                    match reranker.rerank(query, candidates, &ctx) {
                        Ok(outcome) => {
                            results = outcome.results;
                            explanation = outcome.explanation;
                            reranked = true;
                            run.advance(QueryState::ReRanked);
                        }
                        Err(RerankError::Generation(GenerationError::Cancelled)) => {
                            return Err(CtseError::Cancelled);
                        }
                        Err(e) => {
                            warn!(
                                target: "ctse::query",
                                reranker = reranker.name(),
                                error = %e,
                                "Re-rank failed, keeping fused order"
                            );
                            degradation.rerank_fallback = Some(e.to_string());
                        }
                    }
                }
            }
        }
        cancel.check()?;

        // 5. Truncate
        results.truncate(options.top_k);
        run.advance(QueryState::Completed);
        Ok(SearchResponse {
            results,
            degraded: degradation.is_degraded(),
            degradation,
            reranked,
            explanation,
            states: Vec::new(),
            stats,
        })
    }

    /// Candidates fetched per sub-index
    fn candidate_limit(&self, options: &SearchOptions) -> usize {
        let wanted = if options.enable_rerank {
            options.top_k.max(self.config.rerank.top_k)
        } else {
            options.top_k
        };
        wanted.saturating_mul(self.config.fusion.candidate_multiplier.max(1))
    }

    /// Query embedding, or `None` with the reason recorded when the
    /// encoder cannot provide one.
    fn embed_query(
        &self,
        query: &str,
        ctx: &CallContext,
        degradation: &mut DegradationReport,
    ) -> CtseResult<Option<Vec<f32>>> {
        let call = ctx.child(Duration::from_millis(self.config.encoder.timeout_ms));
        match self.encoder.encode(query, &call) {
            Ok(vector) => Ok(Some(vector)),
            Err(EncodeError::Cancelled) => Err(CtseError::Cancelled),
            Err(EncodeError::EmptyInput) => Ok(None),
            Err(e) => {
                warn!(
                    target: "ctse::query",
                    error = %e,
                    "Query embedding failed, continuing lexical-only"
                );
                degradation.query_embedding_failure = Some(e.to_string());
                Ok(None)
            }
        }
    }

    /// Add the terms of the query's medical condition; failures are logged
    /// and ignored.
    fn expand_terms(&self, query: &str, ctx: &CallContext, terms: &mut Vec<String>) -> CtseResult<()> {
        let Some(expander) = &self.expander else {
            debug!(target: "ctse::query", "Query expansion requested without a generator");
            return Ok(());
        };
        let call = ctx.child(Duration::from_millis(self.config.rerank.timeout_ms));
        match expander.expand(query, &call) {
            Ok(Some(condition)) => {
                add_terms(terms, &condition);
                debug!(target: "ctse::query", condition = %condition, "Query expanded");
            }
            Ok(None) => {}
            Err(GenerationError::Cancelled) => return Err(CtseError::Cancelled),
            Err(e) => {
                warn!(target: "ctse::query", error = %e, "Query expansion failed");
            }
        }
        Ok(())
    }

    /// English rendering of the query; failures are logged and ignored.
    fn translate_query(&self, query: &str, ctx: &CallContext) -> CtseResult<Option<String>> {
        let Some(translator) = &self.translator else {
            debug!(target: "ctse::query", "Query translation requested without a generator");
            return Ok(None);
        };
        let call = ctx.child(Duration::from_millis(self.config.rerank.timeout_ms));
        match translator.translate(query, &call) {
            Ok(Some(english)) => {
                debug!(target: "ctse::query", translation = %english, "Query translated");
                Ok(Some(english))
            }
            Ok(None) => Ok(None),
            Err(GenerationError::Cancelled) => Err(CtseError::Cancelled),
            Err(e) => {
                warn!(target: "ctse::query", error = %e, "Query translation failed");
                Ok(None)
            }
        }
    }

    /// Bo1 terms from the top hits of a first lexical pass
    fn feedback_terms(
        &self,
        lexical: &LexicalIndex,
        terms: &[String],
        cancel: &CancellationToken,
    ) -> CtseResult<Vec<(String, f32)>> {
        let first_pass: Vec<DocumentId> = lexical
            .query(terms, &self.scorer, self.feedback.feedback_docs(), cancel)?
            .into_iter()
            .map(|hit| hit.doc_id)
            .collect();
        let added = self.feedback.expansion_terms(lexical, &first_pass, terms);
        debug!(
            target: "ctse::query",
            feedback_docs = first_pass.len(),
            added = added.len(),
            "Feedback expansion"
        );
        Ok(added)
    }
}

/// Append the terms of `text` not already present
fn add_terms(terms: &mut Vec<String>, text: &str) {
    for term in tokenize_unique(text) {
        if !terms.contains(&term) {
            terms.push(term);
        }
    }
}
