//! Query-side types
//!
//! - SearchOptions: the per-query option record
//! - ScoredResult: one fused hit (never persisted)
//! - SearchResponse: ranked hits plus the degradation report
//! - QueryState: the per-query state machine

use crate::config::{validate_weights, FusionConfig};
use crate::document::DocumentId;
use crate::error::{CtseError, CtseResult};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// FusionWeights
// ============================================================================

/// `(w_lex, w_vec)`, non-negative and summing to 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    /// Weight of the normalized lexical score
    pub lexical: f32,
    /// Weight of the normalized vector score
    pub vector: f32,
}

impl FusionWeights {
    /// Validated weights
    pub fn new(lexical: f32, vector: f32) -> CtseResult<Self> {
        validate_weights(lexical, vector)?;
        Ok(FusionWeights { lexical, vector })
    }

    /// Pure lexical ranking
    pub fn lexical_only() -> Self {
        FusionWeights {
            lexical: 1.0,
            vector: 0.0,
        }
    }

    /// Pure vector ranking
    pub fn vector_only() -> Self {
        FusionWeights {
            lexical: 0.0,
            vector: 1.0,
        }
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        FusionWeights {
            lexical: 0.5,
            vector: 0.5,
        }
    }
}

// ============================================================================
// SearchOptions
// ============================================================================

/// Recognized per-query options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Result count limit
    pub top_k: usize,
    /// `(w_lex, w_vec)`
    pub fusion_weights: FusionWeights,
    /// Keep only documents found by both sub-indexes
    pub require_both: bool,
    /// Hand the fused top-K to the generative re-ranker
    pub enable_rerank: bool,
    /// Budget for the blocking external calls of this query
    pub timeout_ms: Option<u64>,
    /// Ask the generator for the query's medical condition and add its terms
    pub expand_query: bool,
    /// Add Bo1 feedback terms drawn from the top lexical hits
    #[serde(default)]
    pub feedback_expansion: bool,
    /// Ask the generator for an English rendering of the query and search both
    #[serde(default)]
    pub translate_query: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        SearchOptions {
            top_k: 10,
            fusion_weights: FusionWeights::default(),
            require_both: false,
            enable_rerank: false,
            timeout_ms: None,
            expand_query: false,
            feedback_expansion: false,
            translate_query: false,
        }
    }
}

impl SearchOptions {
    /// Options seeded from the configured fusion defaults
    pub fn from_config(fusion: &FusionConfig) -> Self {
        SearchOptions {
            fusion_weights: FusionWeights {
                lexical: fusion.lexical_weight,
                vector: fusion.vector_weight,
            },
            require_both: fusion.require_both,
            ..SearchOptions::default()
        }
    }

    /// Builder-style result limit
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Builder-style weights
    pub fn with_weights(mut self, weights: FusionWeights) -> Self {
        self.fusion_weights = weights;
        self
    }

    /// Builder-style require-both
    pub fn with_require_both(mut self, require_both: bool) -> Self {
        self.require_both = require_both;
        self
    }

    /// Builder-style re-rank switch
    pub fn with_rerank(mut self, enable: bool) -> Self {
        self.enable_rerank = enable;
        self
    }

    /// Builder-style timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Builder-style query expansion switch
    pub fn with_expansion(mut self, enable: bool) -> Self {
        self.expand_query = enable;
        self
    }

    /// Builder-style pseudo-relevance feedback switch
    pub fn with_feedback_expansion(mut self, enable: bool) -> Self {
        self.feedback_expansion = enable;
        self
    }

    /// Builder-style translation switch
    pub fn with_translation(mut self, enable: bool) -> Self {
        self.translate_query = enable;
        self
    }

    /// Reject options no query could satisfy
    pub fn validate(&self) -> CtseResult<()> {
        if self.top_k == 0 {
            return Err(CtseError::InvalidConfig("top_k must be positive".to_string()));
        }
        if self.timeout_ms == Some(0) {
            return Err(CtseError::InvalidConfig(
                "timeout_ms must be positive".to_string(),
            ));
        }
        validate_weights(self.fusion_weights.lexical, self.fusion_weights.vector)
    }
}

// ============================================================================
// ScoredResult
// ============================================================================

/// One fused hit
///
/// Raw sub-scores are `None` when the document was not returned by that
/// sub-index; fusion then counts the missing signal as 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    /// Document id
    pub document_id: DocumentId,
    /// Raw BM25 score
    pub lexical_score: Option<f32>,
    /// Raw cosine similarity
    pub vector_score: Option<f32>,
    /// Final ranking score
    pub fused_score: f32,
}

// ============================================================================
// Degradation
// ============================================================================

/// Why a response is (or is not) degraded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DegradationReport {
    /// Set when no query embedding could be derived (vector path skipped)
    pub query_embedding_failure: Option<String>,
    /// Set when the query produced no lexical terms (lexical path skipped)
    pub lexical_path_skipped: bool,
    /// Documents in the snapshot with no current vector
    pub documents_missing_vectors: usize,
    /// Vector hits dropped because their version was behind the document
    pub stale_vectors_filtered: usize,
    /// Set when re-ranking was requested but the fused order was kept
    pub rerank_fallback: Option<String>,
}

impl DegradationReport {
    /// Whether either sub-index lacked full coverage for this query
    pub fn is_degraded(&self) -> bool {
        self.query_embedding_failure.is_some()
            || self.lexical_path_skipped
            || self.documents_missing_vectors > 0
            || self.stale_vectors_filtered > 0
    }
}

// ============================================================================
// QueryState
// ============================================================================

/// Per-query state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryState {
    /// Accepted, options validated
    Received,
    /// Lexical terms and (maybe) a query embedding are ready
    TermsAndEmbeddingDerived,
    /// Both sub-queries ran against one snapshot
    LexicalAndVectorDispatched,
    /// Lists fused and sorted
    Fused,
    /// Generative re-rank applied
    ReRanked,
    /// Terminal success
    Completed,
    /// Terminal failure
    Failed(String),
}

impl QueryState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryState::Completed | QueryState::Failed(_))
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(&self, next: &QueryState) -> bool {
        use QueryState::*;
        match (self, next) {
            (_, Failed(_)) => !self.is_terminal(),
            (Received, TermsAndEmbeddingDerived) => true,
            (TermsAndEmbeddingDerived, LexicalAndVectorDispatched) => true,
            (LexicalAndVectorDispatched, Fused) => true,
            (Fused, ReRanked) | (Fused, Completed) => true,
            (ReRanked, Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryState::Received => write!(f, "received"),
            QueryState::TermsAndEmbeddingDerived => write!(f, "terms_and_embedding_derived"),
            QueryState::LexicalAndVectorDispatched => write!(f, "lexical_and_vector_dispatched"),
            QueryState::Fused => write!(f, "fused"),
            QueryState::ReRanked => write!(f, "reranked"),
            QueryState::Completed => write!(f, "completed"),
            QueryState::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}

// ============================================================================
// SearchResponse
// ============================================================================

/// Execution statistics for debugging/monitoring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryStats {
    /// Wall time in microseconds
    pub elapsed_micros: u64,
    /// Hits returned by the lexical sub-query
    pub lexical_candidates: usize,
    /// Hits returned by the vector sub-query
    pub vector_candidates: usize,
    /// Generation of the snapshot the query ran against
    pub snapshot_generation: u64,
}

/// Ranked results plus the degraded flag and its reasons
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Ranked hits, best first
    pub results: Vec<ScoredResult>,
    /// Whether either sub-index lacked full coverage
    pub degraded: bool,
    /// Why
    pub degradation: DegradationReport,
    /// Whether `results` reflects a generative re-rank
    pub reranked: bool,
    /// Synthesized explanation from the re-rank stage
    pub explanation: Option<String>,
    /// State transitions this query went through
    pub states: Vec<QueryState>,
    /// Execution statistics
    pub stats: QueryStats,
}
