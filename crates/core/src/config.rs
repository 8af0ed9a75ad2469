//! Engine configuration via `ctse.toml`
//!
//! Every recognized option is enumerated here with its default. The record
//! is validated once, when the engine is constructed; nothing is
//! re-interpreted at first use.

use crate::error::{CtseError, CtseResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "ctse.toml";

const WEIGHT_SUM_TOLERANCE: f32 = 1e-4;

// ============================================================================
// External model endpoints
// ============================================================================

/// Configuration for an external inference endpoint (OpenAI-compatible).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    /// API base (e.g. "http://localhost:11434/v1")
    pub endpoint: String,
    /// Model name
    pub model: String,
    /// Optional API key for authenticated endpoints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

// ============================================================================
// Lexical scoring
// ============================================================================

/// BM25 parameters and per-field weights
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Bm25Config {
    /// Term-frequency saturation (default 1.2)
    pub k1: f32,
    /// Length normalization (default 0.75)
    pub b: f32,
    /// Weight applied to a field's term frequency; unlisted fields use `default_field_weight`
    pub field_weights: BTreeMap<String, f32>,
    /// Weight for fields not listed in `field_weights`
    pub default_field_weight: f32,
}

impl Default for Bm25Config {
    fn default() -> Self {
        let mut field_weights = BTreeMap::new();
        field_weights.insert("title".to_string(), 2.0);
        field_weights.insert("condition".to_string(), 1.5);
        Bm25Config {
            k1: 1.2,
            b: 0.75,
            field_weights,
            default_field_weight: 1.0,
        }
    }
}

impl Bm25Config {
    /// Weight of a named field
    pub fn field_weight(&self, field: &str) -> f32 {
        self.field_weights
            .get(field)
            .copied()
            .unwrap_or(self.default_field_weight)
    }
}

// ============================================================================
// ANN
// ============================================================================

/// HNSW parameters
///
/// `ef_search` is the recall/latency trade-off: a larger search breadth
/// visits more graph nodes per query and approaches exact recall.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnnConfig {
    /// Max neighbors per node on layers above 0 (layer 0 keeps `2 * m`)
    pub m: usize,
    /// Candidate list size while building
    pub ef_construction: usize,
    /// Candidate list size while searching
    pub ef_search: usize,
}

impl Default for AnnConfig {
    fn default() -> Self {
        AnnConfig {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
        }
    }
}

// ============================================================================
// Encoder
// ============================================================================

/// External text encoder boundary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EncoderConfig {
    /// Embedding dimension `D`; changing it invalidates the whole ANN index
    pub dimension: usize,
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
    /// Encoder input is cut to this many characters
    pub max_input_chars: usize,
    /// Remote embedding endpoint; when absent a local hashing encoder is used
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        EncoderConfig {
            dimension: 256,
            timeout_ms: 2000,
            max_input_chars: 4096,
            model: None,
        }
    }
}

// ============================================================================
// Fusion
// ============================================================================

/// How each ranked list is mapped to `[0, 1]` before the weighted sum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoreNormalization {
    /// `(s - min) / (max - min)` lifted onto `[0.1, 1]`; a single-valued list maps to 1.0
    #[default]
    MinMax,
    /// `k / (k + rank)` with 1-based rank, i.e. weighted reciprocal-rank fusion
    ReciprocalRank,
}

/// Fusion defaults (overridable per query through `SearchOptions`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FusionConfig {
    /// Normalization applied to both lists
    pub normalization: ScoreNormalization,
    /// `k` constant for reciprocal-rank normalization
    pub rrf_k: u32,
    /// Default lexical weight
    pub lexical_weight: f32,
    /// Default vector weight
    pub vector_weight: f32,
    /// Default for "require both" mode
    pub require_both: bool,
    /// Each sub-index is asked for `top_k * candidate_multiplier` candidates
    pub candidate_multiplier: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        FusionConfig {
            normalization: ScoreNormalization::MinMax,
            rrf_k: 60,
            lexical_weight: 0.5,
            vector_weight: 0.5,
            require_both: false,
            candidate_multiplier: 4,
        }
    }
}

// ============================================================================
// Re-rank / generation
// ============================================================================

/// Generative re-ranking and query expansion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RerankConfig {
    /// Generative endpoint; re-ranking is unavailable without it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,
    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
    /// Token budget passed to the generator
    pub max_tokens: u32,
    /// Only this many fused results are sent to the model
    pub top_k: usize,
    /// Character budget for all candidate text in one prompt
    pub max_input_chars: usize,
}

impl Default for RerankConfig {
    fn default() -> Self {
        RerankConfig {
            model: None,
            timeout_ms: 10_000,
            max_tokens: 512,
            top_k: 10,
            max_input_chars: 6000,
        }
    }
}

/// Pseudo-relevance feedback (Bo1) over a first lexical pass
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExpansionConfig {
    /// Top lexical hits taken as relevant
    pub feedback_docs: usize,
    /// Most terms added to the query
    pub feedback_terms: usize,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        ExpansionConfig {
            feedback_docs: 3,
            feedback_terms: 10,
        }
    }
}

// ============================================================================
// Ingestion / compaction
// ============================================================================

/// Ingestion worker pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Worker threads for normalize + embed; `0` uses one per core
    pub workers: usize,
    /// Persist a snapshot after every committed batch (needs `data_dir`)
    pub auto_persist: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            workers: 0,
            auto_persist: true,
        }
    }
}

/// Automatic compaction triggers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompactionConfig {
    /// Compact when dead entries exceed this fraction of all segment entries
    pub tombstone_ratio: f32,
    /// Compact when a sub-index holds more segments than this
    pub max_segments: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        CompactionConfig {
            tombstone_ratio: 0.25,
            max_segments: 16,
        }
    }
}

// ============================================================================
// CtseConfig
// ============================================================================

/// Engine configuration loaded from `ctse.toml`.
///
/// # Example
///
/// ```toml
/// data_dir = "/var/lib/ctse"
///
/// [fusion]
/// lexical_weight = 0.7
/// vector_weight = 0.3
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CtseConfig {
    /// Index directory; `None` keeps everything in memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// BM25
    #[serde(default)]
    pub bm25: Bm25Config,
    /// HNSW
    #[serde(default)]
    pub ann: AnnConfig,
    /// Encoder boundary
    #[serde(default)]
    pub encoder: EncoderConfig,
    /// Fusion defaults
    #[serde(default)]
    pub fusion: FusionConfig,
    /// Re-rank stage
    #[serde(default)]
    pub rerank: RerankConfig,
    /// Feedback expansion
    #[serde(default)]
    pub expansion: ExpansionConfig,
    /// Ingestion
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Compaction
    #[serde(default)]
    pub compaction: CompactionConfig,
}

impl CtseConfig {
    /// In-memory configuration with the given embedding dimension
    pub fn in_memory(dimension: usize) -> Self {
        let mut config = CtseConfig::default();
        config.encoder.dimension = dimension;
        config.ingest.auto_persist = false;
        config
    }

    /// Check every option; called once at startup.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` naming the first offending option.
    pub fn validate(&self) -> CtseResult<()> {
        let bm25 = &self.bm25;
        if !(bm25.k1.is_finite() && bm25.k1 > 0.0) {
            return Err(invalid("bm25.k1 must be a positive number"));
        }
        if !(0.0..=1.0).contains(&bm25.b) {
            return Err(invalid("bm25.b must be within [0, 1]"));
        }
        if !(bm25.default_field_weight.is_finite() && bm25.default_field_weight >= 0.0) {
            return Err(invalid("bm25.default_field_weight must be non-negative"));
        }
        for (field, weight) in &bm25.field_weights {
            if !(weight.is_finite() && *weight >= 0.0) {
                return Err(invalid(format!(
                    "bm25.field_weights.{} must be non-negative",
                    field
                )));
            }
        }

        if self.ann.m < 2 {
            return Err(invalid("ann.m must be at least 2"));
        }
        if self.ann.ef_construction < self.ann.m {
            return Err(invalid("ann.ef_construction must be at least ann.m"));
        }
        if self.ann.ef_search == 0 {
            return Err(invalid("ann.ef_search must be positive"));
        }

        if self.encoder.dimension == 0 {
            return Err(invalid("encoder.dimension must be positive"));
        }
        if self.encoder.timeout_ms == 0 {
            return Err(invalid("encoder.timeout_ms must be positive"));
        }
        if self.encoder.max_input_chars == 0 {
            return Err(invalid("encoder.max_input_chars must be positive"));
        }
        validate_model("encoder.model", self.encoder.model.as_ref())?;

        let fusion = &self.fusion;
        validate_weights(fusion.lexical_weight, fusion.vector_weight)?;
        if fusion.rrf_k == 0 {
            return Err(invalid("fusion.rrf_k must be positive"));
        }
        if fusion.candidate_multiplier == 0 {
            return Err(invalid("fusion.candidate_multiplier must be at least 1"));
        }

        let rerank = &self.rerank;
        if rerank.timeout_ms == 0 {
            return Err(invalid("rerank.timeout_ms must be positive"));
        }
        if rerank.max_tokens == 0 {
            return Err(invalid("rerank.max_tokens must be positive"));
        }
        if rerank.top_k == 0 {
            return Err(invalid("rerank.top_k must be positive"));
        }
        if rerank.max_input_chars < rerank.top_k {
            return Err(invalid("rerank.max_input_chars must be at least rerank.top_k"));
        }
        validate_model("rerank.model", rerank.model.as_ref())?;

        if self.expansion.feedback_docs == 0 {
            return Err(invalid("expansion.feedback_docs must be at least 1"));
        }

        let compaction = &self.compaction;
        if !(compaction.tombstone_ratio > 0.0 && compaction.tombstone_ratio <= 1.0) {
            return Err(invalid("compaction.tombstone_ratio must be within (0, 1]"));
        }
        if compaction.max_segments == 0 {
            return Err(invalid("compaction.max_segments must be at least 1"));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# CTSE retrieval core configuration
#
# Index directory. Omit to keep the index in memory only.
# data_dir = "./ctse-data"

[bm25]
k1 = 1.2
b = 0.75
default_field_weight = 1.0

[bm25.field_weights]
title = 2.0
condition = 1.5

# HNSW graph. ef_search trades recall for latency: larger = closer to exact.
[ann]
m = 16
ef_construction = 200
ef_search = 64

[encoder]
dimension = 256
timeout_ms = 2000
max_input_chars = 4096
# [encoder.model]
# endpoint = "http://localhost:11434/v1"
# model = "nomic-embed-text"

# normalization: "min_max" (default) or "reciprocal_rank"
[fusion]
normalization = "min_max"
rrf_k = 60
lexical_weight = 0.5
vector_weight = 0.5
require_both = false
candidate_multiplier = 4

[rerank]
timeout_ms = 10000
max_tokens = 512
top_k = 10
max_input_chars = 6000
# [rerank.model]
# endpoint = "http://localhost:11434/v1"
# model = "qwen3:1.7b"
# api_key = "your-api-key"      # optional

# Bo1 pseudo-relevance feedback, used when a query asks for it
[expansion]
feedback_docs = 3
feedback_terms = 10

[ingest]
workers = 0
auto_persist = true

[compaction]
tombstone_ratio = 0.25
max_segments = 16
"#
    }

    /// Parse and validate config text.
    pub fn from_toml_str(content: &str) -> CtseResult<Self> {
        let config: CtseConfig = toml::from_str(content)
            .map_err(|e| invalid(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> CtseResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            invalid(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns `Ok(())` whether the file was created or already existed.
    pub fn write_default_if_missing(path: &Path) -> CtseResult<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> CtseResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CtseError::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Fusion weights must be non-negative and sum to 1.
pub fn validate_weights(lexical: f32, vector: f32) -> CtseResult<()> {
    if !(lexical.is_finite() && vector.is_finite()) || lexical < 0.0 || vector < 0.0 {
        return Err(invalid("fusion weights must be non-negative numbers"));
    }
    if ((lexical + vector) - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(invalid(format!(
            "fusion weights must sum to 1 (got {} + {})",
            lexical, vector
        )));
    }
    Ok(())
}

fn validate_model(section: &str, model: Option<&ModelConfig>) -> CtseResult<()> {
    if let Some(model) = model {
        if model.endpoint.trim().is_empty() {
            return Err(invalid(format!("{}.endpoint must not be empty", section)));
        }
        if model.model.trim().is_empty() {
            return Err(invalid(format!("{}.model must not be empty", section)));
        }
    }
    Ok(())
}

fn invalid(msg: impl Into<String>) -> CtseError {
    CtseError::InvalidConfig(msg.into())
}
