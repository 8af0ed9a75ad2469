//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub use ctse::intelligence::{
    EncodeError, Encoder, GenerationError, GenerationRequest, Generator, HashingEncoder,
};
pub use ctse::{
    CallContext, CancellationToken, CtseConfig, CtseError, DocumentId, Engine, FusionWeights,
    IngestStatus, QueryState, RawRecord, ScoredResult, SearchOptions, SearchResponse,
};
pub use tempfile::TempDir;

/// Embedding dimension used throughout the suites
pub const DIM: usize = 64;

// ============================================================================
// Records and engines
// ============================================================================

/// Minimal trial record
pub fn raw(id: &str, title: &str) -> RawRecord {
    RawRecord::new(serde_json::json!({ "nct_id": id, "brief_title": title }))
}

/// Trial record with an explicit version
pub fn raw_versioned(id: &str, title: &str, version: u64) -> RawRecord {
    RawRecord::new(serde_json::json!({ "nct_id": id, "brief_title": title, "version": version }))
}

/// Full trial record with condition and summary
pub fn trial(id: &str, title: &str, condition: &str, summary: &str) -> RawRecord {
    RawRecord::new(serde_json::json!({
        "nct_id": id,
        "brief_title": title,
        "condition": condition,
        "brief_summary": summary,
    }))
}

/// Ingest the three-trial scenario: A and C mention cardiac, A and B trial.
pub fn scenario(engine: &Engine) {
    engine.ingest(&raw("A", "cardiac arrhythmia trial")).unwrap();
    engine.ingest(&raw("B", "diabetes type 2 trial")).unwrap();
    engine.ingest(&raw("C", "cardiac bypass study")).unwrap();
}

/// Ten trials spread over a few conditions
pub fn corpus(engine: &Engine) {
    let rows = [
        ("NCT001", "Cardiac arrhythmia in adults", "atrial fibrillation", "ablation versus drug therapy"),
        ("NCT002", "Insulin pump for type 2 diabetes", "diabetes mellitus", "glucose control with insulin"),
        ("NCT003", "Coronary bypass outcomes", "coronary artery disease", "cardiac surgery follow up"),
        ("NCT004", "Inhaled steroid dosing", "asthma", "pediatric inhaler adherence"),
        ("NCT005", "Metformin and lifestyle", "diabetes mellitus", "weight loss and glucose"),
        ("NCT006", "Beta blockers after infarction", "myocardial infarction", "cardiac rehabilitation"),
        ("NCT007", "Exercise for heart failure", "heart failure", "cardiac function and walking"),
        ("NCT008", "Bronchodilator trial", "asthma", "airway obstruction relief"),
        ("NCT009", "Glucose monitoring in pregnancy", "gestational diabetes", "continuous glucose sensors"),
        ("NCT010", "Statin therapy in the elderly", "hyperlipidemia", "cholesterol and cardiac events"),
    ];
    for (id, title, condition, summary) in rows {
        engine.ingest(&trial(id, title, condition, summary)).unwrap();
    }
}

/// Ranked ids of a response
pub fn ids(response: &SearchResponse) -> Vec<String> {
    response
        .results
        .iter()
        .map(|r| r.document_id.as_str().to_string())
        .collect()
}

pub fn id(s: &str) -> DocumentId {
    DocumentId::new(s).unwrap()
}

pub fn lexical_only() -> SearchOptions {
    SearchOptions::default().with_weights(FusionWeights::lexical_only())
}

pub fn vector_only() -> SearchOptions {
    SearchOptions::default().with_weights(FusionWeights::vector_only())
}

/// In-memory engine with the local hashing encoder
pub fn memory_engine() -> Engine {
    Engine::open(CtseConfig::in_memory(DIM)).unwrap()
}

/// Configuration persisting to `dir`, with automatic persistence on commit
pub fn disk_config(dir: &Path) -> CtseConfig {
    let mut config = CtseConfig::in_memory(DIM);
    config.data_dir = Some(dir.to_path_buf());
    config.ingest.auto_persist = true;
    config
}

/// Engine persisting to a fresh temporary directory
pub fn disk_engine() -> (TempDir, Engine) {
    let dir = TempDir::new().unwrap();
    let engine = Engine::open(disk_config(dir.path())).unwrap();
    (dir, engine)
}

// ============================================================================
// Test encoders and generators
// ============================================================================

/// Hashing encoder with injectable faults.
///
/// Texts containing `fail_marker` fail with `Unavailable`; every call
/// sleeps for the current delay first. Reports itself as remote so the
/// engine's deadline guard is in play.
pub struct FaultyEncoder {
    inner: HashingEncoder,
    fail_marker: Option<String>,
    delay_ms: AtomicU64,
    calls: AtomicUsize,
}

impl FaultyEncoder {
    pub fn new() -> Self {
        FaultyEncoder {
            inner: HashingEncoder::new(DIM),
            fail_marker: None,
            delay_ms: AtomicU64::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(marker: &str) -> Self {
        FaultyEncoder {
            fail_marker: Some(marker.to_string()),
            ..FaultyEncoder::new()
        }
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Encoder for FaultyEncoder {
    fn encode(&self, text: &str, ctx: &CallContext) -> Result<Vec<f32>, EncodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_millis(delay));
        }
        if let Some(marker) = &self.fail_marker {
            if text.contains(marker.as_str()) {
                return Err(EncodeError::Unavailable("model rejected input".to_string()));
            }
        }
        self.inner.encode(text, ctx)
    }

    fn dimension(&self) -> usize {
        DIM
    }

    fn name(&self) -> &str {
        "faulty"
    }

    fn is_remote(&self) -> bool {
        true
    }
}

/// Generator returning queued answers, then the fallback
pub struct ScriptedGenerator {
    answers: Mutex<Vec<Result<String, GenerationError>>>,
    fallback: Result<String, GenerationError>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn always(answer: Result<String, GenerationError>) -> Self {
        ScriptedGenerator {
            answers: Mutex::new(Vec::new()),
            fallback: answer,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Answer with `first` once, then `fallback`
    pub fn then(first: Result<String, GenerationError>, fallback: Result<String, GenerationError>) -> Self {
        ScriptedGenerator {
            answers: Mutex::new(vec![first]),
            fallback,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: &GenerationRequest, _ctx: &CallContext) -> Result<String, GenerationError> {
        self.prompts.lock().push(request.prompt.clone());
        let mut answers = self.answers.lock();
        if answers.is_empty() {
            self.fallback.clone()
        } else {
            answers.remove(0)
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
