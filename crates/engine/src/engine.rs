//! The engine: one index store plus the capabilities around it
//!
//! `Engine` is the caller boundary. Ingestion (`ingest.rs`), querying
//! (`query.rs`), maintenance (`maintenance.rs`) and relevance feedback
//! (`feedback.rs`) are implemented as further `impl Engine` blocks.

use crate::builder::EngineBuilder;
use ctse_core::{CtseConfig, CtseResult, Document, DocumentId};
use ctse_durability::{IndexStore, PersistOutcome};
use ctse_intelligence::{GuardedEncoder, QueryExpander, QueryTranslator, Reranker};
use ctse_search::{Bm25Scorer, Bo1Expander, Normalizer};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Hybrid retrieval engine over a corpus of trial records
///
/// # Thread Safety
///
/// `Engine` is `Send + Sync`. Queries run against the snapshot published
/// when they start and never block on writers; ingestion, removal and
/// compaction serialize on the index store's commit lock.
///
/// # Example
///
/// ```
/// use ctse_core::{CtseConfig, RawRecord, SearchOptions};
/// use ctse_engine::Engine;
///
/// let engine = Engine::open(CtseConfig::in_memory(64)).unwrap();
/// let raw = RawRecord::from_json(r#"{"nct_id": "NCT01", "brief_title": "Cardiac arrhythmia trial"}"#).unwrap();
/// engine.ingest(&raw).unwrap();
///
/// let response = engine.search("cardiac", &SearchOptions::default()).unwrap();
/// assert_eq!(response.results[0].document_id.as_str(), "NCT01");
/// ```
pub struct Engine {
    pub(crate) config: CtseConfig,
    pub(crate) store: IndexStore,
    pub(crate) normalizer: Normalizer,
    pub(crate) scorer: Bm25Scorer,
    pub(crate) encoder: GuardedEncoder,
    pub(crate) reranker: Option<Arc<dyn Reranker>>,
    pub(crate) expander: Option<Arc<dyn QueryExpander>>,
    pub(crate) translator: Option<Arc<dyn QueryTranslator>>,
    pub(crate) feedback: Bo1Expander,
    pub(crate) pool: rayon::ThreadPool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("store", &self.store)
            .field("encoder", &self.encoder)
            .field("reranker", &self.reranker.as_ref().map(|r| r.name().to_string()))
            .field("expander", &self.expander.is_some())
            .field("translator", &self.translator.is_some())
            .finish()
    }
}

/// Point-in-time counters for monitoring and the CLI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStats {
    /// Generation of the published snapshot
    pub generation: u64,
    /// Live documents
    pub documents: usize,
    /// Lexical segments
    pub lexical_segments: usize,
    /// Tombstoned or superseded lexical entries awaiting compaction
    pub lexical_dead_entries: usize,
    /// Distinct indexed terms
    pub terms: usize,
    /// ANN segments
    pub vector_segments: usize,
    /// Indexed vectors
    pub vectors: usize,
    /// Superseded or removed vectors awaiting compaction
    pub vector_dead_entries: usize,
    /// Documents served lexical-only
    pub missing_vectors: usize,
    /// Embedding dimension `D`
    pub dimension: usize,
    /// Index directory, `None` when in memory
    pub data_dir: Option<PathBuf>,
}

impl Engine {
    /// Engine with the default capabilities for `config`
    ///
    /// Uses `ApiEncoder` when `[encoder]` names a model and the local
    /// `HashingEncoder` otherwise; re-ranking and query expansion are
    /// available when `[rerank]` names a model.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the configuration does not validate, or any
    /// error from opening the index directory.
    pub fn open(config: CtseConfig) -> CtseResult<Engine> {
        EngineBuilder::new(config).build()
    }

    /// Builder for custom encoders and generators
    pub fn builder(config: CtseConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Active configuration
    pub fn config(&self) -> &CtseConfig {
        &self.config
    }

    /// Index directory, `None` when in memory
    pub fn data_dir(&self) -> Option<&Path> {
        self.store.data_dir()
    }

    /// Underlying index store
    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Original, untokenized text of a live document
    pub fn document(&self, id: &DocumentId) -> CtseResult<Option<Arc<Document>>> {
        let snapshot = self.store.snapshot()?;
        Ok(snapshot.document(id).cloned())
    }

    /// Counters of the published snapshot
    pub fn stats(&self) -> CtseResult<EngineStats> {
        let snapshot = self.store.snapshot()?;
        let lexical = snapshot.lexical().stats();
        let vectors = snapshot.vectors().stats();
        Ok(EngineStats {
            generation: snapshot.generation(),
            documents: snapshot.len(),
            lexical_segments: lexical.segments,
            lexical_dead_entries: lexical.dead_entries(),
            terms: lexical.terms,
            vector_segments: vectors.segments,
            vectors: vectors.live_vectors,
            vector_dead_entries: vectors.dead_entries(),
            missing_vectors: snapshot.missing_vector_count(),
            dimension: snapshot.vectors().dimension(),
            data_dir: self.store.data_dir().map(Path::to_path_buf),
        })
    }

    /// Persist the published snapshot.
    ///
    /// Returns `None` for in-memory engines and when nothing changed since
    /// the last persist.
    pub fn persist(&self) -> CtseResult<Option<PersistOutcome>> {
        self.store.persist_current()
    }

    /// Persist if configured to, then stop serving.
    ///
    /// Later calls fail with `IndexUnavailable`.
    pub fn close(&self) -> CtseResult<()> {
        if self.store.is_closed() {
            return Ok(());
        }
        if self.store.data_dir().is_some() {
            self.persist()?;
        }
        self.store.close();
        info!(target: "ctse::engine", "Engine closed");
        Ok(())
    }

    /// Persist after a commit when `[ingest] auto_persist` is set
    pub(crate) fn after_commit(&self) -> CtseResult<()> {
        if self.config.ingest.auto_persist {
            self.persist()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctse_core::{CtseError, RawRecord};

    fn raw(json: &str) -> RawRecord {
        RawRecord::from_json(json).unwrap()
    }

    #[test]
    fn test_engine_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }

    #[test]
    fn test_stats_on_empty_engine() {
        let engine = Engine::open(CtseConfig::in_memory(32)).unwrap();
        let stats = engine.stats().unwrap();
        assert_eq!(stats.generation, 0);
        assert_eq!(stats.documents, 0);
        assert_eq!(stats.dimension, 32);
        assert!(stats.data_dir.is_none());
    }

    #[test]
    fn test_document_returns_original_text() {
        let engine = Engine::open(CtseConfig::in_memory(32)).unwrap();
        engine
            .ingest(&raw(r#"{"nct_id": "NCT9", "brief_title": "Cardiac  Bypass &amp; Recovery"}"#))
            .unwrap();
        let id = DocumentId::new("NCT9").unwrap();
        let doc = engine.document(&id).unwrap().unwrap();
        assert_eq!(doc.field("title"), Some("Cardiac Bypass & Recovery"));
        assert_eq!(doc.version, 1);
    }

    #[test]
    fn test_closed_engine_is_unavailable() {
        let engine = Engine::open(CtseConfig::in_memory(32)).unwrap();
        engine.close().unwrap();
        assert!(matches!(engine.stats(), Err(CtseError::IndexUnavailable(_))));
        engine.close().unwrap();
    }

    #[test]
    fn test_in_memory_persist_is_noop() {
        let engine = Engine::open(CtseConfig::in_memory(32)).unwrap();
        assert!(engine.persist().unwrap().is_none());
    }
}
