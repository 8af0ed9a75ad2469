//! Engine builder
//!
//! Validates the configuration once, picks the capability implementations
//! and opens the index store.

use crate::engine::Engine;
use ctse_core::{CtseConfig, CtseError, CtseResult};
use ctse_durability::IndexStore;
use ctse_intelligence::{
    ApiEncoder, ApiGenerator, Encoder, GenerativeExpander, GenerativeReranker,
    GenerativeTranslator, Generator, GuardedEncoder, HashingEncoder, QueryExpander,
    QueryTranslator, Reranker,
};
use ctse_search::{Bm25Scorer, Bo1Expander, Normalizer};
use std::sync::Arc;
use tracing::info;

/// Builder for [`Engine`]
///
/// ```
/// use ctse_core::CtseConfig;
/// use ctse_engine::Engine;
/// use ctse_intelligence::HashingEncoder;
/// use std::sync::Arc;
///
/// let engine = Engine::builder(CtseConfig::in_memory(16))
///     .encoder(Arc::new(HashingEncoder::new(16)))
///     .build()
///     .unwrap();
/// assert_eq!(engine.stats().unwrap().dimension, 16);
/// ```
pub struct EngineBuilder {
    config: CtseConfig,
    encoder: Option<Arc<dyn Encoder>>,
    generator: Option<Arc<dyn Generator>>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl EngineBuilder {
    /// Builder over `config`
    pub fn new(config: CtseConfig) -> Self {
        EngineBuilder {
            config,
            encoder: None,
            generator: None,
            reranker: None,
        }
    }

    /// Use `encoder` instead of the configured one
    pub fn encoder(mut self, encoder: Arc<dyn Encoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// Use `generator` for re-ranking, query expansion and translation
    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Use `reranker` instead of a generative one
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Validate, open the store and assemble the engine.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a bad configuration, an encoder whose dimension
    /// differs from `[encoder] dimension`, or a worker pool that cannot
    /// start. Store errors are passed through.
    pub fn build(self) -> CtseResult<Engine> {
        let config = self.config;
        config.validate()?;

        let dimension = config.encoder.dimension;
        let encoder: Arc<dyn Encoder> = match (self.encoder, &config.encoder.model) {
            (Some(encoder), _) => encoder,
            (None, Some(model)) => Arc::new(ApiEncoder::new(model, dimension, config.encoder.timeout_ms)),
            (None, None) => Arc::new(HashingEncoder::new(dimension)),
        };
        if encoder.dimension() != dimension {
            return Err(CtseError::InvalidConfig(format!(
                "encoder {} produces {} dimensions, configuration says {}",
                encoder.name(),
                encoder.dimension(),
                dimension
            )));
        }

        let generator: Option<Arc<dyn Generator>> = self.generator.or_else(|| {
            config
                .rerank
                .model
                .as_ref()
                .map(|model| Arc::new(ApiGenerator::new(model, config.rerank.timeout_ms)) as Arc<dyn Generator>)
        });
        let reranker: Option<Arc<dyn Reranker>> = self.reranker.or_else(|| {
            generator
                .as_ref()
                .map(|g| Arc::new(GenerativeReranker::new(Arc::clone(g), &config.rerank)) as Arc<dyn Reranker>)
        });
        let expander: Option<Arc<dyn QueryExpander>> = generator
            .as_ref()
            .map(|g| Arc::new(GenerativeExpander::new(Arc::clone(g))) as Arc<dyn QueryExpander>);
        let translator: Option<Arc<dyn QueryTranslator>> = generator
            .as_ref()
            .map(|g| Arc::new(GenerativeTranslator::new(Arc::clone(g))) as Arc<dyn QueryTranslator>);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.ingest.workers)
            .thread_name(|i| format!("ctse-ingest-{}", i))
            .build()
            .map_err(|e| CtseError::InvalidConfig(format!("cannot start ingest workers: {}", e)))?;

        let store = match &config.data_dir {
            Some(dir) => IndexStore::open(dir, dimension, config.ann)?,
            None => IndexStore::in_memory(dimension, config.ann),
        };

        info!(
            target: "ctse::engine",
            encoder = encoder.name(),
            dimension,
            rerank = reranker.is_some(),
            workers = pool.current_num_threads(),
            persistent = config.data_dir.is_some(),
            "Engine started"
        );

        Ok(Engine {
            normalizer: Normalizer::new(),
            scorer: Bm25Scorer::from_config(&config.bm25),
            encoder: GuardedEncoder::new(encoder, config.encoder.max_input_chars),
            reranker,
            expander,
            translator,
            feedback: Bo1Expander::new(
                config.expansion.feedback_docs,
                config.expansion.feedback_terms,
            ),
            store,
            pool,
            config,
        })
    }
}
