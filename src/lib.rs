//! CTSE - hybrid retrieval core for clinical-trial records
//!
//! Trial records are normalized, indexed in a BM25 inverted index and an
//! HNSW vector index, and queried through both at once; the two ranked
//! lists are fused into one, optionally re-ranked by a generative model.
//!
//! # Quick Start
//!
//! ```
//! use ctse::{CtseConfig, Engine, FusionWeights, RawRecord, SearchOptions};
//!
//! let engine = Engine::open(CtseConfig::in_memory(64)).unwrap();
//! for line in [
//!     r#"{"nct_id": "A", "brief_title": "cardiac arrhythmia trial"}"#,
//!     r#"{"nct_id": "B", "brief_title": "diabetes type 2 trial"}"#,
//!     r#"{"nct_id": "C", "brief_title": "cardiac bypass study"}"#,
//! ] {
//!     engine.ingest(&RawRecord::from_json(line).unwrap()).unwrap();
//! }
//!
//! let options = SearchOptions::default().with_weights(FusionWeights::lexical_only());
//! let response = engine.search("cardiac trial", &options).unwrap();
//! assert_eq!(response.results[0].document_id.as_str(), "A");
//! assert!(!response.degraded);
//! ```
//!
//! # Architecture
//!
//! | Crate | Role |
//! |-------|------|
//! | `ctse-core` | documents, configuration, errors, call context |
//! | [`search`] | normalizer, tokenizer, BM25 index, fusion |
//! | [`vector`] | HNSW segments and the vector index |
//! | [`durability`] | snapshots, manifest, crash-consistent persistence |
//! | [`intelligence`] | encoder and generator boundaries, re-ranking |
//! | `ctse-engine` | ingestion pipeline and query processor |

pub use ctse_core::*;
pub use ctse_engine::*;

pub use ctse_durability as durability;
pub use ctse_intelligence as intelligence;
pub use ctse_search as search;
pub use ctse_vector as vector;
