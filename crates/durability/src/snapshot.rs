//! Point-in-time index snapshots
//!
//! An `IndexSnapshot` bundles everything one query needs: the lexical view,
//! the vector view, and the document catalog. All parts are immutable and
//! `Arc`-shared, so a snapshot is cheap to clone and a reader holding one
//! never observes a later commit.

use crate::manifest::{IndexManifest, MissingVector, VectorState};
use ctse_core::codec;
use ctse_core::{AnnConfig, CtseError, CtseResult, Document, DocumentId, Version};
use ctse_search::{LexicalIndex, LexicalSegment, LiveEntry};
use ctse_vector::{VectorIndex, VectorLive, VectorSegment};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

const DOCUMENTS_MAGIC: &[u8; 4] = b"CDOC";
const DOCUMENTS_VERSION: u32 = 1;

/// One catalogued document
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// Original, untokenized document at its current version
    pub document: Arc<Document>,
    /// Set when the document has no vector for its current version
    pub missing_vector: Option<MissingVector>,
}

impl CatalogEntry {
    /// Entry whose vector is indexed
    pub fn indexed(document: Document) -> Self {
        CatalogEntry {
            document: Arc::new(document),
            missing_vector: None,
        }
    }

    /// Entry served lexical-only
    pub fn missing(document: Document, missing: MissingVector) -> Self {
        CatalogEntry {
            document: Arc::new(document),
            missing_vector: Some(missing),
        }
    }
}

/// Document catalog keyed by id
pub type Catalog = HashMap<DocumentId, CatalogEntry>;

/// A consistent, immutable view of both indexes and the catalog
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    generation: u64,
    next_segment_id: u64,
    lexical: LexicalIndex,
    vectors: VectorIndex,
    catalog: Arc<Catalog>,
}

impl IndexSnapshot {
    /// Generation-0 snapshot with no documents
    pub fn empty(dimension: usize, params: AnnConfig) -> Self {
        IndexSnapshot {
            generation: 0,
            next_segment_id: 0,
            lexical: LexicalIndex::new(),
            vectors: VectorIndex::new(dimension, params),
            catalog: Arc::new(HashMap::new()),
        }
    }

    /// Assemble a snapshot from its parts
    pub fn new(
        generation: u64,
        next_segment_id: u64,
        lexical: LexicalIndex,
        vectors: VectorIndex,
        catalog: Arc<Catalog>,
    ) -> Self {
        IndexSnapshot {
            generation,
            next_segment_id,
            lexical,
            vectors,
            catalog,
        }
    }

    /// The snapshot that follows this one
    pub fn successor(
        &self,
        next_segment_id: u64,
        lexical: LexicalIndex,
        vectors: VectorIndex,
        catalog: Arc<Catalog>,
    ) -> Self {
        IndexSnapshot::new(self.generation + 1, next_segment_id, lexical, vectors, catalog)
    }

    /// The same generation and catalog over rewritten indexes, for a
    /// snapshot that has not been published yet
    pub fn with_indexes(&self, next_segment_id: u64, lexical: LexicalIndex, vectors: VectorIndex) -> Self {
        IndexSnapshot::new(
            self.generation,
            next_segment_id,
            lexical,
            vectors,
            Arc::clone(&self.catalog),
        )
    }

    /// Generation (strictly increasing across swaps)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Next unassigned segment id
    pub fn next_segment_id(&self) -> u64 {
        self.next_segment_id
    }

    /// Lexical view
    pub fn lexical(&self) -> &LexicalIndex {
        &self.lexical
    }

    /// Vector view
    pub fn vectors(&self) -> &VectorIndex {
        &self.vectors
    }

    /// Document catalog
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Live document count
    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    /// True if no document is live
    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// Stored document
    pub fn document(&self, id: &DocumentId) -> Option<&Arc<Document>> {
        self.catalog.get(id).map(|e| &e.document)
    }

    /// Current version of `id`
    pub fn version_of(&self, id: &DocumentId) -> Option<Version> {
        self.catalog.get(id).map(|e| e.document.version)
    }

    /// True if `id`'s indexed vector was computed from its current version
    pub fn is_vector_current(&self, id: &DocumentId) -> bool {
        match (self.vectors.version_of(id), self.version_of(id)) {
            (Some(v), Some(d)) => v == d,
            _ => false,
        }
    }

    /// Documents without a current vector
    pub fn missing_vector_count(&self) -> usize {
        self.catalog
            .keys()
            .filter(|id| !self.is_vector_current(id))
            .count()
    }

    /// Documents without a vector and why, ascending id
    pub fn missing_vectors(&self) -> Vec<(DocumentId, MissingVector)> {
        let mut out: Vec<(DocumentId, MissingVector)> = self
            .catalog
            .iter()
            .filter(|(id, _)| !self.is_vector_current(id))
            .map(|(id, e)| {
                let missing = e.missing_vector.clone().unwrap_or(MissingVector {
                    reason: "not embedded".to_string(),
                    attempts: 0,
                });
                (id.clone(), missing)
            })
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Manifest describing this snapshot
    pub fn manifest(&self) -> CtseResult<IndexManifest> {
        IndexManifest::describe(self)
    }

    /// Drop every vector and switch to `dimension`-sized embeddings.
    ///
    /// All documents become lexical-only with `reason`; the result is the
    /// next generation so it is persisted on the following `persist`.
    pub fn reset_vectors(&self, dimension: usize, params: AnnConfig, reason: &str) -> Self {
        let catalog: Catalog = self
            .catalog
            .iter()
            .map(|(id, e)| {
                (
                    id.clone(),
                    CatalogEntry {
                        document: Arc::clone(&e.document),
                        missing_vector: Some(MissingVector {
                            reason: reason.to_string(),
                            attempts: 0,
                        }),
                    },
                )
            })
            .collect();
        self.successor(
            self.next_segment_id,
            self.lexical.clone(),
            VectorIndex::new(dimension, params),
            Arc::new(catalog),
        )
    }

    /// Rebuild a snapshot from persisted parts.
    ///
    /// # Errors
    ///
    /// `Corruption` if documents, manifest and segments disagree.
    pub fn from_persisted(
        manifest: &IndexManifest,
        documents: Vec<Document>,
        lexical_segments: Vec<Arc<LexicalSegment>>,
        vector_segments: Vec<Arc<VectorSegment>>,
        params: AnnConfig,
    ) -> CtseResult<Self> {
        if documents.len() != manifest.documents.len() {
            return Err(CtseError::Corruption(format!(
                "catalog holds {} documents, manifest {}",
                documents.len(),
                manifest.documents.len()
            )));
        }
        let mut lex_live: HashMap<DocumentId, LiveEntry> = HashMap::with_capacity(documents.len());
        let mut vec_live: HashMap<DocumentId, VectorLive> = HashMap::new();
        let mut catalog: Catalog = HashMap::with_capacity(documents.len());
        for doc in documents {
            let state = manifest.documents.get(&doc.id).ok_or_else(|| {
                CtseError::Corruption(format!("document {} is not in the manifest", doc.id))
            })?;
            if state.version != doc.version {
                return Err(CtseError::Corruption(format!(
                    "document {} is v{} but the manifest records v{}",
                    doc.id, doc.version, state.version
                )));
            }
            lex_live.insert(doc.id.clone(), state.lexical.clone());
            let missing_vector = match &state.vector {
                VectorState::Indexed(live) => {
                    vec_live.insert(doc.id.clone(), *live);
                    None
                }
                VectorState::Missing(m) => Some(m.clone()),
            };
            catalog.insert(
                doc.id.clone(),
                CatalogEntry {
                    document: Arc::new(doc),
                    missing_vector,
                },
            );
        }
        let lexical = LexicalIndex::from_parts(lexical_segments, lex_live)?;
        let vectors = VectorIndex::from_parts(
            manifest.embedding_dimension,
            params,
            vector_segments,
            vec_live,
        )?;
        Ok(IndexSnapshot {
            generation: manifest.generation,
            next_segment_id: manifest.next_segment_id,
            lexical,
            vectors,
            catalog: Arc::new(catalog),
        })
    }
}

/// Write the catalog's documents, ascending id, and fsync
pub fn write_documents(path: &Path, catalog: &Catalog) -> CtseResult<()> {
    let mut docs: Vec<&Document> = catalog.values().map(|e| e.document.as_ref()).collect();
    docs.sort_by(|a, b| a.id.cmp(&b.id));
    codec::write_synced(path, &codec::encode_framed(DOCUMENTS_MAGIC, DOCUMENTS_VERSION, &docs)?)
}

/// Read a document catalog file
pub fn read_documents(path: &Path) -> CtseResult<Vec<Document>> {
    codec::read_framed(path, DOCUMENTS_MAGIC, DOCUMENTS_VERSION)
}
