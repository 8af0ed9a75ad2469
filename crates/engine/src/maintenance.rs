//! Compaction and re-indexing
//!
//! Both produce a new snapshot under the commit lock; in-flight queries
//! keep reading the snapshot they started with.

use crate::engine::Engine;
use ctse_core::{CtseResult, Document, DocumentId};
use ctse_durability::{Catalog, CatalogEntry, IndexSnapshot, MissingVector};
use ctse_intelligence::EncodeError;
use ctse_search::LexicalIndex;
use ctse_vector::{VectorIndex, VectorWriter};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of a compaction
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompactionReport {
    /// Published generation
    pub generation: u64,
    /// Lexical segments before compaction
    pub lexical_segments_before: usize,
    /// Lexical entries dropped
    pub lexical_entries_dropped: usize,
    /// ANN segments before compaction
    pub vector_segments_before: usize,
    /// Vectors dropped
    pub vectors_dropped: usize,
}

/// Result of `reindex_missing`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReindexReport {
    /// Documents whose embedding was retried
    pub attempted: usize,
    /// Documents that now have a current vector
    pub repaired: usize,
    /// Documents still served lexical-only
    pub still_missing: usize,
    /// Generation after the run
    pub generation: u64,
}

impl Engine {
    /// Rewrite both indexes into one segment each, dropping tombstoned and
    /// superseded entries.
    pub fn compact(&self) -> CtseResult<CompactionReport> {
        let guard = self.store.begin_write()?;
        let base = Arc::clone(guard.base());
        let report_base = compaction_counts(&base);
        let segment_id = base.next_segment_id();
        let (lexical, vectors) = compact_indexes(&base, segment_id)?;
        let next = base.successor(segment_id + 2, lexical, vectors, Arc::clone(base.catalog()));
        let published = guard.commit(next)?;
        let report = CompactionReport {
            generation: published.generation(),
            ..report_base
        };
        info!(
            target: "ctse::engine",
            generation = report.generation,
            lexical_dropped = report.lexical_entries_dropped,
            vectors_dropped = report.vectors_dropped,
            "Compaction finished"
        );
        self.after_commit()?;
        Ok(report)
    }

    /// Compact `next` before it is published if it crossed a configured
    /// threshold. The compacted snapshot keeps `next`'s generation: it is
    /// the same commit, published once.
    pub(crate) fn maybe_compact(&self, next: IndexSnapshot) -> CtseResult<IndexSnapshot> {
        if !self.should_compact(&next) {
            return Ok(next);
        }
        let counts = compaction_counts(&next);
        let segment_id = next.next_segment_id();
        let (lexical, vectors) = compact_indexes(&next, segment_id)?;
        let compacted = next.with_indexes(segment_id + 2, lexical, vectors);
        info!(
            target: "ctse::engine",
            generation = compacted.generation(),
            lexical_segments = counts.lexical_segments_before,
            lexical_dropped = counts.lexical_entries_dropped,
            vectors_dropped = counts.vectors_dropped,
            "Automatic compaction"
        );
        Ok(compacted)
    }

    fn should_compact(&self, snapshot: &IndexSnapshot) -> bool {
        let limits = &self.config.compaction;
        let lexical = snapshot.lexical().stats();
        let vectors = snapshot.vectors().stats();
        let ratio = |dead: usize, total: usize| {
            if total == 0 {
                0.0
            } else {
                dead as f32 / total as f32
            }
        };
        lexical.segments > limits.max_segments
            || vectors.segments > limits.max_segments
            || ratio(lexical.dead_entries(), lexical.segment_docs) > limits.tombstone_ratio
            || ratio(vectors.dead_entries(), vectors.segment_vectors) > limits.tombstone_ratio
    }

    /// Retry embedding for every document served lexical-only.
    ///
    /// Embedding runs on the worker pool without the commit lock; a
    /// document updated in the meantime is left to its newer ingest.
    pub fn reindex_missing(&self) -> CtseResult<ReindexReport> {
        let base = self.store.snapshot()?;
        let todo: Vec<(Arc<Document>, MissingVector)> = base
            .missing_vectors()
            .into_iter()
            .filter_map(|(id, missing)| base.document(&id).map(|doc| (Arc::clone(doc), missing)))
            .collect();
        if todo.is_empty() {
            return Ok(ReindexReport {
                generation: base.generation(),
                ..ReindexReport::default()
            });
        }

        let embedded: Vec<(Arc<Document>, MissingVector, Result<Vec<f32>, EncodeError>)> =
            self.pool.install(|| {
                todo.into_par_iter()
                    .map(|(doc, missing)| {
                        let result = self.embed_document(&doc);
                        (doc, missing, result)
                    })
                    .collect()
            });

        let guard = self.store.begin_write()?;
        let current = Arc::clone(guard.base());
        let segment_id = current.next_segment_id();
        let mut vectors = VectorWriter::new(current.vectors(), segment_id);
        let mut catalog: Catalog = (**current.catalog()).clone();
        let mut report = ReindexReport::default();

        for (doc, missing, result) in embedded {
            let still_same = catalog
                .get(&doc.id)
                .is_some_and(|e| e.document.version == doc.version && e.missing_vector.is_some());
            if !still_same {
                continue;
            }
            report.attempted += 1;
            let staged = result
                .map_err(ctse_core::CtseError::from)
                .and_then(|v| vectors.upsert(doc.id.clone(), doc.version, &v));
            let entry = match staged {
                Ok(_) => {
                    report.repaired += 1;
                    CatalogEntry {
                        document: Arc::clone(&doc),
                        missing_vector: None,
                    }
                }
                Err(e) => {
                    warn!(
                        target: "ctse::engine",
                        id = %doc.id,
                        attempts = missing.attempts + 1,
                        error = %e,
                        "Re-embedding failed"
                    );
                    CatalogEntry {
                        document: Arc::clone(&doc),
                        missing_vector: Some(MissingVector {
                            reason: e.to_string(),
                            attempts: missing.attempts + 1,
                        }),
                    }
                }
            };
            catalog.insert(doc.id.clone(), entry);
        }

        if report.attempted == 0 {
            report.still_missing = current.missing_vector_count();
            report.generation = current.generation();
            return Ok(report);
        }
        let next = current.successor(
            segment_id + 1,
            current.lexical().clone(),
            vectors.publish()?,
            Arc::new(catalog),
        );
        let next = self.maybe_compact(next)?;
        report.still_missing = next.missing_vector_count();
        let published = guard.commit(next)?;
        report.generation = published.generation();
        info!(
            target: "ctse::engine",
            attempted = report.attempted,
            repaired = report.repaired,
            still_missing = report.still_missing,
            "Re-index finished"
        );
        self.after_commit()?;
        Ok(report)
    }

    /// Documents served lexical-only and why
    pub fn missing_vectors(&self) -> CtseResult<Vec<(DocumentId, MissingVector)>> {
        Ok(self.store.snapshot()?.missing_vectors())
    }
}

/// Both indexes of `snapshot` rewritten into segments `segment_id` and
/// `segment_id + 1`
fn compact_indexes(snapshot: &IndexSnapshot, segment_id: u64) -> CtseResult<(LexicalIndex, VectorIndex)> {
    let lexical = snapshot.lexical().compact(segment_id);
    let vectors = snapshot.vectors().compact(segment_id + 1)?;
    Ok((lexical, vectors))
}

fn compaction_counts(snapshot: &IndexSnapshot) -> CompactionReport {
    let lexical = snapshot.lexical().stats();
    let vectors = snapshot.vectors().stats();
    CompactionReport {
        generation: snapshot.generation(),
        lexical_segments_before: lexical.segments,
        lexical_entries_dropped: lexical.dead_entries(),
        vector_segments_before: vectors.segments,
        vectors_dropped: vectors.dead_entries(),
    }
}
