//! Ingestion pipeline
//!
//! ```text
//! raw records ──(worker pool)──► normalize + embed ──► commit lock
//!                                                     │ resolve versions
//!                                                     │ stage lexical + vector
//!                                                     └► publish next snapshot
//! ```
//!
//! Normalization and embedding run in parallel without holding any lock.
//! The commit is the single serialization point: records are applied in
//! input order against the latest published snapshot.

use crate::engine::Engine;
use ctse_core::{CallContext, CtseError, CtseResult, Document, DocumentId, RawRecord, Version};
use ctse_durability::{Catalog, CatalogEntry, IndexSnapshot, MissingVector};
use ctse_intelligence::{EncodeError, Encoder};
use ctse_search::{analyze, LexicalWriter};
use ctse_vector::VectorWriter;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What ingesting one record did to the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// New document
    Inserted,
    /// New version of an existing document
    Updated,
    /// Same content already indexed
    Unchanged,
    /// Explicit version not newer than the indexed one; skipped
    Stale,
}

/// Result for one ingested document
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestOutcome {
    /// Document id
    pub document_id: DocumentId,
    /// Version now current for the id
    pub version: Version,
    /// What happened
    pub status: IngestStatus,
    /// Set when the document is served lexical-only after this ingest
    pub vector_error: Option<String>,
}

/// A record the normalizer rejected
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRecord {
    /// Position in the batch
    pub index: usize,
    /// Why
    pub reason: String,
}

/// Summary of `ingest_batch`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    /// One entry per accepted record, in input order
    pub outcomes: Vec<IngestOutcome>,
    /// Malformed records
    pub rejected: Vec<RejectedRecord>,
    /// Generation published by the batch (unchanged if nothing changed)
    pub generation: u64,
}

impl IngestReport {
    /// Accepted records with `status`
    pub fn count(&self, status: IngestStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Accepted records left without a vector
    pub fn missing_vectors(&self) -> usize {
        self.outcomes.iter().filter(|o| o.vector_error.is_some()).count()
    }
}

/// A normalized document plus its embedding attempt
pub(crate) struct Prepared {
    document: Document,
    /// `None` when the snapshot showed no embedding was needed
    embedding: Option<Result<Vec<f32>, EncodeError>>,
}

/// Staged state of one commit
struct Staging {
    lexical: LexicalWriter,
    vectors: VectorWriter,
    catalog: Catalog,
    changed: bool,
}

impl Engine {
    /// Normalize and index one raw record.
    ///
    /// # Errors
    ///
    /// `MalformedRecord` if the record cannot be normalized;
    /// `IndexUnavailable` if the store is closed. Encoder failures are not
    /// errors: the document is indexed lexical-only and the outcome carries
    /// `vector_error`.
    pub fn ingest(&self, raw: &RawRecord) -> CtseResult<IngestOutcome> {
        let document = self.normalizer.normalize(raw)?;
        self.ingest_document(document)
    }

    /// Index an already-normalized document.
    ///
    /// A `version` of 0 means "assign": the previous version plus one when
    /// the content changed, unchanged otherwise.
    pub fn ingest_document(&self, document: Document) -> CtseResult<IngestOutcome> {
        if document.is_empty() {
            return Err(CtseError::MalformedRecord(format!(
                "record {} has no text fields",
                document.id
            )));
        }
        let base = self.store.snapshot()?;
        let prepared = self.prepare(document, &base);
        let (outcomes, _) = self.commit(vec![prepared])?;
        outcomes
            .into_iter()
            .next()
            .ok_or_else(|| CtseError::IndexUnavailable("commit returned no outcome".to_string()))
    }

    /// Ingest many records; failures are isolated per record.
    ///
    /// # Errors
    ///
    /// Only store failures (`IndexUnavailable`, persistence I/O). Malformed
    /// records are listed in the report.
    pub fn ingest_batch(&self, records: &[RawRecord]) -> CtseResult<IngestReport> {
        let base = self.store.snapshot()?;
        let normalized: Vec<(usize, CtseResult<Prepared>)> = self.pool.install(|| {
            records
                .par_iter()
                .enumerate()
                .map(|(index, raw)| {
                    let prepared = self
                        .normalizer
                        .normalize(raw)
                        .map(|document| self.prepare(document, &base));
                    (index, prepared)
                })
                .collect()
        });

        let mut prepared = Vec::with_capacity(normalized.len());
        let mut rejected = Vec::new();
        for (index, result) in normalized {
            match result {
                Ok(p) => prepared.push(p),
                Err(e) => {
                    debug!(target: "ctse::engine", index, error = %e, "Record rejected");
                    rejected.push(RejectedRecord {
                        index,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let (outcomes, generation) = self.commit(prepared)?;
        let report = IngestReport {
            outcomes,
            rejected,
            generation,
        };
        info!(
            target: "ctse::engine",
            records = records.len(),
            inserted = report.count(IngestStatus::Inserted),
            updated = report.count(IngestStatus::Updated),
            unchanged = report.count(IngestStatus::Unchanged),
            stale = report.count(IngestStatus::Stale),
            rejected = report.rejected.len(),
            missing_vectors = report.missing_vectors(),
            generation,
            "Ingest batch committed"
        );
        Ok(report)
    }

    /// Tombstone a document in both indexes. Returns whether it was live.
    ///
    /// The document disappears from every later search immediately;
    /// postings and vectors are physically dropped by compaction.
    pub fn remove_document(&self, id: &DocumentId) -> CtseResult<bool> {
        let guard = self.store.begin_write()?;
        let base = Arc::clone(guard.base());
        if base.document(id).is_none() {
            return Ok(false);
        }
        let segment_id = base.next_segment_id();
        let mut lexical = LexicalWriter::new(base.lexical(), segment_id);
        let mut vectors = VectorWriter::new(base.vectors(), segment_id + 1);
        lexical.remove(id);
        vectors.remove(id);
        let mut catalog: Catalog = (**base.catalog()).clone();
        catalog.remove(id);

        let next = base.successor(segment_id + 2, lexical.publish(), vectors.publish()?, Arc::new(catalog));
        let next = self.maybe_compact(next)?;
        let published = guard.commit(next)?;
        debug!(target: "ctse::engine", id = %id, generation = published.generation(), "Document removed");
        self.after_commit()?;
        Ok(true)
    }

    /// Embed `document` unless `snapshot` shows nothing would change.
    fn prepare(&self, document: Document, snapshot: &IndexSnapshot) -> Prepared {
        let embedding = needs_embedding(snapshot, &document).then(|| self.embed_document(&document));
        Prepared {
            document,
            embedding,
        }
    }

    pub(crate) fn embed_document(&self, document: &Document) -> Result<Vec<f32>, EncodeError> {
        let ctx = CallContext::with_timeout(Duration::from_millis(self.config.encoder.timeout_ms));
        self.encoder.encode(&document.full_text(), &ctx)
    }

    /// Apply `prepared` in order under the commit lock and publish.
    ///
    /// The encoder is never called under the lock. A document that turns
    /// out to need a vector its preparation skipped (the index moved in
    /// between) aborts the attempt: the lock is released, the missing
    /// embeddings are computed on the pool and the commit starts over
    /// against the then-latest snapshot. Each retry carries at least one
    /// more embedding, so the loop ends.
    fn commit(&self, mut prepared: Vec<Prepared>) -> CtseResult<(Vec<IngestOutcome>, u64)> {
        loop {
            let guard = self.store.begin_write()?;
            let base = Arc::clone(guard.base());
            let segment_id = base.next_segment_id();
            let mut staging = Staging {
                lexical: LexicalWriter::new(base.lexical(), segment_id),
                vectors: VectorWriter::new(base.vectors(), segment_id + 1),
                catalog: (**base.catalog()).clone(),
                changed: false,
            };

            let mut outcomes = Vec::with_capacity(prepared.len());
            let mut unembedded = Vec::new();
            for (index, p) in prepared.iter().enumerate() {
                match self.apply(&mut staging, p) {
                    Some(outcome) => outcomes.push(outcome),
                    None => unembedded.push(index),
                }
            }

            if !unembedded.is_empty() {
                drop(staging);
                drop(guard);
                debug!(
                    target: "ctse::engine",
                    documents = unembedded.len(),
                    generation = base.generation(),
                    "Index moved since preparation, embedding outside the commit lock"
                );
                let embeddings: Vec<(usize, Result<Vec<f32>, EncodeError>)> = self.pool.install(|| {
                    unembedded
                        .par_iter()
                        .map(|&index| (index, self.embed_document(&prepared[index].document)))
                        .collect()
                });
                for (index, embedding) in embeddings {
                    prepared[index].embedding = Some(embedding);
                }
                continue;
            }

            if !staging.changed {
                return Ok((outcomes, base.generation()));
            }
            let Staging {
                lexical,
                vectors,
                catalog,
                ..
            } = staging;
            let next = base.successor(segment_id + 2, lexical.publish(), vectors.publish()?, Arc::new(catalog));
            let next = self.maybe_compact(next)?;
            let published = guard.commit(next)?;
            self.after_commit()?;
            return Ok((outcomes, published.generation()));
        }
    }

    /// Resolve the version of one document and stage it.
    ///
    /// `None` when the document needs a vector and `prepared` carries no
    /// embedding; nothing is staged for it then.
    fn apply(&self, staging: &mut Staging, prepared: &Prepared) -> Option<IngestOutcome> {
        let mut document = prepared.document.clone();
        let fingerprint = document.fingerprint();

        let previous = staging.catalog.get(&document.id).map(|entry| {
            (
                entry.document.version,
                entry.document.fingerprint() == fingerprint,
                entry.missing_vector.clone(),
            )
        });

        let status = match &previous {
            None => {
                if document.version == 0 {
                    document.version = 1;
                }
                IngestStatus::Inserted
            }
            Some((current, same, _)) => {
                let explicit = document.version != 0;
                if explicit && document.version < *current {
                    IngestStatus::Stale
                } else if *same && (!explicit || document.version == *current) {
                    document.version = *current;
                    IngestStatus::Unchanged
                } else if explicit && document.version == *current {
                    IngestStatus::Stale
                } else {
                    if !explicit {
                        document.version = current + 1;
                    }
                    IngestStatus::Updated
                }
            }
        };

        let id = document.id.clone();
        match status {
            IngestStatus::Stale => {
                debug!(
                    target: "ctse::engine",
                    id = %id,
                    version = document.version,
                    "Stale version skipped"
                );
                let current = previous.map(|(v, _, _)| v).unwrap_or(document.version);
                Some(IngestOutcome {
                    document_id: id,
                    version: current,
                    status,
                    vector_error: None,
                })
            }
            IngestStatus::Unchanged => {
                let missing = previous.and_then(|(_, _, m)| m);
                let vector_current = missing.is_none() && staging.vectors.version_of(&id) == Some(document.version);
                if vector_current {
                    return Some(IngestOutcome {
                        document_id: id,
                        version: document.version,
                        status,
                        vector_error: None,
                    });
                }
                let embedding = prepared.embedding.as_ref()?;
                let attempts = missing.map(|m| m.attempts).unwrap_or(0);
                let vector_error = self.stage_vector(staging, document, embedding, attempts);
                Some(IngestOutcome {
                    document_id: id.clone(),
                    version: staging
                        .catalog
                        .get(&id)
                        .map(|e| e.document.version)
                        .unwrap_or_default(),
                    status,
                    vector_error,
                })
            }
            IngestStatus::Inserted | IngestStatus::Updated => {
                let embedding = prepared.embedding.as_ref()?;
                let version = document.version;
                staging.lexical.add_or_update(analyze(&document));
                let vector_error = self.stage_vector(staging, document, embedding, 0);
                Some(IngestOutcome {
                    document_id: id,
                    version,
                    status,
                    vector_error,
                })
            }
        }
    }

    /// Stage `document`'s vector and its catalog entry. Returns the
    /// failure reason when it stays lexical-only.
    fn stage_vector(
        &self,
        staging: &mut Staging,
        document: Document,
        embedding: &Result<Vec<f32>, EncodeError>,
        previous_attempts: u32,
    ) -> Option<String> {
        staging.changed = true;
        let id = document.id.clone();
        let staged = match embedding {
            Ok(vector) => staging.vectors.upsert(id.clone(), document.version, vector),
            Err(e) => Err(CtseError::from(e.clone())),
        };

        match staged {
            Ok(_) => {
                staging.catalog.insert(id, CatalogEntry::indexed(document));
                None
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(
                    target: "ctse::engine",
                    id = %id,
                    version = document.version,
                    error = %reason,
                    "Embedding failed, document served lexical-only"
                );
                staging.vectors.remove(&id);
                let missing = MissingVector {
                    reason: reason.clone(),
                    attempts: previous_attempts + 1,
                };
                staging.catalog.insert(id, CatalogEntry::missing(document, missing));
                Some(reason)
            }
        }
    }
}

/// Whether ingesting `document` over `snapshot` could need a new vector
fn needs_embedding(snapshot: &IndexSnapshot, document: &Document) -> bool {
    let Some(entry) = snapshot.catalog().get(&document.id) else {
        return true;
    };
    let current = entry.document.version;
    let explicit = document.version != 0;
    if entry.document.fingerprint() == document.fingerprint() {
        if explicit && document.version > current {
            return true;
        }
        return !snapshot.is_vector_current(&document.id);
    }
    !explicit || document.version > current
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctse_core::{CtseConfig, SearchOptions};
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::time::Instant;

    /// Hashing encoder that can be switched off or slowed down and counts calls
    struct SwitchEncoder {
        inner: ctse_intelligence::HashingEncoder,
        down: AtomicBool,
        delay_ms: AtomicU64,
        calls: AtomicUsize,
    }

    impl SwitchEncoder {
        fn new(dimension: usize) -> Arc<Self> {
            Arc::new(SwitchEncoder {
                inner: ctse_intelligence::HashingEncoder::new(dimension),
                down: AtomicBool::new(false),
                delay_ms: AtomicU64::new(0),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl Encoder for SwitchEncoder {
        fn encode(&self, text: &str, ctx: &CallContext) -> Result<Vec<f32>, EncodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                std::thread::sleep(Duration::from_millis(delay));
            }
            if self.down.load(Ordering::SeqCst) {
                return Err(EncodeError::Unavailable("switched off".to_string()));
            }
            self.inner.encode(text, ctx)
        }
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
        fn name(&self) -> &str {
            "switch"
        }
        fn is_remote(&self) -> bool {
            false
        }
    }

    fn engine_with(encoder: Arc<SwitchEncoder>) -> Engine {
        Engine::builder(CtseConfig::in_memory(32))
            .encoder(encoder)
            .build()
            .unwrap()
    }

    fn raw(json: &str) -> RawRecord {
        RawRecord::from_json(json).unwrap()
    }

    fn id(s: &str) -> DocumentId {
        DocumentId::new(s).unwrap()
    }

    #[test]
    fn test_insert_assigns_version_one() {
        let engine = engine_with(SwitchEncoder::new(32));
        let outcome = engine.ingest(&raw(r#"{"nct_id": "A", "title": "cardiac trial"}"#)).unwrap();
        assert_eq!(outcome.status, IngestStatus::Inserted);
        assert_eq!(outcome.version, 1);
        assert!(outcome.vector_error.is_none());
    }

    #[test]
    fn test_changed_content_bumps_version() {
        let engine = engine_with(SwitchEncoder::new(32));
        engine.ingest(&raw(r#"{"nct_id": "A", "title": "cardiac trial"}"#)).unwrap();
        let outcome = engine.ingest(&raw(r#"{"nct_id": "A", "title": "cardiac bypass trial"}"#)).unwrap();
        assert_eq!(outcome.status, IngestStatus::Updated);
        assert_eq!(outcome.version, 2);
        let snapshot = engine.store.snapshot().unwrap();
        assert_eq!(snapshot.lexical().version_of(&id("A")), Some(2));
        assert_eq!(snapshot.vectors().version_of(&id("A")), Some(2));
    }

    #[test]
    fn test_identical_content_is_noop() {
        let encoder = SwitchEncoder::new(32);
        let engine = engine_with(Arc::clone(&encoder));
        engine.ingest(&raw(r#"{"nct_id": "A", "title": "cardiac trial"}"#)).unwrap();
        let before = engine.stats().unwrap();
        let calls = encoder.calls.load(Ordering::SeqCst);

        let outcome = engine.ingest(&raw(r#"{"nct_id": "A", "title": "cardiac trial"}"#)).unwrap();
        assert_eq!(outcome.status, IngestStatus::Unchanged);
        assert_eq!(engine.stats().unwrap(), before);
        assert_eq!(encoder.calls.load(Ordering::SeqCst), calls);
    }

    #[test]
    fn test_explicit_older_version_is_stale() {
        let engine = engine_with(SwitchEncoder::new(32));
        engine
            .ingest(&raw(r#"{"nct_id": "A", "version": 5, "title": "cardiac trial"}"#))
            .unwrap();
        let outcome = engine
            .ingest(&raw(r#"{"nct_id": "A", "version": 3, "title": "something else"}"#))
            .unwrap();
        assert_eq!(outcome.status, IngestStatus::Stale);
        assert_eq!(outcome.version, 5);
        let doc = engine.document(&id("A")).unwrap().unwrap();
        assert_eq!(doc.field("title"), Some("cardiac trial"));
    }

    #[test]
    fn test_encoder_failure_degrades_to_lexical_only() {
        let encoder = SwitchEncoder::new(32);
        encoder.down.store(true, Ordering::SeqCst);
        let engine = engine_with(Arc::clone(&encoder));
        let outcome = engine.ingest(&raw(r#"{"nct_id": "A", "title": "cardiac trial"}"#)).unwrap();
        assert!(outcome.vector_error.is_some());

        let snapshot = engine.store.snapshot().unwrap();
        assert!(snapshot.lexical().contains(&id("A")));
        assert!(!snapshot.vectors().contains(&id("A")));
        let missing = snapshot.missing_vectors();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].1.attempts, 1);
    }

    #[test]
    fn test_update_failure_drops_old_vector() {
        let encoder = SwitchEncoder::new(32);
        let engine = engine_with(Arc::clone(&encoder));
        engine.ingest(&raw(r#"{"nct_id": "A", "title": "cardiac trial"}"#)).unwrap();
        encoder.down.store(true, Ordering::SeqCst);
        engine.ingest(&raw(r#"{"nct_id": "A", "title": "diabetes trial"}"#)).unwrap();

        let snapshot = engine.store.snapshot().unwrap();
        assert!(!snapshot.vectors().contains(&id("A")));
        assert!(!snapshot.is_vector_current(&id("A")));
    }

    #[test]
    fn test_reingest_repairs_missing_vector() {
        let encoder = SwitchEncoder::new(32);
        let engine = engine_with(Arc::clone(&encoder));
        encoder.down.store(true, Ordering::SeqCst);
        engine.ingest(&raw(r#"{"nct_id": "A", "title": "cardiac trial"}"#)).unwrap();
        encoder.down.store(false, Ordering::SeqCst);

        let outcome = engine.ingest(&raw(r#"{"nct_id": "A", "title": "cardiac trial"}"#)).unwrap();
        assert_eq!(outcome.status, IngestStatus::Unchanged);
        assert!(outcome.vector_error.is_none());
        assert_eq!(engine.stats().unwrap().missing_vectors, 0);
    }

    #[test]
    fn test_batch_isolates_malformed_records() {
        let engine = engine_with(SwitchEncoder::new(32));
        let records = vec![
            raw(r#"{"nct_id": "A", "title": "cardiac arrhythmia trial"}"#),
            raw(r#"{"title": "no identifier"}"#),
            raw(r#"{"nct_id": "B", "title": "diabetes type 2 trial"}"#),
            raw(r#"{"nct_id": "C"}"#),
        ];
        let report = engine.ingest_batch(&records).unwrap();
        assert_eq!(report.count(IngestStatus::Inserted), 2);
        let rejected: Vec<usize> = report.rejected.iter().map(|r| r.index).collect();
        assert_eq!(rejected, vec![1, 3]);
        assert_eq!(report.generation, 1);
    }

    #[test]
    fn test_batch_applies_duplicates_in_order() {
        let engine = engine_with(SwitchEncoder::new(32));
        let records = vec![
            raw(r#"{"nct_id": "A", "title": "first text"}"#),
            raw(r#"{"nct_id": "A", "title": "second text"}"#),
        ];
        let report = engine.ingest_batch(&records).unwrap();
        let statuses: Vec<IngestStatus> = report.outcomes.iter().map(|o| o.status).collect();
        assert_eq!(statuses, vec![IngestStatus::Inserted, IngestStatus::Updated]);
        let doc = engine.document(&id("A")).unwrap().unwrap();
        assert_eq!(doc.version, 2);
        assert_eq!(doc.field("title"), Some("second text"));
    }

    #[test]
    fn test_remove_hides_document_before_compaction() {
        let mut config = CtseConfig::in_memory(32);
        config.compaction.tombstone_ratio = 1.0;
        let engine = Engine::open(config).unwrap();
        engine.ingest(&raw(r#"{"nct_id": "A", "title": "cardiac trial"}"#)).unwrap();
        engine.ingest(&raw(r#"{"nct_id": "B", "title": "cardiac study"}"#)).unwrap();
        assert!(engine.remove_document(&id("A")).unwrap());
        assert!(!engine.remove_document(&id("A")).unwrap());

        let response = engine.search("cardiac", &SearchOptions::default()).unwrap();
        let ids: Vec<&str> = response.results.iter().map(|r| r.document_id.as_str()).collect();
        assert_eq!(ids, vec!["B"]);
        assert!(engine.document(&id("A")).unwrap().is_none());
        assert_eq!(engine.stats().unwrap().lexical_dead_entries, 1);
    }

    #[test]
    fn test_late_embedding_happens_outside_commit_lock() {
        let encoder = SwitchEncoder::new(32);
        let engine = engine_with(Arc::clone(&encoder));
        engine.ingest(&raw(r#"{"nct_id": "A", "title": "cardiac trial"}"#)).unwrap();
        engine.ingest(&raw(r#"{"nct_id": "B", "title": "diabetes trial"}"#)).unwrap();

        // prepared while A's vector is current, so it carries no embedding
        let old_base = engine.store.snapshot().unwrap();
        let document = engine
            .normalizer
            .normalize(&raw(r#"{"nct_id": "A", "title": "cardiac trial"}"#))
            .unwrap();
        let prepared = engine.prepare(document, &old_base);
        assert!(prepared.embedding.is_none());

        // A changes before the prepared record reaches the commit
        engine.ingest(&raw(r#"{"nct_id": "A", "title": "cardiac bypass trial"}"#)).unwrap();
        encoder.delay_ms.store(600, Ordering::SeqCst);
        let calls = encoder.calls.load(Ordering::SeqCst);

        let (outcomes, _) = std::thread::scope(|scope| {
            let writer = scope.spawn(|| engine.commit(vec![prepared]));
            std::thread::sleep(Duration::from_millis(100));
            let started = Instant::now();
            assert!(engine.remove_document(&id("B")).unwrap());
            assert!(
                started.elapsed() < Duration::from_millis(400),
                "remove waited {:?} behind an embedding",
                started.elapsed()
            );
            writer.join().unwrap()
        })
        .unwrap();

        assert_eq!(encoder.calls.load(Ordering::SeqCst), calls + 1);
        assert_eq!(outcomes[0].status, IngestStatus::Updated);
        assert_eq!(outcomes[0].version, 3);
        assert!(outcomes[0].vector_error.is_none());
        let snapshot = engine.store.snapshot().unwrap();
        assert_eq!(snapshot.vectors().version_of(&id("A")), Some(3));
        assert!(snapshot.document(&id("B")).is_none());
    }

    #[test]
    fn test_commit_retry_reuses_late_embeddings() {
        let encoder = SwitchEncoder::new(32);
        let engine = engine_with(Arc::clone(&encoder));
        engine.ingest(&raw(r#"{"nct_id": "A", "title": "cardiac trial"}"#)).unwrap();
        let old_base = engine.store.snapshot().unwrap();
        let first = engine
            .normalizer
            .normalize(&raw(r#"{"nct_id": "A", "title": "cardiac trial"}"#))
            .unwrap();
        let second = engine
            .normalizer
            .normalize(&raw(r#"{"nct_id": "C", "title": "asthma study"}"#))
            .unwrap();
        let prepared = vec![engine.prepare(first, &old_base), engine.prepare(second, &old_base)];
        engine.ingest(&raw(r#"{"nct_id": "A", "title": "cardiac bypass trial"}"#)).unwrap();
        let calls = encoder.calls.load(Ordering::SeqCst);

        let (outcomes, generation) = engine.commit(prepared).unwrap();
        // only A needed a late embedding; C kept the one from preparation
        assert_eq!(encoder.calls.load(Ordering::SeqCst), calls + 1);
        let statuses: Vec<IngestStatus> = outcomes.iter().map(|o| o.status).collect();
        assert_eq!(statuses, vec![IngestStatus::Updated, IngestStatus::Inserted]);
        assert_eq!(generation, engine.store.snapshot().unwrap().generation());
        assert_eq!(engine.stats().unwrap().missing_vectors, 0);
    }
}
