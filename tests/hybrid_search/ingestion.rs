//! Ingestion as seen by queries: versions, idempotence and removal

use crate::common::*;

#[test]
fn reingest_replaces_previous_version() {
    let engine = memory_engine();
    scenario(&engine);
    let outcome = engine.ingest(&raw("A", "asthma inhaler trial")).unwrap();
    assert_eq!(outcome.status, IngestStatus::Updated);
    assert_eq!(outcome.version, 2);

    let response = engine.search("cardiac", &lexical_only()).unwrap();
    assert_eq!(ids(&response), vec!["C"]);
    let response = engine.search("asthma", &SearchOptions::default()).unwrap();
    assert_eq!(response.results[0].document_id.as_str(), "A");
    assert_eq!(engine.stats().unwrap().documents, 3);
}

#[test]
fn identical_reingest_is_a_no_op() {
    let engine = memory_engine();
    scenario(&engine);
    let generation = engine.stats().unwrap().generation;
    let outcome = engine.ingest(&raw("A", "cardiac arrhythmia trial")).unwrap();
    assert_eq!(outcome.status, IngestStatus::Unchanged);
    assert_eq!(outcome.version, 1);
    assert_eq!(engine.stats().unwrap().generation, generation);
}

#[test]
fn older_explicit_version_is_ignored() {
    let engine = memory_engine();
    engine.ingest(&raw_versioned("A", "cardiac trial", 5)).unwrap();
    let outcome = engine.ingest(&raw_versioned("A", "asthma trial", 3)).unwrap();
    assert_eq!(outcome.status, IngestStatus::Stale);
    let doc = engine.document(&id("A")).unwrap().unwrap();
    assert_eq!(doc.version, 5);
    assert_eq!(doc.field("title"), Some("cardiac trial"));
}

#[test]
fn batch_reports_rejected_records_by_position() {
    let engine = memory_engine();
    let records = vec![
        raw("A", "cardiac trial"),
        RawRecord::new(serde_json::json!({ "brief_title": "no identifier" })),
        raw("B", "diabetes trial"),
        raw("C", "   "),
    ];
    let report = engine.ingest_batch(&records).unwrap();
    assert_eq!(report.count(IngestStatus::Inserted), 2);
    let rejected: Vec<usize> = report.rejected.iter().map(|r| r.index).collect();
    assert_eq!(rejected, vec![1, 3]);
    assert_eq!(engine.stats().unwrap().documents, 2);
}

#[test]
fn batch_publishes_one_generation() {
    let engine = memory_engine();
    let records: Vec<RawRecord> = (0..20)
        .map(|i| raw(&format!("NCT{:03}", i), &format!("trial number {}", i)))
        .collect();
    let report = engine.ingest_batch(&records).unwrap();
    assert_eq!(report.generation, 1);
    assert_eq!(engine.stats().unwrap().documents, 20);
    assert_eq!(engine.stats().unwrap().vectors, 20);
}

#[test]
fn removed_document_disappears_from_both_paths() {
    let engine = memory_engine();
    scenario(&engine);
    assert!(engine.remove_document(&id("A")).unwrap());
    assert!(!engine.remove_document(&id("A")).unwrap());

    let response = engine.search("cardiac arrhythmia trial", &SearchOptions::default()).unwrap();
    assert!(!ids(&response).contains(&"A".to_string()));
    assert!(engine.document(&id("A")).unwrap().is_none());
}

#[test]
fn original_text_is_returned_untokenized() {
    let engine = memory_engine();
    engine
        .ingest(&trial("NCT9", "HbA1c in Type-2 Diabetes", "Diabetes", "The effect of X."))
        .unwrap();
    let doc = engine.document(&id("NCT9")).unwrap().unwrap();
    assert_eq!(doc.field("title"), Some("HbA1c in Type-2 Diabetes"));
    assert_eq!(doc.field("summary"), Some("The effect of X."));
}
