//! Persist and reopen

use crate::common::*;
use std::sync::Arc;

#[test]
fn reopen_restores_documents_and_rankings() {
    let dir = TempDir::new().unwrap();
    let before = {
        let engine = Engine::open(disk_config(dir.path())).unwrap();
        corpus(&engine);
        let response = engine.search("cardiac function", &SearchOptions::default()).unwrap();
        engine.close().unwrap();
        ids(&response)
    };

    let engine = Engine::open(disk_config(dir.path())).unwrap();
    let stats = engine.stats().unwrap();
    assert_eq!(stats.documents, 10);
    assert_eq!(stats.vectors, 10);
    assert_eq!(stats.missing_vectors, 0);
    let after = engine.search("cardiac function", &SearchOptions::default()).unwrap();
    assert_eq!(ids(&after), before);
}

#[test]
fn auto_persist_survives_drop_without_close() {
    let dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(disk_config(dir.path())).unwrap();
        scenario(&engine);
    }
    let engine = Engine::open(disk_config(dir.path())).unwrap();
    assert_eq!(engine.stats().unwrap().documents, 3);
    let doc = engine.document(&id("B")).unwrap().unwrap();
    assert_eq!(doc.field("title"), Some("diabetes type 2 trial"));
}

#[test]
fn manual_persist_when_auto_persist_is_off() {
    let dir = TempDir::new().unwrap();
    let mut config = disk_config(dir.path());
    config.ingest.auto_persist = false;
    let engine = Engine::open(config.clone()).unwrap();
    scenario(&engine);

    let outcome = engine.persist().unwrap().expect("first persist writes");
    assert_eq!(outcome.generation, engine.stats().unwrap().generation);
    assert!(outcome.directory.is_dir());
    assert!(engine.persist().unwrap().is_none());
    drop(engine);

    let engine = Engine::open(config).unwrap();
    assert_eq!(engine.stats().unwrap().documents, 3);
}

#[test]
fn current_names_the_persisted_generation() {
    let (dir, engine) = disk_engine();
    scenario(&engine);
    let generation = engine.stats().unwrap().generation;

    let paths = ctse::durability::StorePaths::from_root(dir.path());
    let pointer = std::fs::read_to_string(paths.current()).unwrap();
    assert_eq!(
        pointer.trim(),
        ctse::durability::paths::snapshot_dir_name(generation)
    );
    assert!(paths.snapshot_dir(generation).is_dir());
}

#[test]
fn removal_is_persisted() {
    let dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(disk_config(dir.path())).unwrap();
        scenario(&engine);
        engine.remove_document(&id("C")).unwrap();
        engine.close().unwrap();
    }
    let engine = Engine::open(disk_config(dir.path())).unwrap();
    assert!(engine.document(&id("C")).unwrap().is_none());
    let response = engine.search("cardiac", &lexical_only()).unwrap();
    assert_eq!(ids(&response), vec!["A"]);
}

#[test]
fn dimension_change_serves_lexical_until_reindexed() {
    let dir = TempDir::new().unwrap();
    {
        let engine = Engine::open(disk_config(dir.path())).unwrap();
        scenario(&engine);
        engine.close().unwrap();
    }

    let mut config = disk_config(dir.path());
    config.encoder.dimension = 32;
    let engine = Engine::open(config).unwrap();
    let stats = engine.stats().unwrap();
    assert_eq!(stats.dimension, 32);
    assert_eq!(stats.vectors, 0);
    assert_eq!(stats.missing_vectors, 3);

    let response = engine.search("cardiac trial", &SearchOptions::default()).unwrap();
    assert!(response.degraded);
    assert_eq!(response.degradation.documents_missing_vectors, 3);
    assert_eq!(response.results[0].document_id.as_str(), "A");

    let report = engine.reindex_missing().unwrap();
    assert_eq!(report.repaired, 3);
    let response = engine.search("cardiac trial", &SearchOptions::default()).unwrap();
    assert!(!response.degraded);
}

#[test]
fn missing_vector_reason_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let engine = Engine::builder(disk_config(dir.path()))
            .encoder(Arc::new(FaultyEncoder::failing_on("zzfail")))
            .build()
            .unwrap();
        scenario(&engine);
        engine.ingest(&raw("D", "cardiac zzfail trial")).unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open(disk_config(dir.path())).unwrap();
    let missing = engine.missing_vectors().unwrap();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].0.as_str(), "D");
    assert_eq!(missing[0].1.attempts, 1);

    // the local encoder has no trouble with the marker
    let report = engine.reindex_missing().unwrap();
    assert_eq!(report.repaired, 1);
    assert!(engine.missing_vectors().unwrap().is_empty());
}

#[test]
fn closed_engine_is_unavailable() {
    let (_dir, engine) = disk_engine();
    scenario(&engine);
    engine.close().unwrap();
    engine.close().unwrap();
    assert!(matches!(
        engine.search("cardiac", &SearchOptions::default()),
        Err(CtseError::IndexUnavailable(_))
    ));
    assert!(matches!(
        engine.ingest(&raw("E", "asthma trial")),
        Err(CtseError::IndexUnavailable(_))
    ));
}
