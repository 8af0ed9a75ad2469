//! Encoder failures at ingest and query time

use crate::common::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn engine_with(encoder: Arc<FaultyEncoder>) -> Engine {
    let mut config = CtseConfig::in_memory(DIM);
    config.encoder.timeout_ms = 100;
    Engine::builder(config).encoder(encoder).build().unwrap()
}

#[test]
fn document_without_vector_is_still_found_lexically() {
    let engine = engine_with(Arc::new(FaultyEncoder::failing_on("zzfail")));
    scenario(&engine);
    let outcome = engine.ingest(&raw("D", "cardiac zzfail registry")).unwrap();
    assert_eq!(outcome.status, IngestStatus::Inserted);
    assert!(outcome.vector_error.is_some());

    let response = engine.search("cardiac", &SearchOptions::default()).unwrap();
    assert!(ids(&response).contains(&"D".to_string()));
    let d = response
        .results
        .iter()
        .find(|r| r.document_id.as_str() == "D")
        .unwrap();
    assert!(d.lexical_score.is_some());
    assert!(d.vector_score.is_none());
    assert!(response.degraded);
    assert_eq!(response.degradation.documents_missing_vectors, 1);
}

#[test]
fn batch_with_failing_embeddings_commits_everything() {
    let engine = engine_with(Arc::new(FaultyEncoder::failing_on("zzfail")));
    let records = vec![
        raw("A", "cardiac trial"),
        raw("B", "zzfail diabetes trial"),
        raw("C", "zzfail asthma trial"),
    ];
    let report = engine.ingest_batch(&records).unwrap();
    assert_eq!(report.count(IngestStatus::Inserted), 3);
    assert_eq!(report.missing_vectors(), 2);
    assert_eq!(engine.stats().unwrap().missing_vectors, 2);
}

#[test]
fn query_embedding_failure_falls_back_to_lexical() {
    let engine = engine_with(Arc::new(FaultyEncoder::failing_on("zzfail")));
    scenario(&engine);
    let response = engine.search("cardiac zzfail", &SearchOptions::default()).unwrap();
    assert!(response.degraded);
    assert!(response.degradation.query_embedding_failure.is_some());
    assert_eq!(response.stats.vector_candidates, 0);
    assert_eq!(ids(&response), vec!["A", "C"]);
}

#[test]
fn slow_encoder_times_out_and_degrades() {
    let encoder = Arc::new(FaultyEncoder::new());
    let engine = engine_with(encoder.clone());
    scenario(&engine);

    encoder.set_delay(Duration::from_millis(1_000));
    let started = Instant::now();
    let response = engine.search("cardiac trial", &SearchOptions::default()).unwrap();
    assert!(started.elapsed() < Duration::from_millis(900));
    assert!(response.degraded);
    let reason = response.degradation.query_embedding_failure.clone().unwrap();
    assert!(reason.contains("timed out"), "{}", reason);
    assert_eq!(ids(&response)[0], "A");
}

#[test]
fn query_timeout_bounds_the_encoder_call() {
    let encoder = Arc::new(FaultyEncoder::new());
    let mut config = CtseConfig::in_memory(DIM);
    config.encoder.timeout_ms = 10_000;
    let engine = Engine::builder(config).encoder(encoder.clone()).build().unwrap();
    scenario(&engine);

    encoder.set_delay(Duration::from_millis(2_000));
    let started = Instant::now();
    let response = engine
        .search("cardiac", &SearchOptions::default().with_timeout_ms(100))
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(1_500));
    assert!(response.degradation.query_embedding_failure.is_some());
}

#[test]
fn cancellation_during_encoding_returns_nothing() {
    let encoder = Arc::new(FaultyEncoder::new());
    let mut config = CtseConfig::in_memory(DIM);
    config.encoder.timeout_ms = 10_000;
    let engine = Engine::builder(config).encoder(encoder.clone()).build().unwrap();
    scenario(&engine);

    encoder.set_delay(Duration::from_millis(2_000));
    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            token.cancel();
        })
    };
    let started = Instant::now();
    let result = engine.search_with_cancel("cardiac", &SearchOptions::default(), &token);
    canceller.join().unwrap();
    assert!(matches!(result, Err(CtseError::Cancelled)));
    assert!(started.elapsed() < Duration::from_millis(1_500));
}

#[test]
fn lexical_only_query_never_calls_the_encoder() {
    let encoder = Arc::new(FaultyEncoder::new());
    let engine = engine_with(encoder.clone());
    scenario(&engine);
    let calls = encoder.calls();
    engine.search("cardiac", &lexical_only()).unwrap();
    assert_eq!(encoder.calls(), calls);
}

#[test]
fn stopword_query_with_vector_weight_skips_lexical_path() {
    let engine = memory_engine();
    scenario(&engine);
    let response = engine.search("the trial of", &vector_only()).unwrap();
    assert!(!response.degradation.lexical_path_skipped);

    let response = engine.search("of the", &SearchOptions::default()).unwrap();
    assert!(response.degradation.lexical_path_skipped);
    assert!(response.degraded);
    assert_eq!(response.stats.lexical_candidates, 0);
}
