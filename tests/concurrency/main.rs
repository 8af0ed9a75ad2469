//! Concurrency tests: readers against a single writer.
//!
//! Queries read an immutable snapshot; writers publish a new one. Every
//! query must see one generation in full and never fail because of a
//! concurrent ingest, removal or compaction.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn readers_see_consistent_snapshots_during_ingest() {
    let engine = Arc::new(memory_engine());
    scenario(&engine);
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut last_generation = 0;
                let mut queries = 0;
                while !done.load(Ordering::SeqCst) || queries == 0 {
                    let response = engine.search("cardiac trial", &lexical_only()).unwrap();
                    assert!(response.stats.snapshot_generation >= last_generation);
                    last_generation = response.stats.snapshot_generation;
                    // the writer's documents share no terms with the query
                    assert_eq!(ids(&response), vec!["A", "C", "B"]);
                    queries += 1;
                }
                queries
            })
        })
        .collect();

    for i in 0..50 {
        engine
            .ingest(&raw(&format!("W{:03}", i), "pediatric asthma inhaler study"))
            .unwrap();
    }
    done.store(true, Ordering::SeqCst);
    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
    assert_eq!(engine.stats().unwrap().documents, 53);
}

#[test]
fn parallel_writers_serialize_commits() {
    let engine = Arc::new(memory_engine());
    let barrier = Arc::new(Barrier::new(4));

    let writers: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..25 {
                    engine
                        .ingest(&raw(&format!("T{}-{:02}", t, i), "diabetes insulin trial"))
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let stats = engine.stats().unwrap();
    assert_eq!(stats.documents, 100);
    assert_eq!(stats.vectors, 100);
    let response = engine
        .search("insulin", &lexical_only().with_top_k(200))
        .unwrap();
    assert_eq!(response.results.len(), 100);
}

#[test]
fn concurrent_updates_of_one_document_end_at_one_version() {
    let engine = Arc::new(memory_engine());
    let barrier = Arc::new(Barrier::new(3));

    let writers: Vec<_> = (0..3)
        .map(|t| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..10 {
                    engine
                        .ingest(&raw("SHARED", &format!("revision {} from writer {}", i, t)))
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let stats = engine.stats().unwrap();
    assert_eq!(stats.documents, 1);
    let doc = engine.document(&id("SHARED")).unwrap().unwrap();
    assert_eq!(doc.version, 30);
    let response = engine.search("revision", &lexical_only()).unwrap();
    assert_eq!(ids(&response), vec!["SHARED"]);
}

#[test]
fn compaction_does_not_disturb_queries() {
    let mut config = CtseConfig::in_memory(DIM);
    config.compaction.max_segments = 1000;
    config.compaction.tombstone_ratio = 1.0;
    let engine = Arc::new(Engine::open(config).unwrap());
    corpus(&engine);
    for i in 0..20 {
        engine.ingest(&raw(&format!("X{:02}", i), "placebo arm")).unwrap();
        engine.remove_document(&id(&format!("X{:02}", i))).unwrap();
    }
    let expected = ids(&engine.search("cardiac", &lexical_only()).unwrap());
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let done = Arc::clone(&done);
            let expected = expected.clone();
            thread::spawn(move || {
                while !done.load(Ordering::SeqCst) {
                    let response = engine.search("cardiac", &lexical_only()).unwrap();
                    assert_eq!(ids(&response), expected);
                }
            })
        })
        .collect();

    for _ in 0..5 {
        engine.compact().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(engine.stats().unwrap().lexical_segments, 1);
}

#[test]
fn batch_ingest_alongside_removal() {
    let engine = Arc::new(memory_engine());
    corpus(&engine);
    let batch: Vec<RawRecord> = (0..40)
        .map(|i| raw(&format!("B{:02}", i), "gestational diabetes screening"))
        .collect();

    let remover = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for i in 1..=5 {
                engine.remove_document(&id(&format!("NCT{:03}", i))).unwrap();
            }
        })
    };
    let report = engine.ingest_batch(&batch).unwrap();
    remover.join().unwrap();

    assert_eq!(report.count(IngestStatus::Inserted), 40);
    assert_eq!(engine.stats().unwrap().documents, 45);
}

#[test]
fn slow_embedding_does_not_hold_up_other_writers() {
    let encoder = Arc::new(FaultyEncoder::new());
    let engine = Arc::new(
        Engine::builder(CtseConfig::in_memory(DIM))
            .encoder(encoder.clone())
            .build()
            .unwrap(),
    );
    scenario(&engine);
    encoder.set_delay(Duration::from_millis(600));

    let slow = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.ingest(&raw("D", "pediatric asthma inhaler study")).unwrap())
    };
    thread::sleep(Duration::from_millis(100));
    let started = Instant::now();
    assert!(engine.remove_document(&id("B")).unwrap());
    assert!(started.elapsed() < Duration::from_millis(400));

    let outcome = slow.join().unwrap();
    assert_eq!(outcome.status, IngestStatus::Inserted);
    assert!(outcome.vector_error.is_none());
    let response = engine.search("cardiac trial", &lexical_only()).unwrap();
    assert_eq!(ids(&response), vec!["A", "C"]);
    assert_eq!(engine.stats().unwrap().documents, 3);
}
