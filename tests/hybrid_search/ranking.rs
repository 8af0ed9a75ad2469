//! Ranking behavior of single-path and hybrid queries

use crate::common::*;
use std::sync::Arc;

#[test]
fn lexical_scenario_orders_by_bm25() {
    let engine = memory_engine();
    scenario(&engine);
    let response = engine.search("cardiac trial", &lexical_only()).unwrap();
    assert_eq!(ids(&response), vec!["A", "C", "B"]);
    assert!(response.results.iter().all(|r| r.vector_score.is_none()));
    assert!(!response.degraded);
}

#[test]
fn vector_only_finds_identical_text_first() {
    let engine = memory_engine();
    scenario(&engine);
    let response = engine.search("diabetes type 2 trial", &vector_only()).unwrap();
    let top = &response.results[0];
    assert_eq!(top.document_id.as_str(), "B");
    assert!(top.lexical_score.is_none());
    assert!((top.vector_score.unwrap() - 1.0).abs() < 1e-4);
}

#[test]
fn hybrid_default_uses_both_paths() {
    let engine = memory_engine();
    corpus(&engine);
    let response = engine.search("cardiac arrhythmia", &SearchOptions::default()).unwrap();
    assert_eq!(response.results[0].document_id.as_str(), "NCT001");
    assert!(response.stats.lexical_candidates > 0);
    assert!(response.stats.vector_candidates > 0);
    assert!(!response.degraded);
}

#[test]
fn results_are_sorted_with_id_tiebreak() {
    let engine = memory_engine();
    corpus(&engine);
    let response = engine.search("diabetes glucose", &SearchOptions::default()).unwrap();
    for pair in response.results.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(
            a.fused_score > b.fused_score
                || (a.fused_score == b.fused_score && a.document_id < b.document_id),
            "{:?} before {:?}",
            a,
            b
        );
    }
}

#[test]
fn top_k_bounds_result_count() {
    let engine = memory_engine();
    corpus(&engine);
    for k in [1, 3, 5] {
        let response = engine
            .search("cardiac", &SearchOptions::default().with_top_k(k))
            .unwrap();
        assert!(response.results.len() <= k);
    }
}

#[test]
fn field_weights_favor_title_matches() {
    let engine = memory_engine();
    engine
        .ingest(&trial("T", "Asthma inhaler study", "lung disease", "adults"))
        .unwrap();
    engine
        .ingest(&trial("S", "Lung function study", "lung disease", "asthma inhaler in adults"))
        .unwrap();
    let response = engine.search("asthma inhaler", &lexical_only()).unwrap();
    assert_eq!(ids(&response), vec!["T", "S"]);
}

#[test]
fn stopword_only_query_is_empty() {
    let engine = memory_engine();
    scenario(&engine);
    let err = engine.search("the and of", &lexical_only()).unwrap_err();
    assert!(matches!(err, CtseError::EmptyQuery));
}

#[test]
fn query_states_are_recorded_in_order() {
    let engine = memory_engine();
    scenario(&engine);
    let response = engine.search("cardiac", &SearchOptions::default()).unwrap();
    assert_eq!(response.states.first(), Some(&QueryState::Received));
    assert_eq!(response.states.last(), Some(&QueryState::Completed));
    for pair in response.states.windows(2) {
        assert!(pair[0].can_transition_to(&pair[1]));
    }
}

#[test]
fn empty_index_returns_no_results() {
    let engine = memory_engine();
    let response = engine.search("cardiac", &SearchOptions::default()).unwrap();
    assert!(response.results.is_empty());
}

#[test]
fn plural_query_matches_singular_titles() {
    let engine = memory_engine();
    scenario(&engine);
    let plural = engine.search("trials", &lexical_only()).unwrap();
    assert_eq!(ids(&plural), vec!["A", "B"]);
    let singular = engine.search("trial", &lexical_only()).unwrap();
    assert_eq!(ids(&plural), ids(&singular));
}

#[test]
fn qualifying_letter_separates_hepatitis_types() {
    let engine = memory_engine();
    engine.ingest(&raw("A", "hepatitis c antiviral")).unwrap();
    engine.ingest(&raw("B", "hepatitis b vaccine")).unwrap();
    let response = engine.search("hepatitis c", &lexical_only()).unwrap();
    assert_eq!(ids(&response), vec!["A", "B"]);
    let (a, b) = (&response.results[0], &response.results[1]);
    assert!(a.lexical_score.unwrap() > b.lexical_score.unwrap());
    assert!(a.fused_score > b.fused_score);
}

#[test]
fn feedback_expansion_reaches_documents_sharing_feedback_terms() {
    let engine = memory_engine();
    corpus(&engine);

    let plain = engine.search("arrhythmia", &lexical_only()).unwrap();
    assert_eq!(ids(&plain), vec!["NCT001"]);

    let expanded = engine
        .search("arrhythmia", &lexical_only().with_feedback_expansion(true))
        .unwrap();
    let found = ids(&expanded);
    assert_eq!(found[0], "NCT001");
    // reached through "cardiac", which the query never mentions
    assert!(found.contains(&"NCT006".to_string()));
    assert!(!found.contains(&"NCT004".to_string()));
}

#[test]
fn translated_query_is_expanded_and_searched() {
    let generator = Arc::new(ScriptedGenerator::then(
        Ok("Translation: insulin pump".into()),
        Ok("Condition: diabetes".into()),
    ));
    let engine = Engine::builder(CtseConfig::in_memory(DIM))
        .generator(generator.clone())
        .build()
        .unwrap();
    corpus(&engine);

    let options = lexical_only().with_translation(true).with_expansion(true);
    let response = engine.search("bomba de insulina", &options).unwrap();
    assert_eq!(ids(&response)[0], "NCT002");
    assert!(ids(&response).contains(&"NCT009".to_string()));
    assert_eq!(
        generator.prompts(),
        vec!["bomba de insulina".to_string(), "insulin pump".to_string()]
    );
}
