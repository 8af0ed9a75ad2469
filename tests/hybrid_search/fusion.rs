//! Fusion weight laws

use crate::common::*;

fn scores(response: &SearchResponse) -> Vec<(String, Option<f32>, Option<f32>)> {
    response
        .results
        .iter()
        .map(|r| (r.document_id.as_str().to_string(), r.lexical_score, r.vector_score))
        .collect()
}

#[test]
fn lexical_weight_one_matches_pure_bm25_order() {
    let engine = memory_engine();
    corpus(&engine);
    let response = engine.search("cardiac glucose", &lexical_only()).unwrap();
    let lexical: Vec<f32> = response.results.iter().map(|r| r.lexical_score.unwrap()).collect();
    for pair in lexical.windows(2) {
        assert!(pair[0] >= pair[1]);
    }
}

#[test]
fn vector_weight_one_matches_pure_similarity_order() {
    let engine = memory_engine();
    corpus(&engine);
    let response = engine.search("glucose control", &vector_only()).unwrap();
    assert!(!response.results.is_empty());
    let sims: Vec<f32> = response.results.iter().map(|r| r.vector_score.unwrap()).collect();
    for pair in sims.windows(2) {
        assert!(pair[0] >= pair[1]);
    }
    assert!(response.results.iter().all(|r| r.lexical_score.is_none()));
}

#[test]
fn zero_weight_path_adds_no_candidates() {
    let engine = memory_engine();
    corpus(&engine);
    // "asthma" matches two trials lexically; the vector path would return
    // every trial as a neighbor.
    let response = engine.search("asthma", &lexical_only().with_top_k(10)).unwrap();
    assert_eq!(response.results.len(), 2);
}

#[test]
fn fused_scores_stay_in_unit_range() {
    let engine = memory_engine();
    corpus(&engine);
    let options = SearchOptions::default().with_weights(FusionWeights::new(0.3, 0.7).unwrap());
    let response = engine.search("cardiac surgery", &options).unwrap();
    assert!(response
        .results
        .iter()
        .all(|r| (0.0..=1.0 + 1e-6).contains(&r.fused_score)));
}

#[test]
fn require_both_keeps_only_documents_on_both_lists() {
    let engine = memory_engine();
    corpus(&engine);
    let response = engine
        .search("diabetes", &SearchOptions::default().with_require_both(true))
        .unwrap();
    assert!(!response.results.is_empty());
    for (id, lexical, vector) in scores(&response) {
        assert!(lexical.is_some() && vector.is_some(), "{} is on one list only", id);
    }
}

#[test]
fn invalid_weights_are_rejected() {
    assert!(FusionWeights::new(-0.5, 1.0).is_err());
    assert!(FusionWeights::new(0.0, 0.0).is_err());
}

#[test]
fn shifting_weight_moves_vector_favorite_up() {
    let engine = memory_engine();
    scenario(&engine);
    // identical text to B; lexically it only shares "trial"
    let query = "diabetes type 2 trial";
    let heavy_vector = SearchOptions::default().with_weights(FusionWeights::new(0.1, 0.9).unwrap());
    let response = engine.search(query, &heavy_vector).unwrap();
    assert_eq!(response.results[0].document_id.as_str(), "B");
}
