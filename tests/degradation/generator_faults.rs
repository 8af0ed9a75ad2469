//! Re-ranking and query expansion when the generator misbehaves

use crate::common::*;
use std::sync::Arc;

fn engine_with(generator: ScriptedGenerator) -> Engine {
    Engine::builder(CtseConfig::in_memory(DIM))
        .generator(Arc::new(generator))
        .build()
        .unwrap()
}

#[test]
fn rerank_reorders_by_model_scores() {
    let engine = engine_with(ScriptedGenerator::always(Ok(
        "1: 0\n2: 0\n3: 10\nExplanation: Z lists pediatric dosing.".to_string(),
    )));
    for id in ["X", "Y", "Z"] {
        engine.ingest(&raw(id, "asthma inhaler")).unwrap();
    }
    let plain = engine.search("asthma", &lexical_only()).unwrap();
    assert_eq!(ids(&plain), vec!["X", "Y", "Z"]);

    let response = engine
        .search("asthma", &lexical_only().with_rerank(true))
        .unwrap();
    assert!(response.reranked);
    assert_eq!(ids(&response), vec!["Z", "X", "Y"]);
    assert_eq!(
        response.explanation.as_deref(),
        Some("Z lists pediatric dosing.")
    );
}

#[test]
fn generator_failure_keeps_fused_order() {
    let engine = engine_with(ScriptedGenerator::always(Err(GenerationError::Unavailable(
        "503 service unavailable".to_string(),
    ))));
    scenario(&engine);
    let response = engine
        .search("cardiac trial", &lexical_only().with_rerank(true))
        .unwrap();
    assert!(!response.reranked);
    assert_eq!(ids(&response), vec!["A", "C", "B"]);
    assert!(response.degradation.rerank_fallback.is_some());
    assert!(!response.states.contains(&QueryState::ReRanked));
}

#[test]
fn unparseable_answer_keeps_fused_order() {
    let engine = engine_with(ScriptedGenerator::always(Ok("I cannot rank these.".to_string())));
    scenario(&engine);
    let response = engine
        .search("cardiac trial", &lexical_only().with_rerank(true))
        .unwrap();
    assert!(!response.reranked);
    assert_eq!(ids(&response), vec!["A", "C", "B"]);
    assert!(response.degradation.rerank_fallback.is_some());
}

#[test]
fn expansion_failure_is_ignored() {
    let engine = engine_with(ScriptedGenerator::then(
        Err(GenerationError::Unavailable("connection reset".to_string())),
        Ok("Condition: diabetes".to_string()),
    ));
    scenario(&engine);
    let response = engine
        .search("cardiac", &lexical_only().with_expansion(true))
        .unwrap();
    assert_eq!(ids(&response), vec!["A", "C"]);

    let response = engine
        .search("cardiac", &lexical_only().with_expansion(true))
        .unwrap();
    assert_eq!(ids(&response).len(), 3);
}

#[test]
fn rerank_prompt_carries_document_text() {
    let generator = Arc::new(ScriptedGenerator::always(Ok("1: 5".to_string())));
    let engine = Engine::builder(CtseConfig::in_memory(DIM))
        .generator(generator.clone())
        .build()
        .unwrap();
    scenario(&engine);
    engine
        .search("bypass", &lexical_only().with_rerank(true))
        .unwrap();
    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("cardiac bypass study"));
    assert!(prompts[0].contains("bypass"));
}
