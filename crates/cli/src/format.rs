//! Output formatting for CLI responses.
//!
//! Human mode prints aligned text; JSON mode prints pretty JSON.

use ctse_core::{CtseError, Document, SearchResponse};
use ctse_engine::{CompactionReport, EngineStats, IngestReport, ReindexReport};
use serde::Serialize;

/// Output mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Readable text
    Human,
    /// Pretty JSON
    Json,
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e))
}

/// Format an error
pub fn format_error(err: &CtseError, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => json(&serde_json::json!({ "error": err.to_string() })),
        OutputMode::Human => format!("(error) {}", err),
    }
}

/// Format a search response
pub fn format_search(response: &SearchResponse, mode: OutputMode) -> String {
    if mode == OutputMode::Json {
        return json(response);
    }
    let mut out = String::new();
    if response.results.is_empty() {
        out.push_str("(no results)\n");
    }
    for (rank, r) in response.results.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}. {:<16} fused={:.4} lexical={} vector={}\n",
            rank + 1,
            r.document_id,
            r.fused_score,
            score(r.lexical_score),
            score(r.vector_score),
        ));
    }
    if response.degraded {
        let d = &response.degradation;
        out.push_str("(degraded)");
        if let Some(reason) = &d.query_embedding_failure {
            out.push_str(&format!(" query embedding failed: {};", reason));
        }
        if d.lexical_path_skipped {
            out.push_str(" no lexical terms;");
        }
        if d.documents_missing_vectors > 0 {
            out.push_str(&format!(" {} documents without vectors;", d.documents_missing_vectors));
        }
        if d.stale_vectors_filtered > 0 {
            out.push_str(&format!(" {} stale vectors filtered;", d.stale_vectors_filtered));
        }
        out.push('\n');
    }
    if let Some(reason) = &response.degradation.rerank_fallback {
        out.push_str(&format!("(re-rank skipped) {}\n", reason));
    }
    if let Some(explanation) = &response.explanation {
        out.push_str(&format!("\n{}\n", explanation));
    }
    out
}

fn score(value: Option<f32>) -> String {
    value.map(|s| format!("{:.4}", s)).unwrap_or_else(|| "-".to_string())
}

/// Format an ingest report
///
/// `parse_errors` pairs a location (`line 3`, a file name) with the reason
/// the input never reached the engine.
pub fn format_ingest(file: &str, report: &IngestReport, parse_errors: &[(String, String)], mode: OutputMode) -> String {
    use ctse_engine::IngestStatus::*;
    if mode == OutputMode::Json {
        return json(&serde_json::json!({
            "file": file,
            "report": report,
            "parse_errors": parse_errors
                .iter()
                .map(|(at, reason)| serde_json::json!({ "at": at, "reason": reason }))
                .collect::<Vec<_>>(),
        }));
    }
    let mut out = format!(
        "{}: {} inserted, {} updated, {} unchanged, {} stale, {} rejected, {} without vector (generation {})\n",
        file,
        report.count(Inserted),
        report.count(Updated),
        report.count(Unchanged),
        report.count(Stale),
        report.rejected.len() + parse_errors.len(),
        report.missing_vectors(),
        report.generation
    );
    for (at, reason) in parse_errors {
        out.push_str(&format!("  {}: {}\n", at, reason));
    }
    for rejected in &report.rejected {
        out.push_str(&format!("  record {}: {}\n", rejected.index + 1, rejected.reason));
    }
    out
}

/// Format a stored document
pub fn format_document(doc: &Document, mode: OutputMode) -> String {
    if mode == OutputMode::Json {
        return json(doc);
    }
    let mut out = format!("{} (version {})\n", doc.id, doc.version);
    for field in &doc.fields {
        out.push_str(&format!("  {}: {}\n", field.name, field.text));
    }
    out
}

/// Format index statistics
pub fn format_stats(stats: &EngineStats, mode: OutputMode) -> String {
    if mode == OutputMode::Json {
        return json(stats);
    }
    format!(
        "generation:        {}\n\
         documents:         {}\n\
         terms:             {}\n\
         lexical segments:  {} ({} dead entries)\n\
         vectors:           {} (dimension {})\n\
         vector segments:   {} ({} dead entries)\n\
         missing vectors:   {}\n\
         data dir:          {}\n",
        stats.generation,
        stats.documents,
        stats.terms,
        stats.lexical_segments,
        stats.lexical_dead_entries,
        stats.vectors,
        stats.dimension,
        stats.vector_segments,
        stats.vector_dead_entries,
        stats.missing_vectors,
        stats
            .data_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<memory>".to_string()),
    )
}

/// Format a compaction report
pub fn format_compaction(report: &CompactionReport, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => json(report),
        OutputMode::Human => format!(
            "compacted {} lexical and {} vector segments; dropped {} postings entries and {} vectors (generation {})",
            report.lexical_segments_before,
            report.vector_segments_before,
            report.lexical_entries_dropped,
            report.vectors_dropped,
            report.generation
        ),
    }
}

/// Format a re-index report
pub fn format_reindex(report: &ReindexReport, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => json(report),
        OutputMode::Human => format!(
            "{} attempted, {} repaired, {} still missing (generation {})",
            report.attempted, report.repaired, report.still_missing, report.generation
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctse_core::{DegradationReport, DocumentId, QueryStats, ScoredResult};

    fn response(degradation: DegradationReport) -> SearchResponse {
        SearchResponse {
            results: vec![ScoredResult {
                document_id: DocumentId::new("NCT01").unwrap(),
                lexical_score: Some(1.5),
                vector_score: None,
                fused_score: 0.5,
            }],
            degraded: degradation.is_degraded(),
            degradation,
            reranked: false,
            explanation: None,
            states: Vec::new(),
            stats: QueryStats::default(),
        }
    }

    #[test]
    fn test_human_search_output() {
        let out = format_search(&response(DegradationReport::default()), OutputMode::Human);
        assert!(out.contains("NCT01"));
        assert!(out.contains("lexical=1.5000"));
        assert!(out.contains("vector=-"));
        assert!(!out.contains("degraded"));
    }

    #[test]
    fn test_degraded_output_names_reason() {
        let degradation = DegradationReport {
            documents_missing_vectors: 3,
            ..DegradationReport::default()
        };
        let out = format_search(&response(degradation), OutputMode::Human);
        assert!(out.contains("(degraded)"));
        assert!(out.contains("3 documents without vectors"));
    }

    #[test]
    fn test_json_search_output_parses() {
        let out = format_search(&response(DegradationReport::default()), OutputMode::Json);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["results"][0]["document_id"], "NCT01");
        assert_eq!(value["degraded"], false);
    }
}
