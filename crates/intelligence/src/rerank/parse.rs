//! Parsing of re-rank responses

use super::RerankScore;

/// Parsed model answer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    /// Scores keyed by 0-based candidate index, in response order
    pub scores: Vec<RerankScore>,
    /// Free-text explanation, if the model gave one
    pub explanation: Option<String>,
}

/// Parse `N: score` lines and an optional `Explanation:` line.
///
/// `N` is 1-based over `candidates` entries; scores are clamped to
/// `[0, 10]` and normalized to `[0, 1]`. The first score for a candidate
/// wins. Lines after `Explanation:` that are not score lines continue the
/// explanation.
pub fn parse_rerank_response(text: &str, candidates: usize) -> ParsedResponse {
    let mut parsed = ParsedResponse::default();
    let mut explanation: Option<Vec<&str>> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = strip_prefix_ignore_case(line, "explanation:") {
            explanation = Some(vec![rest.trim()]);
            continue;
        }
        match parse_score_line(line, candidates) {
            Some(score) => {
                if !parsed.scores.iter().any(|s| s.index == score.index) {
                    parsed.scores.push(score);
                }
            }
            None => {
                if let Some(parts) = explanation.as_mut() {
                    parts.push(line);
                }
            }
        }
    }

    parsed.explanation = explanation
        .map(|parts| parts.into_iter().filter(|p| !p.is_empty()).collect::<Vec<_>>().join(" "))
        .filter(|e| !e.is_empty());
    parsed
}

fn parse_score_line(line: &str, candidates: usize) -> Option<RerankScore> {
    let (num_part, score_part) = line.split_once(':')?;
    let line_num: usize = num_part.trim().trim_end_matches('.').parse().ok()?;
    let score_part = score_part.trim();
    let score_part = score_part.strip_suffix("/10").unwrap_or(score_part).trim();
    let raw: f32 = score_part.parse().ok()?;
    if line_num == 0 || line_num > candidates || !raw.is_finite() {
        return None;
    }
    Some(RerankScore {
        index: line_num - 1,
        relevance_score: raw.clamp(0.0, 10.0) / 10.0,
    })
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}
