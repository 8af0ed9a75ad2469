//! Prompt template for re-ranking trial records

/// System prompt for relevance scoring.
///
/// Instructs the model to output `N: score` lines for each numbered trial,
/// followed by one `Explanation:` line.
pub const SYSTEM_PROMPT: &str = "\
You are a clinical trial search assistant. Given a patient query and numbered \
clinical trial records, score each trial's relevance to the query from 0 to 10.

Output format (no other text):
1: <score>
2: <score>
...
Explanation: <one or two sentences on why the best trials match>

Rules:
- Score 0 = completely irrelevant, 10 = perfect match
- Score every trial listed
- Do not invent facts that are not in the records";

/// Build the user prompt: the query and numbered, pre-truncated trial texts.
pub fn build_rerank_prompt(query: &str, snippets: &[String]) -> String {
    let mut prompt = format!("Query: {}\n\nTrials:", query);
    for (i, text) in snippets.iter().enumerate() {
        prompt.push_str(&format!("\n{}. {}", i + 1, text));
    }
    prompt
}
