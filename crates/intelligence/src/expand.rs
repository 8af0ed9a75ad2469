//! Query expansion
//!
//! Asks the generator for the medical condition a free-text query is
//! about. The answer's terms are added to the lexical terms of the query;
//! the caller ignores failures.

use crate::generator::{GenerationError, GenerationRequest, Generator, GuardedGenerator};
use ctse_core::CallContext;
use std::sync::Arc;

/// System prompt for condition extraction.
pub const SYSTEM_PROMPT: &str = "\
You extract the medical condition from a clinical trial search query.

Reply with the condition name only, on one line, for example:
Condition: type 2 diabetes

If the query names no medical condition, reply with:
Condition: none";

/// Answers longer than this are treated as noise
const MAX_CONDITION_CHARS: usize = 80;

/// Query expansion implementation.
///
/// The trait is object-safe for use as `Arc<dyn QueryExpander>`.
pub trait QueryExpander: Send + Sync {
    /// Extra text to search for alongside `query`, if any.
    fn expand(&self, query: &str, ctx: &CallContext) -> Result<Option<String>, GenerationError>;
}

/// Expander backed by a generative model
#[derive(Debug, Clone)]
pub struct GenerativeExpander {
    generator: GuardedGenerator,
    max_tokens: u32,
}

impl GenerativeExpander {
    /// Expand with `generator`
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        GenerativeExpander {
            generator: GuardedGenerator::new(generator),
            max_tokens: 32,
        }
    }
}

impl QueryExpander for GenerativeExpander {
    fn expand(&self, query: &str, ctx: &CallContext) -> Result<Option<String>, GenerationError> {
        if query.trim().is_empty() {
            return Ok(None);
        }
        let request = GenerationRequest::new(SYSTEM_PROMPT, query, self.max_tokens);
        let text = self.generator.generate(&request, ctx)?;
        Ok(parse_condition(&text))
    }
}

/// Pull the condition out of a model answer.
///
/// Takes the first non-empty line, strips an optional `Condition:` prefix
/// and surrounding quotes. `none`, blank and overlong answers yield `None`.
pub fn parse_condition(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let value = match line.split_once(':') {
        Some((prefix, rest)) if prefix.trim().eq_ignore_ascii_case("condition") => rest,
        _ => line,
    };
    let value = value.trim().trim_matches(|c| c == '"' || c == '\'' || c == '.').trim();
    if value.is_empty()
        || value.eq_ignore_ascii_case("none")
        || value.eq_ignore_ascii_case("n/a")
        || value.chars().count() > MAX_CONDITION_CHARS
    {
        return None;
    }
    Some(value.to_string())
}
