//! Query translation
//!
//! Asks the generator for an English rendering of a query written in
//! another language. The translation is searched next to the original
//! query; the caller ignores failures.

use crate::generator::{GenerationError, GenerationRequest, Generator, GuardedGenerator};
use ctse_core::CallContext;
use std::sync::Arc;

/// System prompt for translation.
pub const SYSTEM_PROMPT: &str = "\
You translate clinical trial search queries into English.

Reply with the English query only, on one line, for example:
Translation: breast cancer immunotherapy

If the query is already English, repeat it unchanged.";

/// Longer answers are the model talking, not translating
const MAX_TRANSLATION_CHARS: usize = 300;

/// Query translator implementation.
///
/// The trait is object-safe for use as `Arc<dyn QueryTranslator>`.
pub trait QueryTranslator: Send + Sync {
    /// English rendering of `query`, or `None` when it adds nothing.
    fn translate(&self, query: &str, ctx: &CallContext) -> Result<Option<String>, GenerationError>;
}

/// Translator backed by a generative model
#[derive(Debug, Clone)]
pub struct GenerativeTranslator {
    generator: GuardedGenerator,
    max_tokens: u32,
}

impl GenerativeTranslator {
    /// Translate with `generator`
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        GenerativeTranslator {
            generator: GuardedGenerator::new(generator),
            max_tokens: 96,
        }
    }
}

impl QueryTranslator for GenerativeTranslator {
    fn translate(&self, query: &str, ctx: &CallContext) -> Result<Option<String>, GenerationError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(None);
        }
        let request = GenerationRequest::new(SYSTEM_PROMPT, query, self.max_tokens);
        let text = self.generator.generate(&request, ctx)?;
        Ok(parse_translation(&text).filter(|t| !t.eq_ignore_ascii_case(query)))
    }
}

/// Pull the translation out of a model answer.
///
/// First non-empty line, optional `Translation:` prefix and quotes removed.
/// Blank and overlong answers yield `None`.
pub fn parse_translation(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let value = match line.split_once(':') {
        Some((prefix, rest)) if prefix.trim().eq_ignore_ascii_case("translation") => rest,
        _ => line,
    };
    let value = value.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if value.is_empty() || value.chars().count() > MAX_TRANSLATION_CHARS {
        return None;
    }
    Some(value.to_string())
}
