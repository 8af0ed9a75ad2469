//! Tokenizer shared by ingestion and query processing
//!
//! Ingestion and querying must see identical terms, so both go through
//! this module:
//! - Lowercase
//! - Split on non-alphanumeric characters, stripping English possessives
//! - Drop single letters unless they qualify the term before them
//!   ("hepatitis c", "vitamin d"); single digits are always kept ("type 2")
//! - Drop English stopwords
//! - Snowball (Porter2) English stemming, so "trials" matches "trial"

use rust_stemmers::{Algorithm, Stemmer};

/// English stopwords removed before indexing
const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be",
    "because", "been", "before", "being", "between", "both", "but", "by", "can", "could", "did",
    "do", "does", "doing", "during", "each", "for", "from", "further", "had", "has", "have",
    "having", "he", "her", "here", "hers", "him", "his", "how", "if", "in", "into", "is", "it",
    "its", "itself", "me", "more", "most", "my", "no", "nor", "not", "of", "off", "on", "once",
    "only", "or", "other", "our", "ours", "out", "over", "own", "same", "she", "should", "so",
    "some", "such", "than", "that", "the", "their", "theirs", "them", "then", "there", "these",
    "they", "this", "those", "through", "to", "too", "under", "until", "up", "very", "was", "we",
    "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with",
    "would", "you", "your", "yours",
];

/// Whether a lowercased token is a stopword
pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

fn is_apostrophe(c: char) -> bool {
    c == '\'' || c == '\u{2019}'
}

/// `crohn's` → `crohn`; other apostrophes are dropped (`don't` → `dont`).
fn strip_possessive(word: &str) -> String {
    let stem = word
        .strip_suffix("'s")
        .or_else(|| word.strip_suffix("\u{2019}s"))
        .unwrap_or(word);
    stem.chars().filter(|c| !is_apostrophe(*c)).collect()
}

/// Tokenize text into searchable terms
///
/// # Example
///
/// ```
/// use ctse_search::tokenizer::tokenize;
///
/// let tokens = tokenize("Cardiac Trials in 2024");
/// assert_eq!(tokens, vec!["cardiac", "trial", "2024"]);
/// ```
pub fn tokenize(text: &str) -> Vec<String> {
    let stemmer = Stemmer::create(Algorithm::English);
    let lowered = text.to_lowercase();
    let mut out = Vec::new();
    let mut previous_kept = false;
    for raw in lowered.split(|c: char| !(c.is_alphanumeric() || is_apostrophe(c))) {
        let word = strip_possessive(raw);
        let mut chars = word.chars();
        let keep = match (chars.next(), chars.next()) {
            // runs of separators do not break a "term letter" pair
            (None, _) => continue,
            (Some(c), None) => c.is_ascii_digit() || (previous_kept && !is_stopword(&word)),
            _ => !is_stopword(&word),
        };
        if keep {
            out.push(stemmer.stem(&word).into_owned());
        }
        previous_kept = keep && word.chars().count() > 1;
    }
    out
}

/// Tokenize and record each term's position among the kept tokens
pub fn tokenize_with_positions(text: &str) -> Vec<(String, u32)> {
    tokenize(text)
        .into_iter()
        .enumerate()
        .map(|(pos, term)| (term, pos as u32))
        .collect()
}

/// Tokenize and deduplicate for query processing (first occurrence order)
///
/// # Example
///
/// ```
/// use ctse_search::tokenizer::tokenize_unique;
///
/// let tokens = tokenize_unique("trial TRIAL the trial");
/// assert_eq!(tokens, vec!["trial"]);
/// ```
pub fn tokenize_unique(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokenize(text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_stopword_list_sorted() {
        let mut sorted = STOPWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOPWORDS);
    }

    #[test]
    fn test_tokenize_basic() {
        let tokens = tokenize("Cardiac Arrhythmia Trial");
        assert_eq!(tokens, vec!["cardiac", "arrhythmia", "trial"]);
    }

    #[test]
    fn test_tokenize_drops_stopwords() {
        let tokens = tokenize("The effect of aspirin on the heart");
        assert_eq!(tokens, vec!["effect", "aspirin", "heart"]);
    }

    #[test]
    fn test_tokenize_keeps_single_digits() {
        let tokens = tokenize("2 trial 5");
        assert_eq!(tokens, vec!["2", "trial", "5"]);
    }

    #[test]
    fn test_single_letter_kept_after_term() {
        assert_eq!(tokenize("hepatitis c")[1], "c");
        assert_eq!(tokenize("Hepatitis C antiviral").len(), 3);
        assert_eq!(tokenize("vitamin D trial")[1], "d");
        // leading letters and letters after stopwords carry no term to qualify
        assert_eq!(tokenize("c trial"), vec!["trial"]);
        assert_eq!(tokenize("study of a drug"), tokenize("study drug"));
        assert_ne!(tokenize("hepatitis c"), tokenize("hepatitis b"));
    }

    #[test]
    fn test_stemming_matches_plural_and_singular() {
        assert_eq!(tokenize("trials"), vec!["trial"]);
        assert_eq!(tokenize("patients infections"), tokenize("patient infection"));
        assert_eq!(tokenize_unique("trial trials TRIALS"), vec!["trial"]);
    }

    #[test]
    fn test_possessives_stripped() {
        assert_eq!(tokenize("Crohn's disease"), tokenize("crohn disease"));
        assert_eq!(tokenize("Crohn\u{2019}s"), tokenize("crohn"));
        assert_eq!(tokenize("don't"), vec!["dont"]);
    }

    #[test]
    fn test_tokenize_alphanumeric() {
        let tokens = tokenize("COVID-19 hba1c");
        assert_eq!(tokens, vec!["covid", "19", "hba1c"]);
    }

    #[test]
    fn test_tokenize_empty() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("...---...").is_empty());
        assert!(tokenize("the and of").is_empty());
    }

    #[test]
    fn test_positions_are_dense() {
        let tokens = tokenize_with_positions("the cardiac bypass study");
        assert_eq!(
            tokens,
            vec![
                ("cardiac".to_string(), 0),
                ("bypass".to_string(), 1),
                ("studi".to_string(), 2)
            ]
        );
    }

    #[test]
    fn test_tokenize_unique_keeps_first_order() {
        let tokens = tokenize_unique("trial cardiac trial");
        assert_eq!(tokens, vec!["trial", "cardiac"]);
    }

    proptest! {
        #[test]
        fn prop_tokenize_deterministic_and_lowercase(text in "[a-zA-Z0-9 ,.;-]{0,64}") {
            let a = tokenize(&text);
            let b = tokenize(&text);
            prop_assert_eq!(&a, &b);
            for term in &a {
                prop_assert_eq!(term.clone(), term.to_lowercase());
                prop_assert!(!term.is_empty());
            }
        }
    }
}
