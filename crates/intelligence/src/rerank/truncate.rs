//! Deterministic input truncation
//!
//! The model's context is bounded, so candidate text is cut to a total
//! character budget by lowering a common cap on the longest fields first
//! (water-filling): fields at or below the cap are kept whole, every longer
//! field is cut to exactly the cap. The same input always yields the same
//! output, and no field is dropped entirely unless the budget is zero.

/// Largest per-field cap whose total fits `budget`, or `None` if the fields
/// already fit.
pub fn water_fill_cap(lengths: &[usize], budget: usize) -> Option<usize> {
    let total: usize = lengths.iter().sum();
    if total <= budget {
        return None;
    }
    let mut sorted = lengths.to_vec();
    sorted.sort_unstable();
    let mut remaining = budget;
    let n = sorted.len();
    for (i, &len) in sorted.iter().enumerate() {
        let count = n - i;
        if len * count > remaining {
            return Some(remaining / count);
        }
        remaining -= len;
    }
    sorted.last().copied()
}

/// Cut `texts` so their total character count is at most `budget`.
pub fn truncate_longest_first(texts: &[&str], budget: usize) -> Vec<String> {
    let lengths: Vec<usize> = texts.iter().map(|t| t.chars().count()).collect();
    match water_fill_cap(&lengths, budget) {
        None => texts.iter().map(|t| t.to_string()).collect(),
        Some(cap) => texts
            .iter()
            .map(|t| t.chars().take(cap).collect())
            .collect(),
    }
}
