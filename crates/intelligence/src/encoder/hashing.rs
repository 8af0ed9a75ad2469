//! Feature-hashing encoder
//!
//! Produces deterministic dense vectors by hashing terms and adjacent term
//! pairs into fixed-dimension buckets, signed by a second hash bit and
//! weighted by term frequency. Not as semantically rich as a neural encoder,
//! but local, fast and always available.

use super::{EncodeError, Encoder};
use ctse_core::CallContext;
use std::collections::BTreeMap;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Seed shared by every process so vectors stay comparable across restarts
const HASH_SEED: u64 = 0x6374_7365;
/// Weight of a term pair relative to a single term
const PAIR_WEIGHT: f32 = 0.5;

/// Local feature-hashing encoder
#[derive(Debug, Clone)]
pub struct HashingEncoder {
    dimension: usize,
}

impl HashingEncoder {
    /// Encoder producing `dimension`-sized vectors
    pub fn new(dimension: usize) -> Self {
        HashingEncoder {
            dimension: dimension.max(1),
        }
    }

    /// Lowercase alphanumeric terms of at least two characters (or a digit)
    fn terms(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() >= 2 || s.chars().all(|c| c.is_ascii_digit()))
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
            .collect()
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = xxh3_64_with_seed(feature.as_bytes(), HASH_SEED);
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }

    fn hashed_vector(&self, text: &str) -> Option<Vec<f32>> {
        let terms = Self::terms(text);
        if terms.is_empty() {
            return None;
        }
        let mut counts: BTreeMap<String, f32> = BTreeMap::new();
        for term in &terms {
            *counts.entry(term.clone()).or_default() += 1.0;
        }
        for pair in terms.windows(2) {
            *counts.entry(format!("{} {}", pair[0], pair[1])).or_default() += PAIR_WEIGHT;
        }

        let mut vector = vec![0.0f32; self.dimension];
        for (feature, count) in &counts {
            // sublinear tf damps repeated boilerplate
            self.add_feature(&mut vector, feature, 1.0 + count.ln());
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm <= f32::EPSILON {
            return None;
        }
        for v in &mut vector {
            *v /= norm;
        }
        Some(vector)
    }
}

impl Encoder for HashingEncoder {
    fn encode(&self, text: &str, ctx: &CallContext) -> Result<Vec<f32>, EncodeError> {
        if ctx.is_cancelled() {
            return Err(EncodeError::Cancelled);
        }
        self.hashed_vector(text).ok_or(EncodeError::EmptyInput)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }

    fn is_remote(&self) -> bool {
        false
    }
}
