//! HNSW (Hierarchical Navigable Small World) graph
//!
//! Built once per segment from unit-length vectors and never mutated after
//! the segment is sealed. Removal is handled above the graph, by the index's
//! live map: removed nodes still route searches but are filtered from
//! results.
//!
//! ## Algorithm
//!
//! - Layer 0 contains all nodes with up to 2*M connections each
//! - Higher layers contain a subset of nodes with up to M connections each
//! - Search starts from the top layer and greedily descends to layer 0
//! - At each layer, a beam search finds the ef closest neighbors
//!
//! ## Determinism
//!
//! - Fixed seed + monotonic counter for level assignment
//! - BTreeSet neighbor lists (sorted)
//! - Tie-breaking: (score desc, slot asc)

use crate::distance::dot_product;
use ctse_core::AnnConfig;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeSet, BinaryHeap};

/// Fixed seed for deterministic level assignment
const LEVEL_SEED: u64 = 42;

/// Flat, row-major vector storage addressed by slot
#[derive(Debug, Clone, Copy)]
pub(crate) struct VectorSlab<'a> {
    data: &'a [f32],
    dimension: usize,
}

impl<'a> VectorSlab<'a> {
    pub(crate) fn new(data: &'a [f32], dimension: usize) -> Self {
        VectorSlab { data, dimension }
    }

    pub(crate) fn get(&self, slot: u32) -> &'a [f32] {
        let start = slot as usize * self.dimension;
        &self.data[start..start + self.dimension]
    }

    pub(crate) fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }
}

/// A node in the HNSW graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct HnswNode {
    /// Neighbors per layer: neighbors[layer] = set of neighbor slots
    neighbors: Vec<BTreeSet<u32>>,
}

impl HnswNode {
    fn new(max_layer: usize) -> Self {
        HnswNode {
            neighbors: (0..=max_layer).map(|_| BTreeSet::new()).collect(),
        }
    }
}

/// Scored candidate (max-heap by score, tie-break by slot asc)
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ScoredSlot {
    pub(crate) score: f32,
    pub(crate) slot: u32,
}

impl Eq for ScoredSlot {}

impl PartialOrd for ScoredSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher score = Greater; lower slot preferred on ties
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.slot.cmp(&self.slot))
    }
}

fn sort_scored(v: &mut [ScoredSlot]) {
    v.sort_by(|a, b| b.cmp(a));
}

/// Graph-only HNSW structure; vectors live in the owning segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct HnswGraph {
    m: usize,
    ef_construction: usize,
    nodes: Vec<HnswNode>,
    entry_point: Option<u32>,
    max_level: usize,
    rng_counter: u64,
}

impl HnswGraph {
    pub(crate) fn new(config: &AnnConfig) -> Self {
        HnswGraph {
            m: config.m.max(2),
            ef_construction: config.ef_construction.max(1),
            nodes: Vec::new(),
            entry_point: None,
            max_level: 0,
            rng_counter: 0,
        }
    }

    /// Build a graph over every slot of `vectors`, inserting in slot order.
    pub(crate) fn build(config: &AnnConfig, vectors: VectorSlab<'_>) -> Self {
        let mut graph = HnswGraph::new(config);
        for slot in 0..vectors.len() as u32 {
            graph.insert(slot, vectors);
        }
        graph
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    fn max_connections(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m * 2
        } else {
            self.m
        }
    }

    // ========================================================================
    // Level Assignment
    // ========================================================================

    /// Exponentially distributed level with multiplier 1/ln(m)
    fn assign_level(&mut self) -> usize {
        self.rng_counter += 1;
        let hash = splitmix64(LEVEL_SEED.wrapping_add(self.rng_counter));
        let uniform = ((hash as f64) / (u64::MAX as f64)).max(1e-15);
        let ml = 1.0 / (self.m as f64).ln();
        (-uniform.ln() * ml) as usize
    }

    // ========================================================================
    // Graph Operations
    // ========================================================================

    /// Beam search at a single layer.
    ///
    /// Returns up to `ef` closest nodes, sorted by (score desc, slot asc).
    fn search_layer(
        &self,
        query: &[f32],
        entry: u32,
        ef: usize,
        layer: usize,
        vectors: VectorSlab<'_>,
    ) -> Vec<ScoredSlot> {
        let mut visited = vec![false; self.nodes.len()];
        visited[entry as usize] = true;

        let first = ScoredSlot {
            score: dot_product(query, vectors.get(entry)),
            slot: entry,
        };
        // candidates: max-heap (nearest first); results: min-heap (worst on top)
        let mut candidates = BinaryHeap::from(vec![first]);
        let mut results: BinaryHeap<Reverse<ScoredSlot>> = BinaryHeap::from(vec![Reverse(first)]);

        while let Some(nearest) = candidates.pop() {
            let worst = results.peek().map(|r| r.0.score).unwrap_or(f32::NEG_INFINITY);
            if nearest.score < worst && results.len() >= ef {
                break;
            }
            let node = &self.nodes[nearest.slot as usize];
            let Some(neighbors) = node.neighbors.get(layer) else {
                continue;
            };
            for &neighbor in neighbors {
                if visited[neighbor as usize] {
                    continue;
                }
                visited[neighbor as usize] = true;
                let score = dot_product(query, vectors.get(neighbor));
                let worst = results.peek().map(|r| r.0.score).unwrap_or(f32::NEG_INFINITY);
                if results.len() < ef || score > worst {
                    let scored = ScoredSlot {
                        score,
                        slot: neighbor,
                    };
                    candidates.push(scored);
                    results.push(Reverse(scored));
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<ScoredSlot> = results.into_iter().map(|r| r.0).collect();
        sort_scored(&mut out);
        out
    }

    /// Greedy descent from `from_layer` down to `to_layer`, moving to the
    /// globally best neighbor at each step.
    fn greedy_search_to_layer(
        &self,
        query: &[f32],
        entry: u32,
        from_layer: usize,
        to_layer: usize,
        vectors: VectorSlab<'_>,
    ) -> u32 {
        let mut current = entry;
        let mut current_score = dot_product(query, vectors.get(current));
        for layer in (to_layer..=from_layer).rev() {
            let mut improved = true;
            while improved {
                improved = false;
                let mut best = ScoredSlot {
                    score: current_score,
                    slot: current,
                };
                if let Some(neighbors) = self.nodes[current as usize].neighbors.get(layer) {
                    for &neighbor in neighbors {
                        let candidate = ScoredSlot {
                            score: dot_product(query, vectors.get(neighbor)),
                            slot: neighbor,
                        };
                        if candidate > best {
                            best = candidate;
                        }
                    }
                }
                if best.slot != current {
                    current = best.slot;
                    current_score = best.score;
                    improved = true;
                }
            }
        }
        current
    }

    /// Keep a node's `max_conn` closest neighbors at `layer`.
    fn prune_neighbors(&mut self, slot: u32, layer: usize, max_conn: usize, vectors: VectorSlab<'_>) {
        let own = vectors.get(slot);
        let mut scored: Vec<ScoredSlot> = self.nodes[slot as usize].neighbors[layer]
            .iter()
            .map(|&n| ScoredSlot {
                score: dot_product(own, vectors.get(n)),
                slot: n,
            })
            .collect();
        sort_scored(&mut scored);
        self.nodes[slot as usize].neighbors[layer] =
            scored.iter().take(max_conn).map(|s| s.slot).collect();
    }

    /// Insert the vector at `slot` (slots must be inserted densely, in order).
    fn insert(&mut self, slot: u32, vectors: VectorSlab<'_>) {
        debug_assert_eq!(slot as usize, self.nodes.len());
        let level = self.assign_level();
        self.nodes.push(HnswNode::new(level));
        let embedding = vectors.get(slot);

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(slot);
            self.max_level = level;
            return;
        };

        let mut current = entry;
        if self.max_level > level {
            current = self.greedy_search_to_layer(embedding, entry, self.max_level, level + 1, vectors);
        }

        for layer in (0..=level.min(self.max_level)).rev() {
            let candidates =
                self.search_layer(embedding, current, self.ef_construction, layer, vectors);
            let selected: Vec<u32> = candidates
                .iter()
                .filter(|c| c.slot != slot)
                .take(self.m)
                .map(|c| c.slot)
                .collect();

            self.nodes[slot as usize].neighbors[layer].extend(selected.iter().copied());

            let max_conn = self.max_connections(layer);
            for &neighbor in &selected {
                let list = &mut self.nodes[neighbor as usize].neighbors[layer];
                list.insert(slot);
                if list.len() > max_conn {
                    self.prune_neighbors(neighbor, layer, max_conn, vectors);
                }
            }

            if let Some(closest) = candidates.first() {
                current = closest.slot;
            }
        }

        if level > self.max_level {
            self.entry_point = Some(slot);
            self.max_level = level;
        }
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Approximate k nearest slots to a unit-length query, best first.
    ///
    /// `ef` is the layer-0 beam width; it is raised to `k` when smaller.
    pub(crate) fn search(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        vectors: VectorSlab<'_>,
    ) -> Vec<ScoredSlot> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }
        let mut current = entry;
        if self.max_level > 0 {
            current = self.greedy_search_to_layer(query, entry, self.max_level, 1, vectors);
        }
        let mut out = self.search_layer(query, current, ef.max(k), 0, vectors);
        out.truncate(k);
        out
    }
}

/// SplitMix64 hash function for deterministic PRNG
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

/// Exact scan over all slots, best first.
pub(crate) fn brute_force(query: &[f32], k: usize, vectors: VectorSlab<'_>) -> Vec<ScoredSlot> {
    let mut all: Vec<ScoredSlot> = (0..vectors.len() as u32)
        .map(|slot| ScoredSlot {
            score: dot_product(query, vectors.get(slot)),
            slot,
        })
        .collect();
    sort_scored(&mut all);
    all.truncate(k);
    all
}
