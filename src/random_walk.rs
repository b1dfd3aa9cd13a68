//! Unbiased random walk corpora.
//!
//! Every node `u` starts `iterations * degree(u)` walks, so the corpus size is
//! fixed by the graph: `iterations * sum(degree)`. Zero-degree nodes start none.
//! Each step draws uniformly from the current adjacency list, which repeats a
//! neighbor once per parallel edge.

use std::time::Instant;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cancel::CancelToken;
use crate::error::WalkError;
use crate::graph::GraphRef;

/// Walks between progress notices (and cancellation checks).
pub const PROGRESS_EVERY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Nodes per walk, start node included.
    pub length: usize,
    /// Walks per incident edge of each start node.
    pub iterations: usize,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self { length: 10, iterations: 100 }
    }
}

impl WalkConfig {
    pub fn validate(&self) -> Result<(), WalkError> {
        if self.length == 0 {
            return Err(WalkError::InvalidParameter("walk length must be >= 1".into()));
        }
        if self.iterations == 0 {
            return Err(WalkError::InvalidParameter("iterations must be >= 1".into()));
        }
        Ok(())
    }
}

/// Fixed-length walks stored contiguously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corpus {
    walk_length: usize,
    nodes: Vec<usize>,
}

impl Corpus {
    pub fn walk_length(&self) -> usize {
        self.walk_length
    }

    /// Number of walks.
    pub fn len(&self) -> usize {
        self.nodes.len() / self.walk_length.max(1)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn walk(&self, i: usize) -> &[usize] {
        &self.nodes[i * self.walk_length..(i + 1) * self.walk_length]
    }

    pub fn walks(&self) -> std::slice::ChunksExact<'_, usize> {
        self.nodes.chunks_exact(self.walk_length.max(1))
    }

    /// Total node occurrences across all walks.
    pub fn token_count(&self) -> usize {
        self.nodes.len()
    }
}

/// The corpus size [`generate_walks`] guarantees.
pub fn expected_corpus_size<G: GraphRef>(graph: &G, iterations: usize) -> usize {
    iterations * graph.total_degree()
}

pub fn generate_walks<G: GraphRef, R: Rng>(
    graph: &G,
    config: WalkConfig,
    rng: &mut R,
) -> Result<Corpus, WalkError> {
    generate_walks_cancellable(graph, config, rng, None)
}

/// Materialize the corpus; checks `cancel` at the progress cadence.
pub fn generate_walks_cancellable<G: GraphRef, R: Rng>(
    graph: &G,
    config: WalkConfig,
    rng: &mut R,
    cancel: Option<&CancelToken>,
) -> Result<Corpus, WalkError> {
    config.validate()?;
    let expected = expected_corpus_size(graph, config.iterations);
    let mut nodes = Vec::with_capacity(expected * config.length);
    for_each_walk(graph, config, rng, cancel, |w| nodes.extend_from_slice(w))?;
    let corpus = Corpus { walk_length: config.length, nodes };
    if corpus.len() != expected {
        return Err(WalkError::SizeMismatch { expected, actual: corpus.len() });
    }
    Ok(corpus)
}

/// Streaming walk generation: hands each walk to `visit` from one reused buffer.
///
/// Returns the number of walks emitted. Allocation does not grow with the
/// number of walks.
pub fn for_each_walk<G, R, F>(
    graph: &G,
    config: WalkConfig,
    rng: &mut R,
    cancel: Option<&CancelToken>,
    mut visit: F,
) -> Result<usize, WalkError>
where
    G: GraphRef,
    R: Rng,
    F: FnMut(&[usize]),
{
    config.validate()?;
    let total = expected_corpus_size(graph, config.iterations);
    let started = Instant::now();
    let cancelled = || cancel.is_some_and(CancelToken::is_cancelled);

    let mut buf = Vec::with_capacity(config.length);
    let mut count = 0usize;
    for u in 0..graph.node_count() {
        let degree = graph.degree(u);
        if degree == 0 {
            continue;
        }
        if cancelled() {
            return Err(WalkError::Cancelled { completed: count });
        }
        for _ in 0..config.iterations * degree {
            if count % PROGRESS_EVERY == 0 {
                if cancelled() {
                    return Err(WalkError::Cancelled { completed: count });
                }
                info!(
                    "{}/{} walks {:.2}s",
                    count,
                    total,
                    started.elapsed().as_secs_f64()
                );
            }
            walk_into(graph, u, config.length, rng, &mut buf)?;
            visit(&buf);
            count += 1;
        }
    }

    if count != total {
        return Err(WalkError::SizeMismatch { expected: total, actual: count });
    }
    Ok(count)
}

fn walk_into<G: GraphRef, R: Rng>(
    graph: &G,
    start: usize,
    length: usize,
    rng: &mut R,
    buf: &mut Vec<usize>,
) -> Result<(), WalkError> {
    if graph.degree(start) == 0 {
        return Err(WalkError::ZeroDegreeStart(start));
    }
    buf.clear();
    buf.push(start);
    let mut curr = start;
    for _ in 1..length {
        let nbrs = graph.neighbors_ref(curr);
        if nbrs.is_empty() {
            return Err(WalkError::DeadEnd(curr));
        }
        curr = nbrs[rng.random_range(0..nbrs.len())];
        buf.push(curr);
    }
    Ok(())
}

/// SplitMix64 finalizer, used to derive independent seeds.
pub fn mix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xbf58476d1ce4e5b9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94d049bb133111eb);
    x ^= x >> 31;
    x
}
