//! Benchmarks for walk generation and training.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use genewalk::{
    for_each_walk, generate_walks, CancelToken, EmbeddingTrainer, MultiGraph, TrainConfig,
    TrainJob, WalkConfig, Word2Vec,
};
use rand::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::hint::black_box;

fn from_pairs(n: usize, pairs: impl IntoIterator<Item = (usize, usize)>) -> MultiGraph {
    let mut b = MultiGraph::builder();
    let ids: Vec<usize> = (0..n).map(|i| b.node_or_insert(&format!("n{i}"))).collect();
    for (u, v) in pairs {
        b.add_edge(ids[u], ids[v], "rel");
    }
    b.build()
}

fn ring(n: usize) -> MultiGraph {
    from_pairs(n, (0..n).map(|i| (i, (i + 1) % n)))
}

/// Preferential attachment graph (Barabási–Albert) with `m` edges per new node.
///
/// Heavy-tailed degrees, closer to gene networks than a ring.
fn barabasi_albert(n: usize, m: usize, seed: u64) -> MultiGraph {
    assert!(n >= m.max(2));
    assert!(m >= 1);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut pairs = Vec::new();
    // Node ids repeated by degree.
    let mut targets: Vec<usize> = Vec::new();

    let init = m + 1;
    for i in 0..init {
        for j in (i + 1)..init {
            pairs.push((i, j));
            targets.push(i);
            targets.push(j);
        }
    }
    for v in init..n {
        let mut chosen: Vec<usize> = Vec::with_capacity(m);
        while chosen.len() < m {
            let u = targets[rng.random_range(0..targets.len())];
            if u != v && !chosen.contains(&u) {
                chosen.push(u);
            }
        }
        for &u in &chosen {
            pairs.push((v, u));
            targets.push(u);
            targets.push(v);
        }
    }
    from_pairs(n, pairs)
}

fn bench_walk_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("walk_generation");

    for n in [1_000usize, 10_000] {
        let graphs = [("ring", ring(n)), ("ba_m4", barabasi_albert(n, 4, 123))];
        // Keep total work bounded.
        let cfg = WalkConfig { length: 10, iterations: 5 };

        for (name, g) in graphs {
            group.bench_with_input(BenchmarkId::new(format!("{name}/collect"), n), &n, |b, _| {
                b.iter(|| {
                    let mut rng = ChaCha8Rng::seed_from_u64(123);
                    let corpus = generate_walks(black_box(&g), black_box(cfg), &mut rng);
                    black_box(corpus)
                })
            });

            group.bench_with_input(BenchmarkId::new(format!("{name}/stream"), n), &n, |b, _| {
                b.iter(|| {
                    let mut rng = ChaCha8Rng::seed_from_u64(123);
                    let mut last = 0usize;
                    let count = for_each_walk(black_box(&g), black_box(cfg), &mut rng, None, |w| {
                        last = w[w.len() - 1];
                    });
                    black_box((count, last))
                })
            });
        }
    }

    group.finish();
}

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("word2vec");
    group.sample_size(10);

    let g = barabasi_albert(2_000, 4, 7);
    let corpus = generate_walks(&g, WalkConfig { length: 10, iterations: 2 }, &mut ChaCha8Rng::seed_from_u64(7))
        .expect("walks");

    let cancel = CancelToken::new();
    for threads in [1usize, 4] {
        let config = TrainConfig { worker_threads: threads, epochs: 1, ..TrainConfig::default() };
        group.bench_with_input(BenchmarkId::new("skipgram", threads), &threads, |b, _| {
            b.iter(|| {
                let job = TrainJob {
                    replicate: 1,
                    corpus: &corpus,
                    graph: &g,
                    config: &config,
                    seed: 1,
                    cancel: &cancel,
                };
                black_box(Word2Vec.train(&job))
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_walk_generation, bench_training);
criterion_main!(benches);
