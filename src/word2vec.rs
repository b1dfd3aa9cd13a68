//! Embedding trainers.
//!
//! [`EmbeddingTrainer`] is the seam the orchestrator calls. [`Word2Vec`] is the
//! bundled implementation: skip-gram or CBOW with negative sampling, walks as
//! sentences and nodes as words.
//!
//! Training is deterministic for a given seed. With `worker_threads > 1` each
//! epoch splits the walks into that many contiguous shards, trains every shard
//! from the same starting parameters with its own seeded RNG, and averages the
//! shard parameters. The result depends on `worker_threads` but never on how
//! rayon schedules the shards.

use std::ops::Range;
use std::time::Instant;

use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::error::TrainingError;
use crate::graph::{GraphRef, MultiGraph};
use crate::random_walk::{mix64, Corpus};
use crate::vectors::NodeVectors;

const MAX_EXP: f32 = 6.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Skip-gram when true, CBOW otherwise.
    pub use_skipgram: bool,
    pub vector_size: usize,
    /// Maximum distance between a word and its context.
    pub window_size: usize,
    /// Nodes occurring fewer times in the corpus get no vector.
    pub min_token_count: usize,
    /// Noise words drawn per positive pair.
    pub negative_samples: usize,
    pub worker_threads: usize,
    /// Frequent-word downsampling threshold; 0 disables it.
    pub subsampling_threshold: f64,
    pub epochs: usize,
    pub learning_rate: f32,
    pub min_learning_rate: f32,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            use_skipgram: true,
            vector_size: 8,
            window_size: 1,
            min_token_count: 1,
            negative_samples: 5,
            worker_threads: 4,
            subsampling_threshold: 0.0,
            epochs: 5,
            learning_rate: 0.025,
            min_learning_rate: 0.0001,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<(), TrainingError> {
        let bad = |msg: &str| Err(TrainingError::InvalidConfig(msg.to_string()));
        if self.vector_size == 0 {
            return bad("vector_size must be >= 1");
        }
        if self.window_size == 0 {
            return bad("window_size must be >= 1");
        }
        if self.negative_samples == 0 {
            return bad("negative_samples must be >= 1");
        }
        if self.worker_threads == 0 {
            return bad("worker_threads must be >= 1");
        }
        if self.epochs == 0 {
            return bad("epochs must be >= 1");
        }
        if !(self.subsampling_threshold >= 0.0 && self.subsampling_threshold.is_finite()) {
            return bad("subsampling_threshold must be a finite value >= 0");
        }
        if !(self.learning_rate > 0.0 && self.min_learning_rate > 0.0)
            || self.min_learning_rate > self.learning_rate
        {
            return bad("learning rates must satisfy 0 < min_learning_rate <= learning_rate");
        }
        Ok(())
    }
}

/// Everything a trainer sees for one replicate.
#[derive(Debug, Clone, Copy)]
pub struct TrainJob<'a> {
    pub replicate: usize,
    pub corpus: &'a Corpus,
    pub graph: &'a MultiGraph,
    pub config: &'a TrainConfig,
    pub seed: u64,
    /// Set when the replicate is abandoned; trainers should stop and return
    /// [`TrainingError::Cancelled`].
    pub cancel: &'a CancelToken,
}

pub trait EmbeddingTrainer: Send + Sync {
    fn train(&self, job: &TrainJob<'_>) -> Result<NodeVectors, TrainingError>;
}

impl<F> EmbeddingTrainer for F
where
    F: Fn(&TrainJob<'_>) -> Result<NodeVectors, TrainingError> + Send + Sync,
{
    fn train(&self, job: &TrainJob<'_>) -> Result<NodeVectors, TrainingError> {
        self(job)
    }
}

/// Word2vec with negative sampling over walk corpora.
#[derive(Debug, Clone, Copy, Default)]
pub struct Word2Vec;

impl EmbeddingTrainer for Word2Vec {
    fn train(&self, job: &TrainJob<'_>) -> Result<NodeVectors, TrainingError> {
        let cfg = job.config;
        cfg.validate()?;
        if job.corpus.is_empty() {
            return Err(TrainingError::EmptyCorpus);
        }
        let started = Instant::now();
        let vocab = Vocab::build(job.corpus, job.graph.node_count(), cfg);
        if vocab.is_empty() {
            return Err(TrainingError::EmptyVocabulary { min_count: cfg.min_token_count });
        }
        let noise = WeightedIndex::new(vocab.counts.iter().map(|&c| (c as f64).powf(0.75)))
            .map_err(|e| TrainingError::Failed(format!("noise distribution: {e}")))?;

        let mut model = Model::init(vocab.len(), cfg.vector_size, job.seed);
        let shards = shard_ranges(job.corpus.len(), cfg.worker_threads);
        let ctx = Context { corpus: job.corpus, vocab: &vocab, noise: &noise, cfg, cancel: job.cancel };

        for epoch in 0..cfg.epochs {
            let shard_seed = |s: usize| mix64(job.seed ^ ((epoch as u64) << 32) ^ s as u64);
            if shards.len() == 1 {
                let mut rng = ChaCha8Rng::seed_from_u64(shard_seed(0));
                ctx.train_range(&mut model, shards[0].clone(), epoch, &mut rng);
            } else {
                let trained: Vec<Model> = shards
                    .par_iter()
                    .enumerate()
                    .map(|(s, range)| {
                        let mut local = model.clone();
                        let mut rng = ChaCha8Rng::seed_from_u64(shard_seed(s));
                        ctx.train_range(&mut local, range.clone(), epoch, &mut rng);
                        local
                    })
                    .collect();
                model = Model::average(&trained);
            }
            if job.cancel.is_cancelled() {
                debug!(replicate = job.replicate, epoch, "word2vec cancelled");
                return Err(TrainingError::Cancelled);
            }
        }

        let mut out = NodeVectors::new(cfg.vector_size);
        for (t, &node) in vocab.nodes.iter().enumerate() {
            out.insert(job.graph.id(node), model.row0(t).to_vec())?;
        }
        debug!(
            replicate = job.replicate,
            vocab = vocab.len(),
            shards = shards.len(),
            elapsed = started.elapsed().as_secs_f64(),
            "word2vec trained"
        );
        Ok(out)
    }
}

/// Nodes kept for training, with their corpus counts.
#[derive(Debug)]
struct Vocab {
    token_of_node: Vec<Option<u32>>,
    nodes: Vec<usize>,
    counts: Vec<u64>,
    /// Probability of keeping an occurrence under downsampling.
    keep: Vec<f32>,
}

impl Vocab {
    fn build(corpus: &Corpus, node_count: usize, cfg: &TrainConfig) -> Self {
        let mut raw = vec![0u64; node_count];
        for walk in corpus.walks() {
            for &u in walk {
                raw[u] += 1;
            }
        }
        let min = (cfg.min_token_count as u64).max(1);
        let mut token_of_node = vec![None; node_count];
        let mut nodes = Vec::new();
        let mut counts = Vec::new();
        for (u, &c) in raw.iter().enumerate() {
            if c >= min {
                token_of_node[u] = Some(nodes.len() as u32);
                nodes.push(u);
                counts.push(c);
            }
        }
        let retained: u64 = counts.iter().sum();
        let keep = if cfg.subsampling_threshold > 0.0 {
            let threshold = cfg.subsampling_threshold * retained as f64;
            counts
                .iter()
                .map(|&c| {
                    let c = c as f64;
                    (((c / threshold).sqrt() + 1.0) * threshold / c).min(1.0) as f32
                })
                .collect()
        } else {
            vec![1.0; counts.len()]
        };
        Self { token_of_node, nodes, counts, keep }
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Input (`syn0`) and output (`syn1neg`) matrices, row-major.
#[derive(Debug, Clone)]
struct Model {
    dim: usize,
    syn0: Vec<f32>,
    syn1neg: Vec<f32>,
}

impl Model {
    fn init(vocab: usize, dim: usize, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(mix64(seed));
        let syn0 = (0..vocab * dim)
            .map(|_| (rng.random::<f32>() - 0.5) / dim as f32)
            .collect();
        Self { dim, syn0, syn1neg: vec![0.0; vocab * dim] }
    }

    fn row0(&self, t: usize) -> &[f32] {
        &self.syn0[t * self.dim..(t + 1) * self.dim]
    }

    fn average(models: &[Model]) -> Model {
        let inv = 1.0 / models.len() as f32;
        let mut out = models[0].clone();
        for other in &models[1..] {
            for (a, b) in out.syn0.iter_mut().zip(&other.syn0) {
                *a += b;
            }
            for (a, b) in out.syn1neg.iter_mut().zip(&other.syn1neg) {
                *a += b;
            }
        }
        out.syn0.iter_mut().chain(out.syn1neg.iter_mut()).for_each(|x| *x *= inv);
        out
    }
}

struct Context<'a> {
    corpus: &'a Corpus,
    vocab: &'a Vocab,
    noise: &'a WeightedIndex<f64>,
    cfg: &'a TrainConfig,
    cancel: &'a CancelToken,
}

impl Context<'_> {
    fn train_range(&self, model: &mut Model, walks: Range<usize>, epoch: usize, rng: &mut ChaCha8Rng) {
        let cfg = self.cfg;
        let range_tokens = (walks.len() * self.corpus.walk_length()).max(1) as f32;
        let mut done = 0usize;
        let mut sentence: Vec<u32> = Vec::with_capacity(self.corpus.walk_length());
        let mut neu1 = vec![0.0f32; model.dim];
        let mut neu1e = vec![0.0f32; model.dim];
        let mut context: Vec<usize> = Vec::with_capacity(2 * cfg.window_size);

        for i in walks {
            if self.cancel.is_cancelled() {
                return;
            }
            let walk = self.corpus.walk(i);
            done += walk.len();
            sentence.clear();
            for &u in walk {
                let Some(t) = self.vocab.token_of_node[u] else { continue };
                if self.vocab.keep[t as usize] < 1.0 && self.vocab.keep[t as usize] < rng.random::<f32>() {
                    continue;
                }
                sentence.push(t);
            }

            let progress = (epoch as f32 + done as f32 / range_tokens) / cfg.epochs as f32;
            let alpha = (cfg.learning_rate - (cfg.learning_rate - cfg.min_learning_rate) * progress)
                .max(cfg.min_learning_rate);

            for pos in 0..sentence.len() {
                let reduced = rng.random_range(0..cfg.window_size);
                let span = cfg.window_size - reduced;
                let lo = pos.saturating_sub(span);
                let hi = (pos + span + 1).min(sentence.len());
                let center = sentence[pos] as usize;

                if cfg.use_skipgram {
                    for c in (lo..hi).filter(|&c| c != pos) {
                        let input = sentence[c] as usize;
                        let dim = model.dim;
                        neu1.copy_from_slice(&model.syn0[input * dim..(input + 1) * dim]);
                        self.negative_update(model, &neu1, center, alpha, rng, &mut neu1e);
                        for (w, g) in model.syn0[input * dim..(input + 1) * dim].iter_mut().zip(&neu1e) {
                            *w += g;
                        }
                    }
                } else {
                    context.clear();
                    context.extend((lo..hi).filter(|&c| c != pos).map(|c| sentence[c] as usize));
                    if context.is_empty() {
                        continue;
                    }
                    let dim = model.dim;
                    neu1.fill(0.0);
                    for &w in &context {
                        for (a, b) in neu1.iter_mut().zip(&model.syn0[w * dim..(w + 1) * dim]) {
                            *a += b;
                        }
                    }
                    let inv = 1.0 / context.len() as f32;
                    neu1.iter_mut().for_each(|x| *x *= inv);
                    self.negative_update(model, &neu1, center, alpha, rng, &mut neu1e);
                    for &w in &context {
                        for (a, g) in model.syn0[w * dim..(w + 1) * dim].iter_mut().zip(&neu1e) {
                            *a += g;
                        }
                    }
                }
            }
        }
    }

    /// One positive and `negative_samples` noise updates of `syn1neg`; the
    /// input-side gradient accumulates in `neu1e`.
    fn negative_update(
        &self,
        model: &mut Model,
        l1: &[f32],
        target: usize,
        alpha: f32,
        rng: &mut ChaCha8Rng,
        neu1e: &mut [f32],
    ) {
        let dim = model.dim;
        neu1e.fill(0.0);
        for d in 0..=self.cfg.negative_samples {
            let (word, label) = if d == 0 {
                (target, 1.0f32)
            } else {
                let w = self.noise.sample(rng);
                if w == target {
                    continue;
                }
                (w, 0.0f32)
            };
            let row = &mut model.syn1neg[word * dim..(word + 1) * dim];
            let dot: f32 = l1.iter().zip(row.iter()).map(|(a, b)| a * b).sum();
            let g = (label - sigmoid(dot)) * alpha;
            for ((e, r), x) in neu1e.iter_mut().zip(row.iter_mut()).zip(l1) {
                *e += g * *r;
                *r += g * x;
            }
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    if x > MAX_EXP {
        1.0
    } else if x < -MAX_EXP {
        0.0
    } else {
        1.0 / (1.0 + (-x).exp())
    }
}

/// Split `0..n` into at most `parts` contiguous, non-empty ranges.
fn shard_ranges(n: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.clamp(1, n.max(1));
    let base = n / parts;
    let extra = n % parts;
    let mut out = Vec::with_capacity(parts);
    let mut start = 0;
    for p in 0..parts {
        let len = base + usize::from(p < extra);
        out.push(start..start + len);
        start += len;
    }
    out
}
