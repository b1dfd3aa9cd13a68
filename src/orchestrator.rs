//! Replicate orchestration.
//!
//! Each replicate runs walk generation then training on its own thread and
//! reports back over a channel. At most `parallelism` replicates hold a slot at
//! once; a slot is released when the replicate reports or times out, so a hung
//! replicate is abandoned rather than waited for. Results are keyed by
//! replicate index; a failed, panicked or timed-out replicate is recorded and
//! never takes its siblings down. Artifacts are persisted on the calling thread
//! as results arrive.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::cancel::CancelToken;
use crate::error::{Error, FailureKind, ReplicateError, Result};
use crate::graph::MultiGraph;
use crate::random_walk::{expected_corpus_size, generate_walks_cancellable, mix64, Corpus, WalkConfig};
use crate::store::{ArtifactStore, ReplicateArtifact};
use crate::word2vec::{EmbeddingTrainer, TrainConfig, TrainJob};

/// Salt separating the trainer's seed stream from the walker's.
const TRAIN_STREAM: u64 = 0x7472_6169_6e00_0000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub replicates: usize,
    /// Replicates running at once.
    pub parallelism: usize,
    pub master_seed: u64,
    pub walk: WalkConfig,
    pub train: TrainConfig,
    /// Wall-clock budget per replicate, from the moment it starts.
    pub replicate_timeout_ms: Option<u64>,
    /// Successes needed for the run to count as successful; all by default.
    pub min_success: Option<usize>,
    /// Also persist each replicate's walks.
    pub save_walks: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            replicates: 10,
            parallelism: 1,
            master_seed: 42,
            walk: WalkConfig::default(),
            train: TrainConfig::default(),
            replicate_timeout_ms: None,
            min_success: None,
            save_walks: false,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<()> {
        if self.replicates == 0 {
            return Err(Error::Config("replicates must be >= 1".into()));
        }
        if self.parallelism == 0 {
            return Err(Error::Config("parallelism must be >= 1".into()));
        }
        if self.replicate_timeout_ms == Some(0) {
            return Err(Error::Config("replicate timeout must be > 0".into()));
        }
        if let Some(min) = self.min_success {
            if min > self.replicates {
                return Err(Error::Config(format!(
                    "min_success {min} exceeds replicate count {}",
                    self.replicates
                )));
            }
        }
        self.walk.validate().map_err(|e| Error::Config(e.to_string()))?;
        self.train.validate().map_err(|e| Error::Config(e.to_string()))?;
        Ok(())
    }

    pub fn replicate_timeout(&self) -> Option<Duration> {
        self.replicate_timeout_ms.map(Duration::from_millis)
    }

    pub fn required_successes(&self) -> usize {
        self.min_success.unwrap_or(self.replicates)
    }
}

/// Seed of replicate `replicate`; independent across indices, reproducible alone.
pub fn replicate_seed(master_seed: u64, replicate: usize) -> u64 {
    mix64(master_seed ^ mix64(replicate as u64))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateSummary {
    pub replicate: usize,
    pub seed: u64,
    pub corpus_size: usize,
    pub vocabulary: usize,
    pub location: String,
    pub walk_secs: f64,
    pub train_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateFailure {
    pub replicate: usize,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of a run, sorted by replicate index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub requested: usize,
    pub succeeded: Vec<ReplicateSummary>,
    pub failures: Vec<ReplicateFailure>,
    pub elapsed_secs: f64,
}

impl RunReport {
    pub fn succeeded_indices(&self) -> Vec<usize> {
        self.succeeded.iter().map(|s| s.replicate).collect()
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.replicate).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.succeeded.len() == self.requested
    }

    pub fn ensure_min_success(&self, required: usize) -> Result<()> {
        if self.succeeded.len() >= required {
            Ok(())
        } else {
            Err(Error::InsufficientReplicates {
                succeeded: self.succeeded.len(),
                requested: self.requested,
                required,
            })
        }
    }
}

/// Drives replicates of (walks -> training) and collects their artifacts.
pub struct Orchestrator {
    trainer: Arc<dyn EmbeddingTrainer>,
    cancel: CancelToken,
}

impl Orchestrator {
    pub fn new(trainer: impl EmbeddingTrainer + 'static) -> Self {
        Self { trainer: Arc::new(trainer), cancel: CancelToken::new() }
    }

    /// Replace the run-level cancellation token.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Cancelling skips replicates that have not started yet; running ones finish.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn run(
        &self,
        graph: Arc<MultiGraph>,
        config: &RunConfig,
        store: &dyn ArtifactStore,
    ) -> Result<RunReport> {
        config.validate()?;
        let started = Instant::now();
        let n = config.replicates;
        info!(
            replicates = n,
            parallelism = config.parallelism,
            walks_per_replicate = expected_corpus_size(&*graph, config.walk.iterations),
            "starting run"
        );

        let (tx, rx) = mpsc::channel();
        let timeout = config.replicate_timeout();
        let mut tokens: BTreeMap<usize, CancelToken> = BTreeMap::new();
        let mut pending: BTreeSet<usize> = (1..=n).collect();
        // Replicates holding a worker slot, with their start time.
        let mut running: BTreeMap<usize, Instant> = BTreeMap::new();
        let mut next = 1;
        let mut succeeded = Vec::new();
        let mut failures = Vec::new();
        let mut fail = |replicate: usize, err: ReplicateError| {
            warn!(replicate, kind = ?err.kind(), "replicate failed: {err}");
            failures.push(ReplicateFailure { replicate, kind: err.kind(), message: err.to_string() });
        };

        while !pending.is_empty() {
            while running.len() < config.parallelism && next <= n {
                let replicate = next;
                next += 1;
                if self.cancel.is_cancelled() {
                    pending.remove(&replicate);
                    fail(replicate, ReplicateError::Cancelled);
                    continue;
                }
                let token = CancelToken::new();
                let job = ReplicateJob {
                    replicate,
                    total: n,
                    seed: replicate_seed(config.master_seed, replicate),
                    graph: Arc::clone(&graph),
                    trainer: Arc::clone(&self.trainer),
                    walk: config.walk,
                    train: config.train.clone(),
                    keep_corpus: config.save_walks,
                    cancel: token.clone(),
                };
                let tx = tx.clone();
                // Detached: a timed-out replicate finishes on its own without holding a slot.
                let spawned = thread::Builder::new()
                    .name(format!("replicate-{replicate}"))
                    .spawn(move || job.execute(&tx));
                match spawned {
                    Ok(_) => {
                        debug!(replicate, "replicate started");
                        tokens.insert(replicate, token);
                        running.insert(replicate, Instant::now());
                    }
                    Err(e) => {
                        pending.remove(&replicate);
                        fail(replicate, ReplicateError::Spawn(e));
                    }
                }
            }
            if running.is_empty() {
                // Nothing in flight and nothing left to launch.
                continue;
            }

            let deadline = timeout.and_then(|t| running.values().min().map(|&at| at + t));
            let msg = match deadline {
                Some(d) => rx.recv_timeout(d.saturating_duration_since(Instant::now())),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match msg {
                Ok(Finished { replicate, outcome }) => {
                    if running.remove(&replicate).is_none() {
                        debug!(replicate, "discarding result of timed-out replicate");
                        continue;
                    }
                    pending.remove(&replicate);
                    match outcome.and_then(|out| persist(store, &graph, out)) {
                        Ok(summary) => {
                            info!(replicate, location = %summary.location, "replicate persisted");
                            succeeded.push(summary);
                        }
                        Err(err) => fail(replicate, err),
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    let Some(limit) = timeout else { continue };
                    let now = Instant::now();
                    let overdue: Vec<usize> = running
                        .iter()
                        .filter(|(_, at)| now.duration_since(**at) >= limit)
                        .map(|(&r, _)| r)
                        .collect();
                    for replicate in overdue {
                        running.remove(&replicate);
                        pending.remove(&replicate);
                        if let Some(token) = tokens.get(&replicate) {
                            token.cancel();
                        }
                        fail(replicate, ReplicateError::Timeout(limit));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    for replicate in std::mem::take(&mut running).into_keys() {
                        pending.remove(&replicate);
                        fail(
                            replicate,
                            ReplicateError::Panicked("worker exited without reporting".into()),
                        );
                    }
                }
            }
        }

        succeeded.sort_by_key(|s: &ReplicateSummary| s.replicate);
        failures.sort_by_key(|f| f.replicate);
        let report = RunReport {
            requested: n,
            succeeded,
            failures,
            elapsed_secs: started.elapsed().as_secs_f64(),
        };
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failures.len(),
            elapsed = report.elapsed_secs,
            "run finished"
        );
        Ok(report)
    }
}

fn persist(
    store: &dyn ArtifactStore,
    graph: &MultiGraph,
    out: ReplicateOutput,
) -> std::result::Result<ReplicateSummary, ReplicateError> {
    let location = store.save_replicate(&out.artifact)?;
    if let Some(corpus) = &out.corpus {
        store.save_walks(out.artifact.replicate, corpus, graph)?;
    }
    Ok(ReplicateSummary {
        replicate: out.artifact.replicate,
        seed: out.artifact.seed,
        corpus_size: out.artifact.corpus_size,
        vocabulary: out.artifact.vectors.len(),
        location,
        walk_secs: out.walk_secs,
        train_secs: out.train_secs,
    })
}

/// Sent by a replicate thread exactly once.
struct Finished {
    replicate: usize,
    outcome: std::result::Result<ReplicateOutput, ReplicateError>,
}

struct ReplicateOutput {
    artifact: ReplicateArtifact,
    corpus: Option<Corpus>,
    walk_secs: f64,
    train_secs: f64,
}

struct ReplicateJob {
    replicate: usize,
    total: usize,
    seed: u64,
    graph: Arc<MultiGraph>,
    trainer: Arc<dyn EmbeddingTrainer>,
    walk: WalkConfig,
    train: TrainConfig,
    keep_corpus: bool,
    cancel: CancelToken,
}

impl ReplicateJob {
    fn execute(self, tx: &Sender<Finished>) {
        let replicate = self.replicate;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.pipeline()))
            .unwrap_or_else(|payload| Err(ReplicateError::Panicked(panic_message(payload.as_ref()))));
        // A send error means the run already returned; nobody is listening.
        let _ = tx.send(Finished { replicate, outcome });
    }

    fn pipeline(&self) -> std::result::Result<ReplicateOutput, ReplicateError> {
        let span = info_span!("replicate", r = self.replicate);
        let _enter = span.enter();
        info!("{}/{}", self.replicate, self.total);

        info!("generate random walks");
        let t = Instant::now();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let corpus = generate_walks_cancellable(&*self.graph, self.walk, &mut rng, Some(&self.cancel))?;
        let walk_secs = t.elapsed().as_secs_f64();
        info!("walks done {:.2}s ({} walks)", walk_secs, corpus.len());

        info!("generate node vectors");
        let t = Instant::now();
        let vectors = self.trainer.train(&TrainJob {
            replicate: self.replicate,
            corpus: &corpus,
            graph: &self.graph,
            config: &self.train,
            seed: mix64(self.seed ^ TRAIN_STREAM),
            cancel: &self.cancel,
        })?;
        let train_secs = t.elapsed().as_secs_f64();
        info!("node vectors done {:.2}s ({} nodes)", train_secs, vectors.len());

        Ok(ReplicateOutput {
            artifact: ReplicateArtifact {
                replicate: self.replicate,
                seed: self.seed,
                walk: self.walk,
                train: self.train.clone(),
                corpus_size: corpus.len(),
                vectors,
            },
            corpus: self.keep_corpus.then_some(corpus),
            walk_secs,
            train_secs,
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replicate_seeds_differ_and_repeat() {
        let a: Vec<u64> = (1..=5).map(|r| replicate_seed(42, r)).collect();
        let b: Vec<u64> = (1..=5).map(|r| replicate_seed(42, r)).collect();
        assert_eq!(a, b);
        let unique: BTreeSet<u64> = a.iter().copied().collect();
        assert_eq!(unique.len(), 5);
        assert_ne!(replicate_seed(42, 1), replicate_seed(43, 1));
    }

    #[test]
    fn config_validation_rejects_bad_values() {
        let ok = RunConfig::default();
        assert!(ok.validate().is_ok());
        assert_eq!(ok.required_successes(), 10);

        for bad in [
            RunConfig { replicates: 0, ..RunConfig::default() },
            RunConfig { parallelism: 0, ..RunConfig::default() },
            RunConfig { replicate_timeout_ms: Some(0), ..RunConfig::default() },
            RunConfig { min_success: Some(11), ..RunConfig::default() },
            RunConfig { walk: WalkConfig { length: 0, iterations: 1 }, ..RunConfig::default() },
        ] {
            assert!(matches!(bad.validate(), Err(Error::Config(_))), "{bad:?}");
        }
    }

    #[test]
    fn config_reads_partial_json() {
        let cfg: RunConfig =
            serde_json::from_str(r#"{"replicates": 3, "walk": {"length": 5}}"#).unwrap();
        assert_eq!(cfg.replicates, 3);
        assert_eq!(cfg.walk.length, 5);
        assert_eq!(cfg.walk.iterations, 100);
        assert_eq!(cfg.train.vector_size, 8);
    }

    #[test]
    fn min_success_verdict() {
        let report = RunReport { requested: 3, succeeded: Vec::new(), failures: Vec::new(), elapsed_secs: 0.0 };
        assert!(report.ensure_min_success(0).is_ok());
        assert!(matches!(
            report.ensure_min_success(1),
            Err(Error::InsufficientReplicates { succeeded: 0, requested: 3, required: 1 })
        ));
        assert!(!report.is_complete());
    }

    #[test]
    fn panic_payloads_become_messages() {
        let p = panic::catch_unwind(|| panic!("boom {}", 1)).unwrap_err();
        assert_eq!(panic_message(p.as_ref()), "boom 1");
        let p = panic::catch_unwind(|| panic!("static")).unwrap_err();
        assert_eq!(panic_message(p.as_ref()), "static");
    }
}
