//! # genewalk
//!
//! Random-walk corpora over gene/ontology multigraphs and replicate
//! orchestration for node-embedding ensembles.
//!
//! - [`random_walk`]: unbiased first-order walks; each node starts
//!   `iterations x degree` walks, so the corpus size is fixed by the graph.
//! - [`word2vec`]: the [`EmbeddingTrainer`] seam plus a bundled skip-gram/CBOW
//!   trainer.
//! - [`orchestrator`]: runs N independent (walks -> training) replicates on a
//!   bounded pool and persists each artifact through an [`ArtifactStore`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use genewalk::{load_graph, FsStore, Orchestrator, RunConfig, Word2Vec};
//!
//! # fn main() -> genewalk::Result<()> {
//! let graph = Arc::new(load_graph("graph.tsv".as_ref())?);
//! let store = FsStore::create("genewalk_output")?;
//! let report = Orchestrator::new(Word2Vec).run(graph, &RunConfig::default(), &store)?;
//! report.ensure_min_success(report.requested)?;
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod cancel;
pub mod config;
pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod random_walk;
pub mod store;
pub mod vectors;
pub mod word2vec;

pub use artifact::{load_graph, parse_edge_list, parse_json, GraphArtifact};
pub use cancel::CancelToken;
pub use config::Settings;
pub use error::{
    Error, FailureKind, GraphInputError, PersistenceError, ReplicateError, Result, TrainingError,
    WalkError,
};
pub use graph::{GraphRef, MultiGraph, MultiGraphBuilder, NodeKind};
pub use orchestrator::{
    replicate_seed, Orchestrator, ReplicateFailure, ReplicateSummary, RunConfig, RunReport,
};
pub use random_walk::{
    expected_corpus_size, for_each_walk, generate_walks, generate_walks_cancellable, Corpus,
    WalkConfig,
};
pub use store::{load_artifact, ArtifactStore, FsStore, MemoryStore, ReplicateArtifact};
pub use vectors::{cosine_similarity, NodeVectors};
pub use word2vec::{EmbeddingTrainer, TrainConfig, TrainJob, Word2Vec};
