//! Error taxonomy.
//!
//! Graph input errors abort a run before any replicate is scheduled. Everything
//! that can go wrong inside a replicate is a [`ReplicateError`], which the
//! orchestrator records per replicate index without touching siblings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The graph artifact could not be turned into a [`MultiGraph`](crate::MultiGraph).
#[derive(Debug, Error)]
pub enum GraphInputError {
    #[error("cannot read graph artifact {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed graph artifact: {0}")]
    Malformed(String),
    #[error("malformed edge list line {line}: {message}")]
    MalformedLine { line: usize, message: String },
    #[error("edge {edge} references unknown node `{node}`")]
    DanglingEdge { edge: usize, node: String },
    #[error("duplicate node id `{0}`")]
    DuplicateNode(String),
    #[error("graph has no nodes")]
    Empty,
}

/// Walk generation failed. Apart from cancellation these are contract violations.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("invalid walk parameter: {0}")]
    InvalidParameter(String),
    #[error("walk started from zero-degree node {0}")]
    ZeroDegreeStart(usize),
    #[error("walk reached node {0} with an empty adjacency list")]
    DeadEnd(usize),
    #[error("corpus has {actual} walks, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("walk generation cancelled after {completed} walks")]
    Cancelled { completed: usize },
}

/// Raised by an [`EmbeddingTrainer`](crate::EmbeddingTrainer).
#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("corpus is empty")]
    EmptyCorpus,
    #[error("no token occurs at least {min_count} times")]
    EmptyVocabulary { min_count: usize },
    #[error("invalid training configuration: {0}")]
    InvalidConfig(String),
    #[error("training cancelled")]
    Cancelled,
    #[error("trainer failed: {0}")]
    Failed(String),
}

/// Reading or writing an artifact failed. Always carries the path.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error on {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a single replicate did not produce an artifact.
#[derive(Debug, Error)]
pub enum ReplicateError {
    #[error(transparent)]
    Walk(#[from] WalkError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("replicate exceeded its {0:?} timeout")]
    Timeout(Duration),
    #[error("replicate cancelled before it started")]
    Cancelled,
    #[error("replicate panicked: {0}")]
    Panicked(String),
    #[error("cannot spawn replicate thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Coarse failure class recorded in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    WalkGeneration,
    Training,
    Persistence,
    Timeout,
    Cancelled,
    Panicked,
    Spawn,
}

impl ReplicateError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Walk(WalkError::Cancelled { .. }) => FailureKind::Cancelled,
            Self::Walk(_) => FailureKind::WalkGeneration,
            Self::Training(TrainingError::Cancelled) => FailureKind::Cancelled,
            Self::Training(_) => FailureKind::Training,
            Self::Persistence(_) => FailureKind::Persistence,
            Self::Timeout(_) => FailureKind::Timeout,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Panicked(_) => FailureKind::Panicked,
            Self::Spawn(_) => FailureKind::Spawn,
        }
    }
}

/// Run-level errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    GraphInput(#[from] GraphInputError),
    #[error("invalid run configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("{succeeded} of {requested} replicates succeeded, {required} required")]
    InsufficientReplicates {
        succeeded: usize,
        requested: usize,
        required: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
