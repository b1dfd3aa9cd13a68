//! Replicate artifact persistence.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::artifact::GraphArtifact;
use crate::error::PersistenceError;
use crate::graph::MultiGraph;
use crate::orchestrator::RunReport;
use crate::random_walk::{Corpus, WalkConfig};
use crate::vectors::NodeVectors;
use crate::word2vec::TrainConfig;

/// Output of one replicate. Written once, never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicateArtifact {
    pub replicate: usize,
    pub seed: u64,
    pub walk: WalkConfig,
    pub train: TrainConfig,
    pub corpus_size: usize,
    pub vectors: NodeVectors,
}

/// Where replicate outputs go. Called from the orchestrating thread only.
pub trait ArtifactStore {
    /// Persist `artifact`, returning a description of where it went.
    fn save_replicate(&self, artifact: &ReplicateArtifact) -> Result<String, PersistenceError>;

    /// Persist the walks of one replicate.
    fn save_walks(
        &self,
        replicate: usize,
        corpus: &Corpus,
        graph: &MultiGraph,
    ) -> Result<String, PersistenceError>;
}

/// One JSON file per replicate under a directory.
///
/// Files are written to a temporary name and renamed into place.
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| PersistenceError::Io { path: dir.clone(), source })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn replicate_path(&self, replicate: usize) -> PathBuf {
        self.dir.join(format!("node_vectors_{replicate}.json"))
    }

    pub fn walks_path(&self, replicate: usize) -> PathBuf {
        self.dir.join(format!("walks_{replicate}.txt"))
    }

    pub fn graph_path(&self) -> PathBuf {
        self.dir.join("graph.json")
    }

    pub fn report_path(&self) -> PathBuf {
        self.dir.join("run_report.json")
    }

    /// Snapshot of the input graph, so the ensemble can be traced to it.
    pub fn save_graph(&self, graph: &MultiGraph) -> Result<PathBuf, PersistenceError> {
        let path = self.graph_path();
        write_json(&path, &GraphArtifact::from_graph(graph))?;
        Ok(path)
    }

    pub fn save_report(&self, report: &RunReport) -> Result<PathBuf, PersistenceError> {
        let path = self.report_path();
        write_json(&path, report)?;
        Ok(path)
    }

    pub fn load_replicate(&self, replicate: usize) -> Result<ReplicateArtifact, PersistenceError> {
        load_artifact(&self.replicate_path(replicate))
    }
}

impl ArtifactStore for FsStore {
    fn save_replicate(&self, artifact: &ReplicateArtifact) -> Result<String, PersistenceError> {
        let path = self.replicate_path(artifact.replicate);
        write_json(&path, artifact)?;
        Ok(path.display().to_string())
    }

    fn save_walks(
        &self,
        replicate: usize,
        corpus: &Corpus,
        graph: &MultiGraph,
    ) -> Result<String, PersistenceError> {
        let path = self.walks_path(replicate);
        write_atomic(&path, |w| {
            for walk in corpus.walks() {
                let mut first = true;
                for &u in walk {
                    if !first {
                        w.write_all(b" ")?;
                    }
                    w.write_all(graph.id(u).as_bytes())?;
                    first = false;
                }
                w.write_all(b"\n")?;
            }
            Ok(())
        })?;
        Ok(path.display().to_string())
    }
}

/// Read a replicate artifact written by [`FsStore`].
pub fn load_artifact(path: &Path) -> Result<ReplicateArtifact, PersistenceError> {
    let file = File::open(path).map_err(|source| PersistenceError::Io { path: path.to_path_buf(), source })?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|source| PersistenceError::Serialize { path: path.to_path_buf(), source })
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|source| PersistenceError::Serialize { path: path.to_path_buf(), source })?;
    write_atomic(path, |w| w.write_all(&bytes))
}

fn write_atomic<F>(path: &Path, fill: F) -> Result<(), PersistenceError>
where
    F: FnOnce(&mut BufWriter<File>) -> std::io::Result<()>,
{
    let io_err = |source| PersistenceError::Io { path: path.to_path_buf(), source };
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let file = File::create(&tmp).map_err(io_err)?;
    let mut w = BufWriter::new(file);
    fill(&mut w).map_err(io_err)?;
    w.flush().map_err(io_err)?;
    drop(w);
    fs::rename(&tmp, path).map_err(io_err)
}

/// Keeps artifacts in memory. Useful for embedding the orchestrator.
#[derive(Debug, Default)]
pub struct MemoryStore {
    artifacts: Mutex<BTreeMap<usize, ReplicateArtifact>>,
    walks: Mutex<BTreeMap<usize, usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn artifacts(&self) -> BTreeMap<usize, ReplicateArtifact> {
        self.artifacts.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Walk counts of replicates whose walks were saved.
    pub fn saved_walks(&self) -> BTreeMap<usize, usize> {
        self.walks.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl ArtifactStore for MemoryStore {
    fn save_replicate(&self, artifact: &ReplicateArtifact) -> Result<String, PersistenceError> {
        let location = format!("memory:{}", artifact.replicate);
        self.artifacts
            .lock()
            .map_err(|_| poisoned(&location))?
            .insert(artifact.replicate, artifact.clone());
        Ok(location)
    }

    fn save_walks(
        &self,
        replicate: usize,
        corpus: &Corpus,
        _graph: &MultiGraph,
    ) -> Result<String, PersistenceError> {
        let location = format!("memory:walks:{replicate}");
        self.walks
            .lock()
            .map_err(|_| poisoned(&location))?
            .insert(replicate, corpus.len());
        Ok(location)
    }
}

fn poisoned(location: &str) -> PersistenceError {
    PersistenceError::Io {
        path: PathBuf::from(location),
        source: std::io::Error::other("memory store lock poisoned"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::parse_edge_list;
    use crate::random_walk::generate_walks;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn artifact(replicate: usize) -> ReplicateArtifact {
        let mut vectors = NodeVectors::new(2);
        vectors.insert("HGNC:5", vec![0.5, -0.25]).unwrap();
        vectors.insert("GO:0001", vec![1.0, 0.0]).unwrap();
        ReplicateArtifact {
            replicate,
            seed: 99,
            walk: WalkConfig::default(),
            train: TrainConfig::default(),
            corpus_size: 600,
            vectors,
        }
    }

    #[test]
    fn fs_store_round_trips_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::create(dir.path().join("out")).unwrap();
        let a = artifact(3);
        let loc = store.save_replicate(&a).unwrap();
        assert!(loc.ends_with("node_vectors_3.json"));
        assert_eq!(store.load_replicate(3).unwrap(), a);
        assert!(!store.dir().join("node_vectors_3.json.tmp").exists());
    }

    #[test]
    fn fs_store_writes_walks_and_graph() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::create(dir.path()).unwrap();
        let g = parse_edge_list("A\tB\nB\tC\n").unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let corpus = generate_walks(&g, WalkConfig { length: 3, iterations: 2 }, &mut rng).unwrap();
        store.save_walks(1, &corpus, &g).unwrap();
        let text = fs::read_to_string(store.walks_path(1)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), corpus.len());
        assert!(lines.iter().all(|l| l.split(' ').count() == 3));
        assert!(lines[0].starts_with("A "));

        let path = store.save_graph(&g).unwrap();
        let snapshot: GraphArtifact = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(snapshot.edges.len(), 2);
    }

    #[test]
    fn load_missing_or_corrupt_artifact_fails_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::create(dir.path()).unwrap();
        assert!(matches!(store.load_replicate(1), Err(PersistenceError::Io { .. })));
        fs::write(store.replicate_path(2), "{").unwrap();
        match store.load_replicate(2) {
            Err(PersistenceError::Serialize { path, .. }) => assert_eq!(path, store.replicate_path(2)),
            other => panic!("expected serialize error, got {other:?}"),
        }
    }

    #[test]
    fn unwritable_directory_is_a_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        assert!(FsStore::create(blocker.join("sub")).is_err());
    }

    #[test]
    fn memory_store_keeps_by_index() {
        let store = MemoryStore::new();
        store.save_replicate(&artifact(2)).unwrap();
        store.save_replicate(&artifact(1)).unwrap();
        assert_eq!(store.artifacts().keys().copied().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn poisoned_memory_store_reports_an_error() {
        let store = MemoryStore::new();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = store.artifacts.lock().unwrap();
            panic!("poison");
        }));
        let err = store.save_replicate(&artifact(1)).unwrap_err();
        assert!(matches!(err, PersistenceError::Io { .. }));
        assert!(err.to_string().contains("poisoned"));
    }
}
