//! Run settings loaded from a JSON file.
//!
//! ```json
//! {
//!   "graph": "graph.tsv",
//!   "output_dir": "genewalk_output",
//!   "replicates": 10,
//!   "parallelism": 4,
//!   "walk": { "length": 10, "iterations": 100 },
//!   "train": { "vector_size": 8, "window_size": 1 }
//! }
//! ```
//!
//! Every field is optional. Command-line flags override file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::orchestrator::RunConfig;

pub const DEFAULT_OUTPUT_DIR: &str = "genewalk_output";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Graph artifact to load.
    pub graph: Option<PathBuf>,
    pub output_dir: PathBuf,
    #[serde(flatten)]
    pub run: RunConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            graph: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            run: RunConfig::default(),
        }
    }
}

impl Settings {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read settings from `path`. Relative graph paths resolve against the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        let mut settings: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        if let (Some(graph), Some(base)) = (settings.graph.as_ref(), path.parent()) {
            if graph.is_relative() {
                settings.graph = Some(base.join(graph));
            }
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_all_defaults() {
        let s = Settings::from_json("{}").unwrap();
        assert_eq!(s, Settings::default());
        assert_eq!(s.run.replicates, 10);
        assert_eq!(s.run.parallelism, 1);
        assert_eq!(s.run.master_seed, 42);
    }

    #[test]
    fn run_fields_are_flattened() {
        let s = Settings::from_json(
            r#"{"output_dir": "out", "replicates": 4, "parallelism": 2, "save_walks": true,
                "train": {"use_skipgram": false}}"#,
        )
        .unwrap();
        assert_eq!(s.output_dir, PathBuf::from("out"));
        assert_eq!(s.run.replicates, 4);
        assert_eq!(s.run.parallelism, 2);
        assert!(s.run.save_walks);
        assert!(!s.run.train.use_skipgram);
    }

    #[test]
    fn bad_json_is_a_config_error() {
        assert!(matches!(Settings::from_json("{"), Err(Error::Config(_))));
        assert!(matches!(Settings::from_json(r#"{"replicates": "x"}"#), Err(Error::Config(_))));
    }

    #[test]
    fn load_error_names_the_file_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{").unwrap();
        let msg = Settings::load(&path).unwrap_err().to_string();
        assert!(msg.contains("broken.json"), "{msg}");
        assert_eq!(msg.matches("invalid run configuration").count(), 1, "{msg}");
    }

    #[test]
    fn graph_path_resolves_next_to_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"graph": "g.tsv"}"#).unwrap();
        let s = Settings::load(&path).unwrap();
        assert_eq!(s.graph, Some(dir.path().join("g.tsv")));
    }
}
