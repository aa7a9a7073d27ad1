//! Local model storage layout
//!
//! Every registry entry owns a directory under the models root. hf-hub writes
//! its standard cache structure inside it:
//! ```text
//! ./models/
//! ├── bert-base-uncased/
//! │   └── models--bert-base-uncased/
//! │       ├── snapshots/
//! │       │   └── {revision}/
//! │       │       ├── config.json
//! │       │       ├── model.safetensors
//! │       │       └── tokenizer.json
//! │       └── refs/
//! │           └── main
//! └── roberta-base/
//!     └── ...
//! ```

use super::registry::{ModelEntry, ModelRegistry};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Root of the on-disk model storage
#[derive(Debug, Clone)]
pub struct ModelStorage {
    root: PathBuf,
}

impl ModelStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the models root if missing. Returns true when it was created.
    pub fn ensure_root(&self) -> Result<bool> {
        if self.root.is_dir() {
            return Ok(false);
        }
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("Cannot create models directory: {:?}", self.root))?;
        tracing::info!(path = ?self.root, "Created models directory");
        Ok(true)
    }

    /// Per-model storage directory, used as the hf-hub cache dir
    pub fn model_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Path of the snapshot holding the model files, if one was downloaded
    ///
    /// Resolves via `refs/main` first, then falls back to the first snapshot
    /// that contains a config.json.
    pub fn snapshot_path(&self, entry: &ModelEntry) -> Option<PathBuf> {
        let repo_dir = self
            .model_dir(entry.name)
            .join(remote_id_to_cache_name(entry.remote_id));

        let refs_main = repo_dir.join("refs/main");
        if let Ok(revision) = std::fs::read_to_string(&refs_main) {
            let snapshot_path = repo_dir.join("snapshots").join(revision.trim());
            if snapshot_path.join("config.json").exists() {
                return Some(snapshot_path);
            }
        }

        std::fs::read_dir(repo_dir.join("snapshots"))
            .ok()?
            .flatten()
            .map(|entry| entry.path())
            .find(|path| path.join("config.json").exists())
    }

    /// Check if a model has a usable snapshot on disk
    pub fn is_stored(&self, entry: &ModelEntry) -> bool {
        self.snapshot_path(entry).is_some()
    }

    /// Total size of a model's storage directory in bytes
    pub fn stored_size(&self, entry: &ModelEntry) -> Option<u64> {
        let model_dir = self.model_dir(entry.name);
        if !model_dir.exists() {
            return None;
        }
        Some(dir_size(&model_dir))
    }

    /// Names of registry models that are already stored locally
    pub fn stored_models(&self) -> Vec<String> {
        ModelRegistry::entries()
            .iter()
            .filter(|entry| self.is_stored(entry))
            .map(|entry| entry.name.to_string())
            .collect()
    }
}

/// Weight file formats the engine can read
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeightsFile {
    SafeTensors(PathBuf),
    PyTorch(PathBuf),
}

impl WeightsFile {
    /// Classify a weight file by its extension
    pub fn from_path(path: PathBuf) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("safetensors") => WeightsFile::SafeTensors(path),
            _ => WeightsFile::PyTorch(path),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            WeightsFile::SafeTensors(path) | WeightsFile::PyTorch(path) => path,
        }
    }
}

/// Resolved artifact files for one model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: WeightsFile,
}

/// Weight file names in order of preference
pub const WEIGHT_FILES: [&str; 2] = ["model.safetensors", "pytorch_model.bin"];

impl ModelFiles {
    /// Collect the artifact files from a snapshot directory
    pub fn from_snapshot(snapshot: &Path) -> Result<Self> {
        let config = snapshot.join("config.json");
        if !config.is_file() {
            anyhow::bail!("config.json not found in {:?}", snapshot);
        }

        let tokenizer = snapshot.join("tokenizer.json");
        if !tokenizer.is_file() {
            anyhow::bail!("tokenizer.json not found in {:?}", snapshot);
        }

        let weights = WEIGHT_FILES
            .iter()
            .map(|file| snapshot.join(file))
            .find(|path| path.is_file())
            .map(WeightsFile::from_path)
            .with_context(|| format!("No weight files found in {:?}", snapshot))?;

        Ok(Self {
            config,
            tokenizer,
            weights,
        })
    }
}

/// Convert a hub ID to the cache directory name hf-hub uses
///
/// e.g., "sentence-transformers/all-MiniLM-L6-v2" -> "models--sentence-transformers--all-MiniLM-L6-v2"
fn remote_id_to_cache_name(remote_id: &str) -> String {
    format!("models--{}", remote_id.replace('/', "--"))
}

/// Recursively calculate directory size
fn dir_size(path: &Path) -> u64 {
    let mut size = 0;

    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                size += dir_size(&path);
            } else if let Ok(metadata) = std::fs::metadata(&path) {
                size += metadata.len();
            }
        }
    }

    size
}
