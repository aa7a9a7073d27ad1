//! Model download functionality using hf-hub
//!
//! Fetches the artifacts the engine needs from HuggingFace Hub into a
//! model's storage directory, laid out as a standard hf-hub cache.

use super::storage::{ModelFiles, WEIGHT_FILES, WeightsFile};
use anyhow::{Context, Result};
use hf_hub::api::tokio::{ApiBuilder, ApiRepo};
use std::path::{Path, PathBuf};

/// Download a model's artifacts into `cache_dir`
///
/// Files are always fetched from the hub, replacing whatever is already in
/// the cache directory.
///
/// # Arguments
/// * `remote_id` - The model identifier (e.g., "bert-base-uncased")
/// * `cache_dir` - Storage directory the files are written into
pub async fn download_model_files(remote_id: &str, cache_dir: &Path) -> Result<ModelFiles> {
    tracing::info!(remote_id = %remote_id, cache_dir = ?cache_dir, "Starting model download via hf-hub");

    tokio::fs::create_dir_all(cache_dir)
        .await
        .with_context(|| format!("Cannot create model directory: {:?}", cache_dir))?;

    let api = ApiBuilder::new()
        .with_cache_dir(cache_dir.to_path_buf())
        .with_progress(false)
        .build()
        .context("Failed to create HF API client")?;

    let repo = api.model(remote_id.to_string());

    let config = fetch(&repo, remote_id, "config.json").await?;
    let tokenizer = fetch(&repo, remote_id, "tokenizer.json").await?;
    let weights = fetch_weights(&repo, remote_id).await?;

    // Tokenizer sidecars are optional, only log when present
    let optional_files = ["tokenizer_config.json", "special_tokens_map.json", "vocab.txt"];
    for file in &optional_files {
        if repo.download(file).await.is_ok() {
            tracing::debug!(remote_id = %remote_id, file = %file, "Downloaded optional file");
        }
    }

    tracing::info!(remote_id = %remote_id, weights = ?weights.path(), "Model download complete");

    Ok(ModelFiles {
        config,
        tokenizer,
        weights,
    })
}

async fn fetch(repo: &ApiRepo, remote_id: &str, file: &str) -> Result<PathBuf> {
    tracing::debug!(remote_id = %remote_id, file = %file, "Downloading file");
    repo.download(file)
        .await
        .with_context(|| format!("Failed to download {} for {}", file, remote_id))
}

/// Download the first available weight file, safetensors preferred
async fn fetch_weights(repo: &ApiRepo, remote_id: &str) -> Result<WeightsFile> {
    let mut last_error = None;

    for file in WEIGHT_FILES {
        match repo.download(file).await {
            Ok(path) => {
                tracing::debug!(remote_id = %remote_id, file = %file, "Downloaded weight file");
                return Ok(WeightsFile::from_path(path));
            }
            Err(e) => {
                tracing::debug!(remote_id = %remote_id, file = %file, error = %e, "Weight file unavailable");
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) => Err(e).with_context(|| format!("No weight files available for {}", remote_id)),
        None => anyhow::bail!("No weight files available for {}", remote_id),
    }
}
