//! Two-step model load policy
//!
//! A load first tries the model's local storage directory and only reaches
//! out to the hub when that fails. Both steps sit behind [`ModelLoader`] so
//! the policy can be exercised without the real engine.

use super::download::download_model_files;
use super::registry::ModelEntry;
use super::storage::{ModelFiles, ModelStorage};
use crate::accelerator::{self, AcceleratorInfo};
use crate::engine::{EncoderModel, LoadedModel};
use crate::error::{ServiceError, ServiceResult};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Where a loaded model came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadSource {
    Local,
    Remote,
}

impl std::fmt::Display for LoadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Loads a registry entry into a ready inference handle
#[async_trait]
pub trait ModelLoader: Send + Sync {
    /// Load using only files already in local storage
    async fn load_local(&self, entry: &ModelEntry) -> Result<LoadedModel>;

    /// Fetch from the hub into local storage, then load
    async fn load_remote(&self, entry: &ModelEntry) -> Result<LoadedModel>;
}

/// Local first, remote on any local failure
///
/// Fails with [`ServiceError::LoadFailure`] carrying both causes when the
/// remote step fails too.
pub async fn load_with_fallback(
    loader: &dyn ModelLoader,
    entry: &ModelEntry,
) -> ServiceResult<(LoadedModel, LoadSource)> {
    let local_error = match loader.load_local(entry).await {
        Ok(model) => return Ok((model, LoadSource::Local)),
        Err(e) => e,
    };

    tracing::info!(
        model = %entry.name,
        reason = %format!("{:#}", local_error),
        "Local copy unavailable, downloading from HuggingFace Hub"
    );

    match loader.load_remote(entry).await {
        Ok(model) => Ok((model, LoadSource::Remote)),
        Err(remote_error) => Err(ServiceError::LoadFailure {
            name: entry.name.to_string(),
            message: format!(
                "local load failed ({:#}); remote load failed ({:#})",
                local_error, remote_error
            ),
        }),
    }
}

/// Loader backed by on-disk storage, hf-hub and the candle engine
pub struct HubModelLoader {
    storage: ModelStorage,
    accelerator: AcceleratorInfo,
}

impl HubModelLoader {
    pub fn with_accelerator(storage: ModelStorage, accelerator: AcceleratorInfo) -> Self {
        Self {
            storage,
            accelerator,
        }
    }

    /// Build the engine off the async runtime; weight loading is blocking
    async fn build(&self, entry: &ModelEntry, files: ModelFiles) -> Result<LoadedModel> {
        let accelerator = self.accelerator;
        let name = entry.name;

        let model = tokio::task::spawn_blocking(move || {
            let device = accelerator.select_device();
            tracing::debug!(
                model = %name,
                device = accelerator::device_label(&device),
                "Building model"
            );
            EncoderModel::load(&files, device)
        })
        .await
        .context("Model build task panicked")??;

        Ok(Arc::new(model))
    }
}

#[async_trait]
impl ModelLoader for HubModelLoader {
    async fn load_local(&self, entry: &ModelEntry) -> Result<LoadedModel> {
        let snapshot = self.storage.snapshot_path(entry).with_context(|| {
            format!(
                "No local copy of {} in {:?}",
                entry.name,
                self.storage.model_dir(entry.name)
            )
        })?;

        let files = ModelFiles::from_snapshot(&snapshot)?;
        self.build(entry, files).await
    }

    async fn load_remote(&self, entry: &ModelEntry) -> Result<LoadedModel> {
        let files =
            download_model_files(entry.remote_id, &self.storage.model_dir(entry.name)).await?;
        self.build(entry, files).await
    }
}
