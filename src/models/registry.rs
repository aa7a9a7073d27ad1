//! Static registry of supported models

use crate::error::{ServiceError, ServiceResult};
use serde::Serialize;

/// A supported model: short name and the hub identifier it is fetched from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelEntry {
    /// Short registry key used in requests (e.g., "bert-base-uncased")
    pub name: &'static str,
    /// HuggingFace model ID, only used when fetching on a local miss
    pub remote_id: &'static str,
}

impl ModelEntry {
    const fn new(name: &'static str, remote_id: &'static str) -> Self {
        Self { name, remote_id }
    }
}

/// All models this service knows how to serve
pub const SUPPORTED_MODELS: [ModelEntry; 6] = [
    ModelEntry::new("bert-base-uncased", "bert-base-uncased"),
    ModelEntry::new("bert-large-uncased", "bert-large-uncased"),
    ModelEntry::new("roberta-base", "roberta-base"),
    ModelEntry::new("roberta-large", "roberta-large"),
    ModelEntry::new("albert-base-v1", "albert-base-v1"),
    ModelEntry::new("albert-base-v2", "albert-base-v2"),
];

/// Read-only view over [`SUPPORTED_MODELS`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelRegistry;

impl ModelRegistry {
    /// Look up a model by its short name
    pub fn lookup(name: &str) -> ServiceResult<&'static ModelEntry> {
        SUPPORTED_MODELS
            .iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| ServiceError::UnsupportedModel {
                name: name.to_string(),
                supported: Self::names(),
            })
    }

    /// Check if a name is in the registry
    pub fn contains(name: &str) -> bool {
        SUPPORTED_MODELS.iter().any(|entry| entry.name == name)
    }

    /// Supported model names in declaration order
    pub fn names() -> Vec<String> {
        SUPPORTED_MODELS
            .iter()
            .map(|entry| entry.name.to_string())
            .collect()
    }

    pub fn entries() -> &'static [ModelEntry] {
        &SUPPORTED_MODELS
    }

    pub fn count() -> usize {
        SUPPORTED_MODELS.len()
    }
}
