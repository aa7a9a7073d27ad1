//! Process-wide cache of loaded models

use crate::engine::LoadedModel;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{ModelLoader, ModelRegistry, load_with_fallback};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OnceCell, RwLock};

/// Memoizes model loads by registry name
///
/// Each name gets its own [`OnceCell`], so concurrent first requests for one
/// model share a single load while other models load independently. A failed
/// load leaves the cell empty and the next request retries.
pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    slots: Arc<RwLock<HashMap<String, Arc<OnceCell<LoadedModel>>>>>,
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            slots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Return the cached model, loading it on first use
    ///
    /// Unsupported names fail before the cache is touched.
    pub async fn get_or_load(&self, name: &str) -> ServiceResult<LoadedModel> {
        let entry = ModelRegistry::lookup(name)?;
        let slot = self.slot(entry.name).await;

        if let Some(model) = slot.get() {
            return Ok(model.clone());
        }

        let result = slot
            .get_or_try_init(|| async {
                tracing::info!(model = %entry.name, "Loading model");
                let started = Instant::now();

                let (model, source) = load_with_fallback(self.loader.as_ref(), entry).await?;

                tracing::info!(
                    model = %entry.name,
                    source = %source,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Model loaded"
                );
                crate::metrics::record_model_loaded(entry.name, source);

                Ok::<_, ServiceError>(model)
            })
            .await;

        match result {
            Ok(model) => {
                crate::metrics::update_loaded_count(self.loaded_count().await);
                Ok(model.clone())
            }
            Err(e) => {
                tracing::error!(model = %entry.name, error = %e, "Error loading model");
                crate::metrics::record_load_failure(entry.name);
                Err(e)
            }
        }
    }

    /// Cached model without triggering a load
    pub async fn get(&self, name: &str) -> Option<LoadedModel> {
        let slots = self.slots.read().await;
        slots.get(name).and_then(|slot| slot.get().cloned())
    }

    /// Names of models with a completed load, sorted
    pub async fn loaded_models(&self) -> Vec<String> {
        let slots = self.slots.read().await;
        let mut names: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub async fn loaded_count(&self) -> usize {
        let slots = self.slots.read().await;
        slots.values().filter(|slot| slot.initialized()).count()
    }

    pub async fn is_loaded(&self, name: &str) -> bool {
        self.get(name).await.is_some()
    }

    pub fn supported_models(&self) -> Vec<String> {
        ModelRegistry::names()
    }

    /// Get or create the load slot for a registry name
    async fn slot(&self, name: &str) -> Arc<OnceCell<LoadedModel>> {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(name) {
                return slot.clone();
            }
        }

        let mut slots = self.slots.write().await;
        slots.entry(name.to_string()).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InferenceHandle;
    use crate::models::ModelEntry;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubHandle;

    impl InferenceHandle for StubHandle {
        fn embed(&self, _text: &str) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(vec![vec![1.0, 2.0]])
        }

        fn tokenize(&self, text: &str) -> anyhow::Result<Vec<String>> {
            Ok(text.split_whitespace().map(String::from).collect())
        }
    }

    #[derive(Default)]
    struct RemoteOnlyLoader {
        remote_calls: AtomicUsize,
    }

    #[async_trait]
    impl ModelLoader for RemoteOnlyLoader {
        async fn load_local(&self, _entry: &ModelEntry) -> anyhow::Result<LoadedModel> {
            anyhow::bail!("not stored")
        }

        async fn load_remote(&self, _entry: &ModelEntry) -> anyhow::Result<LoadedModel> {
            self.remote_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(StubHandle))
        }
    }

    #[tokio::test]
    async fn test_new_cache_is_empty() {
        let cache = ModelCache::new(Arc::new(RemoteOnlyLoader::default()));
        assert_eq!(cache.loaded_count().await, 0);
        assert!(cache.loaded_models().await.is_empty());
        assert_eq!(cache.supported_models().len(), 6);
    }

    #[tokio::test]
    async fn test_get_or_load_caches() {
        let loader = Arc::new(RemoteOnlyLoader::default());
        let cache = ModelCache::new(loader.clone());

        let first = cache.get_or_load("roberta-base").await.unwrap();
        let second = cache.get_or_load("roberta-base").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.remote_calls.load(Ordering::SeqCst), 1);
        assert!(cache.is_loaded("roberta-base").await);
        assert_eq!(cache.loaded_models().await, vec!["roberta-base".to_string()]);
    }

    #[tokio::test]
    async fn test_unsupported_name_leaves_cache_untouched() {
        let loader = Arc::new(RemoteOnlyLoader::default());
        let cache = ModelCache::new(loader.clone());

        let err = match cache.get_or_load("gpt2").await {
            Ok(_) => panic!("gpt2 is not in the registry"),
            Err(e) => e,
        };
        assert!(matches!(err, ServiceError::UnsupportedModel { .. }));
        assert!(cache.slots.read().await.is_empty());
        assert_eq!(loader.remote_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_does_not_load() {
        let loader = Arc::new(RemoteOnlyLoader::default());
        let cache = ModelCache::new(loader.clone());

        assert!(cache.get("bert-base-uncased").await.is_none());
        assert_eq!(loader.remote_calls.load(Ordering::SeqCst), 0);
    }
}
