//! Shared fixtures: a scriptable model loader and an in-process API server

#![allow(dead_code)]

use async_trait::async_trait;
use axum_test::TestServer;
use logprompt::{
    AcceleratorInfo, InferenceHandle, LoadedModel, ModelCache, ModelEntry, ModelLoader,
    api::routes::{AppState, create_router},
    metrics,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

/// Width of the vectors produced by [`MockHandle`]
pub const HIDDEN_SIZE: usize = 8;

// Global metrics handle - only initialize once per test process
static METRICS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

pub fn get_metrics_handle() -> metrics_exporter_prometheus::PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| metrics::setup_metrics().expect("Failed to setup metrics"))
        .clone()
}

/// Whitespace tokenizer that wraps the sequence in [CLS] ... [SEP]
pub struct MockHandle {
    fail_inference: bool,
}

impl InferenceHandle for MockHandle {
    fn embed(&self, text: &str) -> anyhow::Result<Vec<Vec<f32>>> {
        if self.fail_inference {
            anyhow::bail!("engine exploded");
        }
        let tokens = text.split_whitespace().count() + 2;
        Ok((0..tokens)
            .map(|i| vec![i as f32; HIDDEN_SIZE])
            .collect())
    }

    fn tokenize(&self, text: &str) -> anyhow::Result<Vec<String>> {
        if self.fail_inference {
            anyhow::bail!("engine exploded");
        }
        Ok(text.split_whitespace().map(|t| t.to_lowercase()).collect())
    }
}

/// Loader with configurable outcomes and call counters
#[derive(Default)]
pub struct MockLoader {
    /// Names that have a local copy
    pub stored: Mutex<HashSet<String>>,
    /// Fail every remote load while set
    pub remote_down: AtomicBool,
    /// Handles produced fail on every engine call
    pub fail_inference: bool,
    /// Simulated load latency
    pub delay: Option<Duration>,
    pub local_calls: AtomicUsize,
    pub remote_calls: AtomicUsize,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stored(names: &[&str]) -> Self {
        let loader = Self::default();
        loader
            .stored
            .lock()
            .unwrap()
            .extend(names.iter().map(|n| n.to_string()));
        loader
    }

    pub fn offline() -> Self {
        let loader = Self::default();
        loader.set_remote_down(true);
        loader
    }

    pub fn set_remote_down(&self, down: bool) {
        self.remote_down.store(down, Ordering::SeqCst);
    }

    pub fn local_calls(&self) -> usize {
        self.local_calls.load(Ordering::SeqCst)
    }

    pub fn remote_calls(&self) -> usize {
        self.remote_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.local_calls() + self.remote_calls()
    }

    fn handle(&self) -> LoadedModel {
        Arc::new(MockHandle {
            fail_inference: self.fail_inference,
        })
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ModelLoader for MockLoader {
    async fn load_local(&self, entry: &ModelEntry) -> anyhow::Result<LoadedModel> {
        self.local_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if self.stored.lock().unwrap().contains(entry.name) {
            Ok(self.handle())
        } else {
            anyhow::bail!("No local copy of {}", entry.name)
        }
    }

    async fn load_remote(&self, entry: &ModelEntry) -> anyhow::Result<LoadedModel> {
        self.remote_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if self.remote_down.load(Ordering::SeqCst) {
            anyhow::bail!("hub unreachable for {}", entry.remote_id)
        }

        // Remote loads leave a local copy behind
        self.stored.lock().unwrap().insert(entry.name.to_string());
        Ok(self.handle())
    }
}

/// Build an in-process server around the given loader
pub fn create_test_server(loader: Arc<MockLoader>) -> (TestServer, Arc<ModelCache>) {
    let cache = Arc::new(ModelCache::new(loader));

    let state = AppState {
        cache: cache.clone(),
        accelerator: AcceleratorInfo::default(),
        prometheus_handle: get_metrics_handle(),
    };

    let app = create_router(state);
    let server = TestServer::try_new(app).expect("Failed to create test server");

    (server, cache)
}
