//! LogPrompt - Transformer Models API
//!
//! Serves embeddings and token features from a fixed set of pretrained
//! transformer models over HTTP. Models are loaded on first use, from local
//! storage when present and from HuggingFace Hub otherwise, and kept for the
//! lifetime of the process.

pub mod accelerator;
pub mod api;
pub mod cache;
pub mod config;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod inference;
pub mod metrics;
pub mod models;

pub use accelerator::AcceleratorInfo;
pub use cache::ModelCache;
pub use config::ServiceConfig;
pub use engine::{InferenceHandle, LoadedModel};
pub use error::{ServiceError, ServiceResult};
pub use inference::{PredictionOutput, TokenFeatures};
pub use models::{HubModelLoader, LoadSource, ModelEntry, ModelLoader, ModelRegistry, ModelStorage};
