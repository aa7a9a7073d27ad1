//! Model management module
//!
//! Provides functionality for:
//! - The static registry of supported models
//! - The per-model local storage layout
//! - Downloading model artifacts from HuggingFace Hub
//! - The local-then-remote load policy

pub mod download;
pub mod loader;
pub mod registry;
pub mod storage;

pub use download::download_model_files;
pub use loader::{HubModelLoader, LoadSource, ModelLoader, load_with_fallback};
pub use registry::{ModelEntry, ModelRegistry, SUPPORTED_MODELS};
pub use storage::{ModelFiles, ModelStorage, WeightsFile};
