//! Prediction path: cached model + request text -> typed output

use crate::cache::ModelCache;
use crate::error::{ServiceError, ServiceResult};
use serde::{Deserialize, Serialize};

/// Task that returns per-token embeddings; every other task returns features
pub const FEATURE_EXTRACTION: &str = "feature-extraction";

/// Maximum number of tokens echoed back in [`TokenFeatures`]
pub const MAX_FEATURE_TOKENS: usize = 50;

/// Token-level summary returned for non feature-extraction tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenFeatures {
    pub num_tokens: usize,
    /// First [`MAX_FEATURE_TOKENS`] tokens
    pub tokens: Vec<String>,
    /// Length of the input text in characters
    pub text_length: usize,
}

impl TokenFeatures {
    pub fn from_tokens(mut tokens: Vec<String>, text: &str) -> Self {
        let num_tokens = tokens.len();
        tokens.truncate(MAX_FEATURE_TOKENS);
        Self {
            num_tokens,
            tokens,
            text_length: text.chars().count(),
        }
    }
}

/// Successful prediction result
#[derive(Debug, Clone, PartialEq)]
pub enum PredictionOutput {
    Embeddings(Vec<Vec<f32>>),
    Features(TokenFeatures),
}

pub fn is_feature_extraction(task: &str) -> bool {
    task == FEATURE_EXTRACTION
}

/// Run a prediction against the named model, loading it if needed
///
/// Returns [`ServiceError::UnsupportedModel`] for unknown names,
/// [`ServiceError::LoadFailure`] when the model cannot be loaded, and
/// [`ServiceError::InferenceFailure`] when the engine fails on the text.
pub async fn predict(
    cache: &ModelCache,
    model_name: &str,
    task: &str,
    text: &str,
) -> ServiceResult<PredictionOutput> {
    let model = cache.get_or_load(model_name).await?;
    let owned_text = text.to_string();

    if is_feature_extraction(task) {
        let embeddings = run_blocking(model_name, move || model.embed(&owned_text)).await?;
        Ok(PredictionOutput::Embeddings(embeddings))
    } else {
        let tokens = run_blocking(model_name, move || model.tokenize(&owned_text)).await?;
        Ok(PredictionOutput::Features(TokenFeatures::from_tokens(
            tokens, text,
        )))
    }
}

/// Run an engine call on the blocking pool, mapping failures to the model
async fn run_blocking<T, F>(model_name: &str, f: F) -> ServiceResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServiceError::Internal {
            message: format!("Inference task failed: {}", e),
        })?
        .map_err(|e| ServiceError::InferenceFailure {
            name: model_name.to_string(),
            message: format!("{:#}", e),
        })
}
