//! API request and response models

use crate::error::ServiceError;
use crate::inference::{FEATURE_EXTRACTION, PredictionOutput, TokenFeatures};
use serde::{Deserialize, Serialize};

/// Root endpoint response
#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
    pub supported_models: Vec<String>,
}

/// Configured vs loaded model names
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub supported_models: Vec<String>,
    pub loaded_models: Vec<String>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub models_loaded: usize,
    pub cuda_available: bool,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Request to run a model on a piece of text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictRequest {
    pub text: String,
    pub model_name: String,

    /// "feature-extraction" returns embeddings, anything else token features
    #[serde(default = "default_task")]
    pub task: String,
}

fn default_task() -> String {
    FEATURE_EXTRACTION.to_string()
}

/// Prediction response
///
/// Exactly one of `embeddings`, `features` and `error` is set. Load and
/// inference failures are reported through `error` with a 200 status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
    pub model_name: String,
    pub text: String,
    pub task: String,
    #[serde(default)]
    pub embeddings: Option<Vec<Vec<f32>>>,
    #[serde(default)]
    pub features: Option<TokenFeatures>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PredictResponse {
    fn empty(request: PredictRequest) -> Self {
        Self {
            model_name: request.model_name,
            text: request.text,
            task: request.task,
            embeddings: None,
            features: None,
            error: None,
        }
    }

    pub fn success(request: PredictRequest, output: PredictionOutput) -> Self {
        let mut response = Self::empty(request);
        match output {
            PredictionOutput::Embeddings(embeddings) => response.embeddings = Some(embeddings),
            PredictionOutput::Features(features) => response.features = Some(features),
        }
        response
    }

    pub fn failure(request: PredictRequest, error: &ServiceError) -> Self {
        let mut response = Self::empty(request);
        response.error = Some(error.to_string());
        response
    }
}

/// Load-model endpoint response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoadModelResponse {
    pub message: String,
}
