//! API request handlers

use super::models::{
    HealthResponse, LoadModelResponse, ModelsResponse, PredictRequest, PredictResponse,
    RootResponse,
};
use super::routes::AppState;
use crate::error::ServiceError;
use crate::inference::{self, is_feature_extraction};
use crate::models::ModelRegistry;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

/// GET / - Service info
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "LogPrompt - Transformer Models API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        supported_models: ModelRegistry::names(),
    })
}

/// GET /models - Supported and loaded models
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        supported_models: state.cache.supported_models(),
        loaded_models: state.cache.loaded_models().await,
    })
}

/// GET /health - Service health check
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".to_string(),
            models_loaded: state.cache.loaded_count().await,
            cuda_available: state.accelerator.is_available(),
            timestamp: chrono::Utc::now(),
        }),
    )
}

/// GET /metrics - Prometheus metrics
pub async fn metrics(State(state): State<AppState>) -> String {
    state.prometheus_handle.render()
}

/// POST /predict - Run a model on the request text
///
/// Unsupported model names are rejected with 400. Load and inference failures
/// still answer 200, with the message in the `error` field.
pub async fn predict(
    State(state): State<AppState>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, ServiceError> {
    let feature_extraction = is_feature_extraction(&req.task);

    match inference::predict(&state.cache, &req.model_name, &req.task, &req.text).await {
        Ok(output) => {
            crate::metrics::record_prediction(&req.model_name, feature_extraction, true);
            Ok(Json(PredictResponse::success(req, output)))
        }
        Err(err @ ServiceError::UnsupportedModel { .. }) => Err(err),
        Err(err) => {
            tracing::error!(
                model = %req.model_name,
                task = %req.task,
                error = %err,
                "Error processing request"
            );
            crate::metrics::record_prediction(&req.model_name, feature_extraction, false);
            Ok(Json(PredictResponse::failure(req, &err)))
        }
    }
}

/// POST /load-model/{model_name} - Preload a model
pub async fn load_model(
    State(state): State<AppState>,
    Path(model_name): Path<String>,
) -> Result<Json<LoadModelResponse>, ServiceError> {
    state.cache.get_or_load(&model_name).await?;

    Ok(Json(LoadModelResponse {
        message: format!("Model {} loaded successfully", model_name),
    }))
}
