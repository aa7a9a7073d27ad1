//! API route definitions

use crate::accelerator::AcceleratorInfo;
use crate::cache::ModelCache;
use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ModelCache>,
    pub accelerator: AcceleratorInfo,
    pub prometheus_handle: metrics_exporter_prometheus::PrometheusHandle,
}

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Info and status
        .route("/", get(handlers::root))
        .route("/models", get(handlers::list_models))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        // Inference
        .route("/predict", post(handlers::predict))
        .route("/load-model/{model_name}", post(handlers::load_model))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}
