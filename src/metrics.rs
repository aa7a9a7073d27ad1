//! Prometheus metrics

use crate::models::LoadSource;
use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;

/// Setup Prometheus metrics exporter
/// Returns a handle that can be used to retrieve metrics
pub fn setup_metrics() -> Result<metrics_exporter_prometheus::PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus exporter: {}", e))?;

    tracing::info!("Prometheus metrics exporter installed");

    Ok(handle)
}

/// Record a model entering the cache
pub fn record_model_loaded(name: &str, source: LoadSource) {
    metrics::counter!("logprompt_models_loaded_total",
        "model" => name.to_string(),
        "source" => source.to_string()
    )
    .increment(1);
}

/// Record a model that failed both load paths
pub fn record_load_failure(name: &str) {
    metrics::counter!("logprompt_model_load_failures_total",
        "model" => name.to_string()
    )
    .increment(1);
}

/// Record a finished prediction
///
/// Task values are caller-supplied, so anything other than feature
/// extraction is folded into one label.
pub fn record_prediction(name: &str, feature_extraction: bool, success: bool) {
    let task = if feature_extraction {
        "feature-extraction"
    } else {
        "features"
    };
    let outcome = if success { "success" } else { "error" };

    metrics::counter!("logprompt_predictions_total",
        "model" => name.to_string(),
        "task" => task,
        "outcome" => outcome
    )
    .increment(1);
}

/// Update loaded model count gauge
pub fn update_loaded_count(count: usize) {
    metrics::gauge!("logprompt_models_loaded").set(count as f64);
}
