//! Error types shared by the model cache, prediction path and API

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors surfaced by the service
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Requested model name is not in the registry
    #[error("Model {name} not supported. Available models: {supported:?}")]
    UnsupportedModel {
        name: String,
        supported: Vec<String>,
    },

    /// Both the local and the remote load attempts failed
    #[error("Failed to load model {name}: {message}")]
    LoadFailure { name: String, message: String },

    /// The engine failed while tokenizing or embedding on a loaded model
    #[error("Inference failed for model {name}: {message}")]
    InferenceFailure { name: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ServiceError {
    /// HTTP status for this error when it is reported as a failed request
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::UnsupportedModel { .. } => StatusCode::BAD_REQUEST,
            ServiceError::LoadFailure { .. }
            | ServiceError::InferenceFailure { .. }
            | ServiceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(ErrorResponse {
            detail: self.to_string(),
            timestamp: chrono::Utc::now(),
        });

        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    timestamp: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_model_message() {
        let err = ServiceError::UnsupportedModel {
            name: "invalid-model".to_string(),
            supported: vec!["bert-base-uncased".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("invalid-model not supported"));
        assert!(msg.contains("bert-base-uncased"));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_load_failure_is_server_error() {
        let err = ServiceError::LoadFailure {
            name: "roberta-base".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().contains("connection refused"));
    }
}
