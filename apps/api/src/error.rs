use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("job {0} not found")]
    JobNotFound(String),
    #[error("object store error: {0}")]
    Store(#[from] s3::S3Error),
    #[error("broker error: {0}")]
    Broker(#[from] audio_broker::BrokerError),
    #[error("state store error: {0}")]
    State(#[from] audio_state::StateError),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::JobNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let code = match &self {
            ApiError::JobNotFound(_) => "job_not_found",
            ApiError::Store(_) => "object_store_error",
            ApiError::Broker(_) => "broker_error",
            ApiError::State(_) => "state_store_error",
            ApiError::Json(_) => "serialization_error",
        };

        tracing::error!(error = %self, code, "request_failed");

        (
            status,
            Json(json!({"error": {"code": code, "message": self.to_string()}})),
        )
            .into_response()
    }
}
