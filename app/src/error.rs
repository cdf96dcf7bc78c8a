use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("source unreachable: {location}: {reason}")]
    SourceUnreachable { location: String, reason: String },

    #[error("source not found: {location}")]
    SourceNotFound { location: String },

    #[error("malformed document from {location}: {reason}")]
    MalformedDocument { location: String, reason: String },

    #[error("enrichment unavailable: {0}")]
    EnrichmentUnavailable(String),
}

impl IngestError {
    pub fn unreachable(location: &str, reason: impl ToString) -> Self {
        IngestError::SourceUnreachable {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(location: &str, reason: impl ToString) -> Self {
        IngestError::MalformedDocument {
            location: location.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message): (StatusCode, String) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
