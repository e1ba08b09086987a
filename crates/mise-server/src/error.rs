//! JSON error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mise_pipeline::PipelineError;
use serde_json::json;
use tracing::error;

/// An error response: `{"error": message, "code": kind}` plus extra fields
/// for some kinds.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: serde_json::Value,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into(), "code": code }),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }
}

fn status_of(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::Validation(_) | PipelineError::OffTopic { .. } => StatusCode::BAD_REQUEST,
        PipelineError::NotFound(_)
        | PipelineError::NoMessages(_)
        | PipelineError::NoCandidates { .. } => StatusCode::NOT_FOUND,
        PipelineError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        PipelineError::Store(e) => store_status(e),
        PipelineError::Intent(_)
        | PipelineError::Search(_)
        | PipelineError::AllCandidatesExhausted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn store_status(err: &mise_core::Error) -> StatusCode {
    match err {
        mise_core::Error::NotFound(_) => StatusCode::NOT_FOUND,
        e if e.is_unavailable() => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = status_of(&err);
        if status.is_server_error() {
            error!("Pipeline failed: {}", err);
        }
        let mut api = ApiError::new(status, err.code(), err.to_string());
        match &err {
            PipelineError::AllCandidatesExhausted {
                attempted_urls,
                last_error,
            } => {
                api.body["attemptedUrls"] = json!(attempted_urls);
                api.body["lastError"] = json!({
                    "stage": last_error.stage(),
                    "message": last_error.to_string(),
                });
            }
            PipelineError::OffTopic { explanation } => {
                api.body["explanation"] = json!(explanation);
            }
            PipelineError::NoCandidates { query } => {
                api.body["query"] = json!(query);
            }
            _ => {}
        }
        api
    }
}

impl From<mise_core::Error> for ApiError {
    fn from(err: mise_core::Error) -> Self {
        PipelineError::Store(err).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
