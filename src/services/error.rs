//! Error handling utilities for route handlers

use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

use crate::services::pipeline::PipelineError;

/// JSON error body returned by failing routes
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// 400 with a bare error message
pub fn bad_request(message: &str) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.to_string(),
            details: None,
        }),
    )
}

/// Map a pipeline failure to its HTTP response.
///
/// Validation is the caller's fault; everything else surfaces as a single
/// processing failure with the underlying diagnostic attached. A failed job
/// never exposes partial artifact URLs.
pub fn pipeline_error_response(e: PipelineError) -> (StatusCode, Json<ErrorBody>) {
    eprintln!("[upload] Processing failed: {}", e);
    match e {
        PipelineError::Validation(msg) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: msg,
                details: None,
            }),
        ),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: "Video processing failed".to_string(),
                details: Some(other.to_string()),
            }),
        ),
    }
}
