use std::collections::BTreeMap;

use artiflow_core::api::{PipelineError, ProgressError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

// ============= Runs =============

#[derive(Debug, Default, Deserialize)]
pub struct RunRequest {
    /// Template inputs for the first stage.
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct RunAccepted {
    pub success: bool,
    pub session_id: String,
    pub pipeline: String,
    pub total_steps: usize,
    /// Where to poll.
    pub progress_url: String,
}

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub sessions: Vec<String>,
    pub active: Vec<String>,
}

// ============= Health =============

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub server_id: String,
    pub pipeline: String,
    pub active_runs: usize,
    pub runs_started: u64,
    pub uptime_seconds: f64,
    pub requests_handled: u64,
    pub timestamp: String,
}

// ============= Error Handling =============

#[derive(Debug)]
pub enum HttpServerError {
    InvalidRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<ProgressError> for HttpServerError {
    fn from(err: ProgressError) -> Self {
        match err {
            ProgressError::SessionNotFound(_) => Self::NotFound(err.to_string()),
            ProgressError::InvalidSessionId(_) => Self::InvalidRequest(err.to_string()),
            ProgressError::AlreadyInitialized(_) => Self::Conflict(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<PipelineError> for HttpServerError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::SessionBusy(_) => Self::Conflict(err.to_string()),
            PipelineError::Progress(inner) => inner.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for HttpServerError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            Self::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = serde_json::json!({
            "success": false,
            "error": message,
            "error_code": error_code,
        });

        (status, Json(body)).into_response()
    }
}
