use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Top-level application error.
/// All variants carry a human-readable message for display/logging.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Upstream (Dify) errors ───────────────────────────────────────────────
    #[error("Dify service unavailable at {host}")]
    UpstreamUnavailable { host: String },

    #[error("Dify rejected the request ({status}): {message}")]
    UpstreamRejected { status: u16, message: String },

    #[error("Dify request failed: {message}")]
    UpstreamRequest { message: String },

    #[error("Streaming response failed: {message}")]
    StreamFailed { message: String },

    #[error("Streaming response timed out")]
    StreamTimedOut,

    // ── Validation errors ────────────────────────────────────────────────────
    #[error("Field '{field_name}' cannot be empty")]
    EmptyField { field_name: String },

    #[error("Invalid value for '{field_name}': {reason}")]
    InvalidField { field_name: String, reason: String },

    // ── Auth errors ──────────────────────────────────────────────────────────
    #[error("{message}")]
    Unauthorized { message: String },

    // ── Record errors ────────────────────────────────────────────────────────
    #[error("Record not found: {entity_type} with id '{id}'")]
    RecordNotFound { entity_type: String, id: String },

    #[error("Submission '{id}' has already been decided")]
    AlreadyDecided { id: String },

    #[error("Submission approved, but triggering the workflow failed: {message}")]
    WorkflowTriggerFailed { message: String },

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Invalid configuration: {message}")]
    Config { message: String },

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn empty_field(field_name: impl Into<String>) -> Self {
        AppError::EmptyField { field_name: field_name.into() }
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        AppError::RecordNotFound { entity_type: entity_type.into(), id: id.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized { message: message.into() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::RecordNotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::EmptyField { .. }
                | AppError::InvalidField { .. }
                | AppError::AlreadyDecided { .. }
        )
    }

    pub fn is_upstream_unavailable(&self) -> bool {
        matches!(self, AppError::UpstreamUnavailable { .. })
    }

    pub fn status_code(&self) -> StatusCode {
        if self.is_validation() {
            StatusCode::BAD_REQUEST
        } else if self.is_not_found() {
            StatusCode::NOT_FOUND
        } else if matches!(self, AppError::Unauthorized { .. }) {
            StatusCode::UNAUTHORIZED
        } else if self.is_upstream_unavailable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "success": false, "error": self.to_string() }))).into_response()
    }
}
