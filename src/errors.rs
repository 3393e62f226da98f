use crate::services::{content_store::StoreError, pipeline::PipelineError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use validator::ValidationErrors;

/// Error returned by every handler. Only `message` reaches the client, so it
/// never carries collaborator details.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    /// Stable error class: `validation`, `conflict`, `not_found`,
    /// `upstream_timeout`, `upstream_failure` or `unauthorized`.
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation", msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "conflict", msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", msg)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", "Unauthorized")
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, "upstream_timeout", msg)
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "upstream_failure", msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.message,
            "code": self.code,
        }));

        (self.status, body).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(msg) => Self::validation(msg),
            PipelineError::Conflict(msg) => Self::conflict(msg),
            PipelineError::NotFound(msg) => Self::not_found(msg),
            PipelineError::UpstreamTimeout { operation, after } => {
                tracing::error!(operation, ?after, "upstream call timed out");
                Self::timeout("The storage service took too long to respond, try again later")
            }
            PipelineError::UpstreamFailure { operation, detail } => {
                tracing::error!(operation, %detail, "upstream call failed");
                Self::internal("The storage service failed, try again later")
            }
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { id, .. } => Self::not_found(format!("Record `{id}` not found")),
            other => {
                tracing::error!(error = %other, "content store error");
                Self::internal("The storage service failed, try again later")
            }
        }
    }
}

/// First message of a failed `validator` check, for a flat client error.
impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        let message = fields
            .first()
            .and_then(|(field, errs)| {
                errs.first().map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{field} is invalid"))
                })
            })
            .unwrap_or_else(|| "Invalid request".to_string());
        Self::validation(message)
    }
}
