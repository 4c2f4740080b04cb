/// Error types for Variation Service
///
/// Synchronous handlers convert `AppError` into HTTP responses. `PipelineError`
/// never reaches a client directly: the job loop records it on the job.
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::io;
use thiserror::Error;
use uuid::Uuid;

/// Result type for variation-service operations
pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("Payload too large: limit is {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::NotFound(_) => "not_found",
            AppError::UnsupportedMedia(_) => "unsupported_media",
            AppError::PayloadTooLarge { .. } => "payload_too_large",
            AppError::Storage(_) => "server_error",
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    pub kind: &'static str,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::UnsupportedMedia(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed with server error");
        }

        HttpResponse::build(status).json(ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
            kind: self.kind(),
        })
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => AppError::NotFound(format!("artifact {id}")),
            StorageError::Io(e) => AppError::Storage(e.to_string()),
        }
    }
}

/// Artifact store failures
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("artifact {0} not found")]
    NotFound(Uuid),

    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Transform pipeline failures, recorded on the failing job
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("source artifact {0} is unavailable")]
    SourceUnavailable(Uuid),

    #[error("invalid {stage} stage: {reason}")]
    InvalidStage { stage: &'static str, reason: String },

    #[error("failed to start transcoder: {0}")]
    Spawn(String),

    #[error("transcoder exited with {status}: {stderr}")]
    ProcessFailed { status: String, stderr: String },

    #[error("transcoder timed out after {0} seconds")]
    Timeout(u64),

    #[error("transcoder produced an empty output")]
    EmptyOutput,

    #[error("scratch I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to store output: {0}")]
    Storage(String),
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => PipelineError::SourceUnavailable(id),
            StorageError::Io(e) => PipelineError::Storage(e.to_string()),
        }
    }
}
