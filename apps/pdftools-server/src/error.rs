//! Error types for the pdftools server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pdftools_core::{BudgetError, PdfToolsError, ValidationError};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Pdf(#[from] PdfToolsError),

    #[error("Processing timeout after {0}ms")]
    Timeout(u64),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upload failed: {message}")]
    Upload { status: StatusCode, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl ServerError {
    fn parts(&self) -> (StatusCode, &'static str, String, Option<serde_json::Value>) {
        match self {
            ServerError::Pdf(err) => pdf_error_parts(err),
            ServerError::Timeout(ms) => (
                StatusCode::REQUEST_TIMEOUT,
                "TIMEOUT",
                format!("Processing timeout after {}ms", ms),
                None,
            ),
            ServerError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg.clone(), None)
            }
            ServerError::Upload { status, message } => {
                let code = if *status == StatusCode::PAYLOAD_TOO_LARGE {
                    "PAYLOAD_TOO_LARGE"
                } else {
                    "UPLOAD_FAILED"
                };
                (*status, code, message.clone(), None)
            }
            ServerError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
                None,
            ),
        }
    }
}

fn pdf_error_parts(
    err: &PdfToolsError,
) -> (StatusCode, &'static str, String, Option<serde_json::Value>) {
    let message = err.user_message();
    let diagnostic = Some(serde_json::Value::String(err.to_string()));

    match err {
        PdfToolsError::Validation(ValidationError::TooLarge { .. }) => {
            (StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE", message, None)
        }
        PdfToolsError::Validation(ValidationError::MalformedStructure { detail, .. }) => (
            StatusCode::BAD_REQUEST,
            "INVALID_FILE",
            message,
            Some(serde_json::Value::String(detail.clone())),
        ),
        PdfToolsError::Validation(_) => (StatusCode::BAD_REQUEST, "INVALID_FILE", message, None),
        PdfToolsError::InvalidInputs { failures, .. } => (
            StatusCode::BAD_REQUEST,
            "INVALID_FILES",
            message,
            serde_json::to_value(failures).ok(),
        ),
        PdfToolsError::Decode(_) => (StatusCode::BAD_REQUEST, "INVALID_PDF", message, diagnostic),
        PdfToolsError::InsufficientInputs { .. } => {
            (StatusCode::BAD_REQUEST, "INSUFFICIENT_FILES", message, None)
        }
        PdfToolsError::MergeFailed { .. } => {
            let status = if err.is_client_error() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (status, "MERGE_FAILED", message, diagnostic)
        }
        PdfToolsError::InvalidRange(_) => {
            (StatusCode::BAD_REQUEST, "INVALID_RANGE", message, diagnostic)
        }
        PdfToolsError::Budget(BudgetError::PageLimitExceeded { .. }) => (
            StatusCode::PAYLOAD_TOO_LARGE,
            "TOO_MANY_PAGES",
            message,
            diagnostic,
        ),
        PdfToolsError::Budget(_) => (StatusCode::REQUEST_TIMEOUT, "TIMEOUT", message, None),
        PdfToolsError::Operation(_) | PdfToolsError::Serialization(_) | PdfToolsError::Io(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "PROCESSING_FAILED",
            message,
            None,
        ),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code, message, detail) = self.parts();

        if status.is_server_error() {
            error!(code, error = %self, "Request failed");
        } else {
            warn!(code, error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            success: false,
            error: message,
            code,
            detail,
        };

        (status, Json(body)).into_response()
    }
}

impl From<axum::extract::multipart::MultipartError> for ServerError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        ServerError::Upload {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Internal(format!("Failed to spool upload: {}", err))
    }
}
