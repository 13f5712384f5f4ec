//! Error types for the contents API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use odfs_contents_manager::{ContentsError, ErrorClass};
use serde::Serialize;
use tracing::error;

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Contents(#[from] ContentsError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("Method not allowed")]
    MethodNotAllowed,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody {
            error: String,
            code: &'static str,
        }

        let (status, code) = match &self {
            ApiError::Contents(err) => match (err.class(), err) {
                (ErrorClass::NotFound, _) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                (ErrorClass::BadRequest, ContentsError::TypeMismatch(_)) => {
                    (StatusCode::BAD_REQUEST, "TYPE_MISMATCH")
                }
                (ErrorClass::BadRequest, ContentsError::Conflict(_)) => {
                    (StatusCode::BAD_REQUEST, "CONFLICT")
                }
                (ErrorClass::BadRequest, _) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
                (ErrorClass::Internal, _) => {
                    error!("Internal error: {}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
                }
            },
            ApiError::Json(_) => (StatusCode::BAD_REQUEST, "INVALID_JSON"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::MethodNotAllowed => (StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED"),
        };

        let body = ErrorBody {
            error: self.to_string(),
            code,
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
