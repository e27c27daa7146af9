//! HTTP error responses
//!
//! Every failure leaves the server as `{"error": "<message>"}` with a status
//! derived from the underlying [`PhotoError`].

use crate::error::PhotoError;
use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Message for a missing segmentation model
pub const MODEL_NOT_AVAILABLE: &str = "Model not available";

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Error returned by every handler
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    #[must_use]
    pub fn model_unavailable() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, MODEL_NOT_AVAILABLE)
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self.status.as_u16() {
            400..=499 => tracing::warn!(status = %self.status, "Client error: {}", self.message),
            500..=599 => tracing::error!(status = %self.status, "Server error: {}", self.message),
            _ => {},
        }

        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

impl From<PhotoError> for ApiError {
    fn from(err: PhotoError) -> Self {
        match err {
            // Client-facing messages go out verbatim ("Invalid session", "No file", ...)
            PhotoError::InvalidInput(message) => Self::bad_request(message),
            PhotoError::Model(ref message) if message == MODEL_NOT_AVAILABLE => {
                Self::model_unavailable()
            },
            ref other if other.is_client_error() => Self::bad_request(other.to_string()),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::bad_request("File too large")
        } else {
            Self::bad_request(err.body_text())
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(format!("Processing task failed: {err}"))
    }
}
