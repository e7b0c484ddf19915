use crate::frame_store::FrameStoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Errors surfaced by the relay's HTTP endpoints.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The request did not carry a usable `image` field
    #[error("{0}")]
    InvalidInput(String),

    /// The request body exceeded the configured upload limit
    #[error("{0}")]
    TooLarge(String),

    /// The payload could not be decoded into raw bytes
    #[error("{0}")]
    Decode(String),

    /// The frame store failed to read or write
    #[error(transparent)]
    Storage(FrameStoreError),

    /// No latest frame yet, or unknown filename
    #[error("{0}")]
    NotFound(String),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            RelayError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Decode(_) | RelayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            RelayError::InvalidInput(_) => "INVALID_INPUT",
            RelayError::TooLarge(_) => "PAYLOAD_TOO_LARGE",
            RelayError::Decode(_) => "DECODE_ERROR",
            RelayError::Storage(_) => "STORAGE_ERROR",
            RelayError::NotFound(_) => "NOT_FOUND",
        }
    }
}

impl From<FrameStoreError> for RelayError {
    fn from(e: FrameStoreError) -> Self {
        match e {
            FrameStoreError::NotFound(key) => RelayError::NotFound(format!("Frame not found: {key}")),
            other => RelayError::Storage(other),
        }
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        };

        (self.status(), Json(body)).into_response()
    }
}
