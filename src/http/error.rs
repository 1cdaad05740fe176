//! API error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::BroadcastError;

/// A pipeline error on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub BroadcastError);

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            BroadcastError::InvalidInput(_)
            | BroadcastError::Translation { .. }
            | BroadcastError::Identity(_) => StatusCode::BAD_REQUEST,
            BroadcastError::NotFound(_) => StatusCode::NOT_FOUND,
            BroadcastError::ConfirmTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            BroadcastError::Transfer { .. } | BroadcastError::Submission(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match &self.0 {
            BroadcastError::Initialization(_) => "INITIALIZATION_ERROR",
            BroadcastError::Persistence(_) => "PERSISTENCE_ERROR",
            BroadcastError::Transfer { .. } => "TRANSFER_ERROR",
            BroadcastError::Submission(_) => "SUBMISSION_ERROR",
            BroadcastError::HandlerMismatch(_) => "HANDLER_MISMATCH",
            BroadcastError::Translation { .. } => "TRANSLATION_ERROR",
            BroadcastError::Incomplete(_) => "INCOMPLETE",
            BroadcastError::InvalidInput(_) => "INVALID_INPUT",
            BroadcastError::Identity(_) => "IDENTITY_ERROR",
            BroadcastError::NotFound(_) => "NOT_FOUND",
            BroadcastError::Cancelled => "CANCELLED",
            BroadcastError::ConfirmTimeout(_) => "CONFIRM_TIMEOUT",
            BroadcastError::DispatchFailed { .. } => "DISPATCH_FAILED",
            BroadcastError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

impl From<BroadcastError> for ApiError {
    fn from(e: BroadcastError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, status = status.as_u16(), "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "Request rejected");
        }
        let body = ErrorResponse {
            code: self.error_code(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
