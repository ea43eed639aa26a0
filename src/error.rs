//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::auth::AuthError;
use crate::domain::TransferError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing or invalid bearer token")]
    Unauthenticated,

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    // Server errors (5xx)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn transfer_status(err: &TransferError) -> StatusCode {
    match err {
        TransferError::Validation(_)
        | TransferError::CurrencyMismatch { .. }
        | TransferError::InsufficientFunds { .. } => StatusCode::BAD_REQUEST,
        TransferError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        TransferError::NotFound { .. } => StatusCode::NOT_FOUND,
        TransferError::Conflict => StatusCode::CONFLICT,
        TransferError::InconsistentState(_) | TransferError::Storage(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Transfer(err) => transfer_status(err),
            AppError::Auth(AuthError::InvalidCredentials | AuthError::InvalidToken) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Auth(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::Unauthenticated => "unauthenticated",
            AppError::Transfer(err) => err.code(),
            AppError::Auth(AuthError::InvalidCredentials) => "invalid_credentials",
            AppError::Auth(AuthError::InvalidToken) => "invalid_token",
            AppError::Auth(_) => "auth_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Server-side details stay in the log
        let (error, details) = if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "Request failed");
            ("Internal server error".to_string(), None)
        } else {
            let details = match &self {
                AppError::InvalidRequest(msg) | AppError::Transfer(TransferError::Validation(msg)) => {
                    Some(msg.clone())
                }
                _ => None,
            };
            (self.to_string(), details)
        };

        let body = ErrorResponse {
            error,
            error_code: self.code().to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
