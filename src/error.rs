//! Application error types with Axum response mapping.
//!
//! Each variant maps to a specific HTTP status + JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session invalidated")]
    SessionInvalidated,

    #[error("Session expired")]
    SessionExpired,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unknown client: {0}")]
    UnknownClient(String),

    #[error("Token verification failed")]
    TokenVerificationFailed,

    #[error("UserInfo validation failed: {0}")]
    UserInfoFailed(String),

    #[error("Invalid logout request")]
    InvalidLogoutRequest,

    #[error("Not found")]
    NotFound,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            AppError::NotAuthenticated => (
                StatusCode::UNAUTHORIZED,
                json!({"error": "Not authenticated"}),
            ),
            AppError::SessionInvalidated => (
                StatusCode::UNAUTHORIZED,
                json!({"error": "Session invalidated"}),
            ),
            AppError::SessionExpired => (
                StatusCode::UNAUTHORIZED,
                json!({"error": "Session expired"}),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({"error": msg})),
            AppError::UnknownClient(id) => (
                StatusCode::NOT_FOUND,
                json!({"error": "Unknown client", "client": id}),
            ),
            AppError::TokenVerificationFailed => (
                StatusCode::FORBIDDEN,
                json!({"error": "Token verification failed"}),
            ),
            AppError::UserInfoFailed(msg) => (
                StatusCode::FORBIDDEN,
                json!({"error": "UserInfo validation failed", "message": msg}),
            ),
            // Backchannel logout error responses carry no detail.
            AppError::InvalidLogoutRequest => (
                StatusCode::BAD_REQUEST,
                json!({"error": "invalid_request"}),
            ),
            AppError::NotFound => (StatusCode::NOT_FOUND, json!({"error": "Not found"})),
        };

        (status, axum::Json(body)).into_response()
    }
}
