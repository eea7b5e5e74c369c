use crate::services::drive::DriveError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

pub const DEMO_RESTRICTED_MESSAGE: &str = "You can not upload/delete files in demo. Please follow instructions to deploy your own Personal Drive.";

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// 401 carrying a Basic challenge, see `into_response`.
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Incorrect username or password")
    }

    /// 406 for mutations attempted by the read-only demo identity.
    pub fn demo_restricted() -> Self {
        Self::new(StatusCode::NOT_ACCEPTABLE, DEMO_RESTRICTED_MESSAGE)
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
            "error": self.message,
            "status": self.status.as_u16()
        }));

        let mut response = (self.status, body).into_response();
        if self.status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Basic"));
        }
        response
    }
}

impl From<DriveError> for AppError {
    fn from(err: DriveError) -> Self {
        match err {
            DriveError::InvalidKey(_) => AppError::bad_request(err.to_string()),
            DriveError::UploadNotFound { .. } => AppError::not_found(err.to_string()),
            other => {
                tracing::error!("drive failure: {}", other);
                AppError::internal(other.to_string())
            }
        }
    }
}
