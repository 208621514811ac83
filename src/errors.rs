//! Gallery API error types.
//!
//! Every variant maps to a stable error code and HTTP status.  The enum
//! implements [`axum::response::IntoResponse`] so handlers can simply
//! return `Err(GalleryError::NotFound { .. })`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Generate a 16-character hex request ID.
pub fn generate_request_id() -> String {
    let bytes: [u8; 8] = rand::random();
    hex::encode(bytes).to_uppercase()
}

/// Gallery error taxonomy.
#[derive(Debug, Error)]
pub enum GalleryError {
    /// A request field or uploaded file failed validation.
    #[error("{message}")]
    Validation { message: String },

    /// No bearer token on a protected request.
    #[error("No token provided")]
    MissingToken,

    /// Bearer token with a bad signature, bad shape, or past its expiry.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Authenticated, but not an admin.
    #[error("Admin access required")]
    AdminRequired,

    /// Login with an unknown email or a wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The addressed record does not exist.
    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    /// Catch-all for backend and remote failures.
    #[error("Server error")]
    Internal(#[from] anyhow::Error),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl GalleryError {
    pub fn validation(message: impl Into<String>) -> Self {
        GalleryError::Validation {
            message: message.into(),
        }
    }

    /// Return the stable error code string.
    pub fn code(&self) -> &'static str {
        match self {
            GalleryError::Validation { .. } => "ValidationError",
            GalleryError::MissingToken => "MissingToken",
            GalleryError::InvalidToken => "InvalidToken",
            GalleryError::AdminRequired => "AdminRequired",
            GalleryError::InvalidCredentials => "InvalidCredentials",
            GalleryError::NotFound { .. } => "NotFound",
            GalleryError::Internal(_) => "InternalError",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GalleryError::Validation { .. } => StatusCode::BAD_REQUEST,
            GalleryError::MissingToken => StatusCode::UNAUTHORIZED,
            GalleryError::InvalidToken => StatusCode::FORBIDDEN,
            GalleryError::AdminRequired => StatusCode::FORBIDDEN,
            GalleryError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            GalleryError::NotFound { .. } => StatusCode::NOT_FOUND,
            GalleryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GalleryError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let detail = match &self {
            GalleryError::Internal(err) => {
                tracing::error!("Internal error: {err:#}");
                Some(format!("{err:#}"))
            }
            _ => None,
        };

        let body = ErrorBody {
            message: self.to_string(),
            code: self.code(),
            error: detail,
        };

        (status, Json(body)).into_response()
    }
}
