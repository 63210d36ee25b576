use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Username taken")]
    DuplicateUser,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("{0}")]
    Validation(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Internal server error")]
    Internal,
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Failures the client caused and can act on. These are reported as a
    /// regular `{success: false}` body rather than an HTTP error status.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::DuplicateUser | Self::InvalidCredentials | Self::Validation(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
            Self::DuplicateUser | Self::InvalidCredentials => {
                tracing::debug!(reason = %self, "Request rejected");
                (StatusCode::OK, self.to_string())
            }
            Self::Validation(msg) => {
                tracing::debug!(message = %msg, "Validation failed");
                (StatusCode::OK, msg)
            }
            Self::Unauthorized => {
                tracing::debug!("Unauthorized");
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            Self::Internal => {
                tracing::error!("Internal server error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
        };

        let body = Json(json!({
            "success": false,
            "message": message
        }));

        (status, body).into_response()
    }
}
