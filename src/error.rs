use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("file not found or unauthorized")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("share link has expired")]
    ShareExpired,

    #[error("email already registered")]
    EmailExists,

    #[error("{0}")]
    UploadFailed(String),

    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),

    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Standard error envelope: `{"error": <kind>, "message": <detail>}`.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl ServerError {
    fn kind(&self) -> &'static str {
        match self {
            ServerError::BadRequest(_) => "bad_request",
            ServerError::Unauthorized(_) => "unauthorized",
            ServerError::Forbidden => "forbidden",
            ServerError::NotFound(_) => "not_found",
            ServerError::ShareExpired => "expired",
            ServerError::EmailExists => "conflict",
            ServerError::UploadFailed(_) => "upload_failed",
            ServerError::Db(_) => "db_error",
            ServerError::Storage(_) | ServerError::Internal(_) | ServerError::Io(_) => {
                "internal_error"
            }
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden => StatusCode::FORBIDDEN,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::ShareExpired => StatusCode::GONE,
            ServerError::EmailExists => StatusCode::CONFLICT,
            ServerError::UploadFailed(_)
            | ServerError::Db(_)
            | ServerError::Storage(_)
            | ServerError::Internal(_)
            | ServerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let message = match &self {
            // Don't leak driver/transport details to clients.
            ServerError::Db(e) => {
                tracing::error!(error = %e, "database error");
                "database operation failed".to_string()
            }
            ServerError::Storage(e) => {
                tracing::error!(error = %e, "object store error");
                "storage operation failed".to_string()
            }
            ServerError::Internal(detail) => {
                tracing::error!(detail = %detail, "internal error");
                "internal server error".to_string()
            }
            ServerError::Io(e) => {
                tracing::error!(error = %e, "IO error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: self.kind(),
            message,
        };
        (self.status(), Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
