use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repository::RepositoryError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

impl ErrorBody {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code,
                message: message.into(),
            },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("An internal error occurred")]
    Internal,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "AUTH_REQUIRED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Internal => "INTERNAL",
            ApiError::Repository(RepositoryError::NotFound { .. }) => "NOT_FOUND",
            ApiError::Repository(RepositoryError::ConstraintViolation { .. }) => "CONFLICT",
            ApiError::Repository(RepositoryError::TransportFailure { .. }) => "INTERNAL",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Repository(RepositoryError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Repository(RepositoryError::ConstraintViolation { .. }) => StatusCode::CONFLICT,
            ApiError::Repository(RepositoryError::TransportFailure { .. }) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    // Repository errors only ever carry the coarse "Failed to ..." message.
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody::new(self.code(), self.to_string()))
    }
}
