//! Error types for API responses

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Field name to list of messages, rendered as the response body of a 400.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Request-time API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found.")]
    NotFound,

    #[error("Invalid page.")]
    InvalidPage,

    #[error("Authentication credentials were not provided.")]
    NotAuthenticated,

    #[error("Invalid username/password.")]
    AuthenticationFailed,

    #[error("You do not have permission to perform this action.")]
    PermissionDenied,

    #[error("Method \"{0}\" not allowed.")]
    MethodNotAllowed(Method),

    #[error("{0}")]
    BadRequest(String),

    #[error("validation failed")]
    Validation(FieldErrors),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    /// Single-field validation error
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.into()]);
        ApiError::Validation(errors)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound | ApiError::InvalidPage => StatusCode::NOT_FOUND,
            ApiError::NotAuthenticated
            | ApiError::AuthenticationFailed
            | ApiError::PermissionDenied => StatusCode::FORBIDDEN,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(errors) => (status, Json(errors)).into_response(),
            ApiError::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                let body = Json(ErrorResponse {
                    detail: "A server error occurred.".to_string(),
                });
                (status, body).into_response()
            }
            other => {
                let body = Json(ErrorResponse {
                    detail: other.to_string(),
                });
                (status, body).into_response()
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}
