use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;

use habbot_auth::GuardError;
use habbot_core::DomainError;
use habbot_infra::StoreError;

/// Every failure a handler can return.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Guard(#[from] GuardError),

    /// The request could not be decoded into the expected shape.
    #[error("{0}")]
    Unprocessable(String),

    #[error("Internal Server Error in {action} - {source}")]
    Store {
        action: &'static str,
        source: StoreError,
    },

    #[error("Internal Server Error in {action} - {message}")]
    Internal { action: &'static str, message: String },
}

impl ApiError {
    pub fn store(action: &'static str, source: StoreError) -> Self {
        Self::Store { action, source }
    }

    pub fn internal(action: &'static str, message: impl Into<String>) -> Self {
        Self::Internal {
            action,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Domain(err) => match err {
                DomainError::Validation(_) | DomainError::InvalidId(_) | DomainError::Conflict(_) => {
                    StatusCode::BAD_REQUEST
                }
                DomainError::NotFound(_) => StatusCode::NOT_FOUND,
                DomainError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
            },
            ApiError::Guard(err) => {
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::UNAUTHORIZED)
            }
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Store { .. } | ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Domain(err) => err.code(),
            ApiError::Guard(GuardError::NotAuthenticated) => "not_authenticated",
            ApiError::Guard(GuardError::TokenExpired) => "token_expired",
            ApiError::Guard(GuardError::InsufficientPermissions) => "insufficient_permissions",
            ApiError::Guard(err) if err.status_code() == 403 => "forbidden",
            ApiError::Guard(_) => "unauthorized",
            ApiError::Unprocessable(_) => "invalid_request",
            ApiError::Store { .. } => "store_error",
            ApiError::Internal { .. } => "internal_error",
        }
    }
}

pub fn json_error(status: StatusCode, code: &str, message: impl Into<String>, details: Value) -> Response {
    let message = message.into();
    (
        status,
        axum::Json(json!({
            "success": false,
            "message": message,
            "error": {
                "code": code,
                "message": message,
                "details": details,
            },
        })),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let details = match &self {
            ApiError::Store { source, .. } => json!({ "store": source.to_string() }),
            _ => Value::Null,
        };
        json_error(self.status(), self.code(), self.to_string(), details)
    }
}
