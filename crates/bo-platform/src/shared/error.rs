//! Platform Error Types
//!
//! Every failure in the platform is a [`PlatformError`]. The HTTP boundary is
//! the single `IntoResponse` impl below; handlers just propagate with `?`.

use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use bo_common::ApiResponse;
use thiserror::Error;

/// Code returned for every failure that is not a known kind
pub const SYSTEM_ERROR_CODE: &str = "SYSTEM_ERROR";

const SYSTEM_ERROR_MESSAGE: &str = "An unexpected error occurred";

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("{message}")]
    Business { code: String, message: String },

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    #[error("{message}")]
    Conflict { code: String, message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("{message}")]
    Unprocessable { code: String, message: String },

    #[error("Unsupported media type: {message}")]
    UnsupportedMediaType { message: String },

    #[error("{message}")]
    TooManyRequests { message: String, retry_after_secs: u64 },

    #[error("Authentication required: {message}")]
    Unauthorized { message: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {message}")]
    InvalidToken { message: String },

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl PlatformError {
    pub fn business(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Business {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized { message: message.into() }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden { message: message.into() }
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Business { .. } | Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. }
            | Self::InvalidCredentials
            | Self::TokenExpired
            | Self::InvalidToken { .. }
            | Self::TokenRevoked => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Database(_) | Self::Json(_) | Self::Configuration { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable code, distinct from the human message
    pub fn error_code(&self) -> &str {
        match self {
            Self::Business { code, .. } | Self::Conflict { code, .. } | Self::Unprocessable { code, .. } => {
                code.as_str()
            }
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::UnsupportedMediaType { .. } => "UNSUPPORTED_MEDIA_TYPE",
            Self::TooManyRequests { .. } => "TOO_MANY_REQUESTS",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::InvalidToken { .. } => "INVALID_TOKEN",
            Self::TokenRevoked => "TOKEN_REVOKED",
            Self::Database(_) | Self::Json(_) | Self::Configuration { .. } | Self::Internal { .. } => {
                SYSTEM_ERROR_CODE
            }
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status().is_server_error()
    }
}

pub type Result<T> = std::result::Result<T, PlatformError>;

impl IntoResponse for PlatformError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if self.is_internal() {
            tracing::error!(error = %self, debug = ?self, "Unhandled platform error");
            SYSTEM_ERROR_MESSAGE.to_string()
        } else {
            self.to_string()
        };

        let body: ApiResponse<()> = ApiResponse::failure(status.as_u16(), message, self.error_code());
        let mut response = (status, Json(body)).into_response();

        if let Self::TooManyRequests { retry_after_secs, .. } = &self {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(*retry_after_secs));
        }

        response
    }
}
