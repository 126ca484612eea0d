//! Error types for the Backoffice SDK

use bo_common::ApiResponse;
use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SdkError>;

#[derive(Error, Debug)]
pub enum SdkError {
    /// Server answered with a non-2xx status
    #[error("HTTP {status}: {message}")]
    Http {
        status: u16,
        message: String,
        error_code: Option<String>,
    },

    /// Request never produced a response
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// 2xx envelope without a `data` payload
    #[error("Response carried no data")]
    EmptyData,
}

impl SdkError {
    /// Build an HTTP error from a status and raw body.
    ///
    /// Message and error code come from the response envelope when the body
    /// parses as one, otherwise the raw body (or the status reason) is used.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let (message, error_code) = match serde_json::from_str::<ApiResponse<Value>>(body) {
            Ok(envelope) => (envelope.message, envelope.error_code),
            Err(_) if body.trim().is_empty() => (
                status.canonical_reason().unwrap_or("Request failed").to_string(),
                None,
            ),
            Err(_) => (body.to_string(), None),
        };

        SdkError::Http {
            status: status.as_u16(),
            message,
            error_code,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            SdkError::Http { status, .. } => Some(*status),
            SdkError::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            SdkError::Http { error_code, .. } => error_code.as_deref(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }
}
