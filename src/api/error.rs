use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

/// Coarse classification of a failure, decided once at the HTTP boundary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Auth,
    Network,
    Timeout,
    ServerRejected,
}

#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request timed out: {message}")]
    Timeout { message: String },

    #[error("Server rejected request: status={status:?}, message={message}")]
    ServerRejected {
        status: Option<u16>,
        message: String,
        retryable: bool,
    },
}

impl ApiError {
    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        ApiError::Validation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Validation { .. } => ErrorKind::Validation,
            ApiError::Unauthorized { .. } => ErrorKind::Auth,
            ApiError::Network { .. } => ErrorKind::Network,
            ApiError::Timeout { .. } => ErrorKind::Timeout,
            ApiError::ServerRejected { .. } => ErrorKind::ServerRejected,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Validation { .. } => false,
            ApiError::Unauthorized { .. } => false,
            ApiError::Network { .. } => true,
            ApiError::Timeout { .. } => true,
            ApiError::ServerRejected { retryable, .. } => *retryable,
        }
    }

    pub fn http_status_code(&self) -> Option<u16> {
        match self {
            ApiError::Validation { .. } => Some(400),
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::ServerRejected { status, .. } => *status,
            ApiError::Network { .. } | ApiError::Timeout { .. } => None,
        }
    }

    /// Message suitable for a toast or the flow's `error` field.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Validation { message, .. } => message.clone(),
            ApiError::Unauthorized { .. } => {
                "Your session has expired. Please sign in again".to_string()
            }
            ApiError::Network { .. } => {
                "Network error. Please check your connection and try again".to_string()
            }
            ApiError::Timeout { .. } => "The request timed out. Please try again".to_string(),
            ApiError::ServerRejected { message, .. } => message.clone(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout {
                message: err.to_string(),
            }
        } else if err.is_decode() {
            ApiError::ServerRejected {
                status: err.status().map(|s| s.as_u16()),
                message: format!("invalid response body: {}", err),
                retryable: false,
            }
        } else {
            ApiError::Network {
                message: err.to_string(),
            }
        }
    }
}
