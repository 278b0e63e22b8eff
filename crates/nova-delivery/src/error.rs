//! Delivery error types.

use thiserror::Error;

pub type DeliveryResult<T> = Result<T, DeliveryError>;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Failed to configure delivery: {0}")]
    ConfigError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Push send failed: {0}")]
    PushFailed(String),

    #[error("Email send failed: {0}")]
    EmailFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DeliveryError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn auth_error(msg: impl Into<String>) -> Self {
        Self::AuthError(msg.into())
    }

    pub fn push_failed(msg: impl Into<String>) -> Self {
        Self::PushFailed(msg.into())
    }

    pub fn email_failed(msg: impl Into<String>) -> Self {
        Self::EmailFailed(msg.into())
    }
}
