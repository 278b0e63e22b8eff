//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use nova_billing::BillingError;
use nova_firestore::FirestoreError;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error("Store error: {0}")]
    Firestore(#[from] FirestoreError),
}

impl ApiError {
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Billing(e) => match e {
                BillingError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
                BillingError::HardCapExceeded { .. }
                | BillingError::UnknownAddon { .. }
                | BillingError::UnknownPack { .. }
                | BillingError::UnknownPlan { .. }
                | BillingError::BadPeriod { .. } => StatusCode::BAD_REQUEST,
                BillingError::PlanLimitExceeded { .. } => StatusCode::FORBIDDEN,
                BillingError::UserNotFound { .. } => StatusCode::NOT_FOUND,
                BillingError::Contention { .. } | BillingError::Store(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            },
            ApiError::Firestore(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Stable machine-readable code for client dispatch.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            ApiError::Billing(e) => Some(match e {
                BillingError::InsufficientCredits { .. } => "insufficient_credits",
                BillingError::HardCapExceeded { .. } => "hard_cap_exceeded",
                BillingError::PlanLimitExceeded { .. } => "plan_limit_exceeded",
                BillingError::UnknownAddon { .. } => "unknown_addon",
                BillingError::UnknownPack { .. } => "unknown_pack",
                BillingError::UnknownPlan { .. } => "unknown_plan",
                BillingError::BadPeriod { .. } => "bad_period",
                BillingError::UserNotFound { .. } => "user_not_found",
                BillingError::Contention { .. } => "ledger_busy",
                BillingError::Store(_) => "store_unavailable",
            }),
            ApiError::RateLimited => Some("rate_limited"),
            _ => None,
        }
    }

    /// True when the detail must be masked outside development.
    fn is_internal(&self) -> bool {
        matches!(
            self,
            ApiError::Internal(_)
                | ApiError::Firestore(_)
                | ApiError::Billing(BillingError::Store(_))
        )
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    balance: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<i64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Don't expose internal error details in production
        let detail = if self.is_internal()
            && std::env::var("ENVIRONMENT").unwrap_or_default() == "production"
        {
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let (balance, required) = match &self {
            ApiError::Billing(BillingError::InsufficientCredits { balance, required }) => {
                (Some(*balance), Some(*required))
            }
            _ => (None, None),
        };

        let body = ErrorResponse {
            detail,
            code,
            balance,
            required,
        };

        (status, Json(body)).into_response()
    }
}
