//! HTTP error mapping.
//!
//! Services return `LedgerError`; handlers return `ApiError`, which renders
//! `{ "error": { "code", "message", "retryable" } }` with a status chosen
//! from the variant. Internal failures are logged and replaced by a generic
//! message.

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::error;

use crate::error::{ErrorCode, LedgerError};
use crate::rate_limit::RateLimitError;

#[derive(Debug)]
pub enum ApiError {
    /// No valid session on the request.
    Unauthorized,
    Ledger(LedgerError),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

impl From<RateLimitError> for ApiError {
    fn from(err: RateLimitError) -> Self {
        Self::Ledger(err.into())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Ledger(LedgerError::Database(err))
    }
}

pub(crate) fn status_for(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::UserNotFound(_)
        | LedgerError::RecipientNotFound
        | LedgerError::TransactionNotFound(_)
        | LedgerError::VoucherNotFound
        | LedgerError::IntentNotFound(_)
        | LedgerError::PositionNotFound(_)
        | LedgerError::PlanNotFound(_)
        | LedgerError::TraderNotFound(_)
        | LedgerError::NoDispute => StatusCode::NOT_FOUND,
        LedgerError::Forbidden | LedgerError::AccountFrozen | LedgerError::AccountBanned | LedgerError::KycRequired => {
            StatusCode::FORBIDDEN
        }
        LedgerError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        LedgerError::InvalidAmount(_) | LedgerError::InvalidInput(_) | LedgerError::BelowMinimum { .. } => {
            StatusCode::BAD_REQUEST
        }
        LedgerError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LedgerError::EmailTaken
        | LedgerError::PendingRequestExists(_)
        | LedgerError::PlanAlreadyActive(_)
        | LedgerError::CooldownActive { .. }
        | LedgerError::InvalidState(_)
        | LedgerError::VoucherUnavailable
        | LedgerError::DisputeExists
        | LedgerError::NothingToClaim => StatusCode::CONFLICT,
        LedgerError::IntentExpired => StatusCode::GONE,
        LedgerError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        LedgerError::PasswordHash(_) | LedgerError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn body(code: &str, message: &str, retryable: bool) -> Json<serde_json::Value> {
    Json(json!({ "error": { "code": code, "message": message, "retryable": retryable } }))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            Self::Unauthorized => {
                return (StatusCode::UNAUTHORIZED, body("E_UNAUTHORIZED", "authentication required", false))
                    .into_response();
            }
            Self::Ledger(err) => err,
        };

        let status = status_for(&err);
        let message = if status.is_server_error() {
            error!(error = %err, code = err.error_code(), "request failed");
            "internal error".to_owned()
        } else {
            err.to_string()
        };

        let mut response = (status, body(err.error_code(), &message, err.retryable())).into_response();
        if let LedgerError::CooldownActive { remaining_secs } = err {
            if let Ok(value) = HeaderValue::from_str(&remaining_secs.max(1).to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
