//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the JSON API under `/api` plus a liveness check. Every
//! handler is a thin translation from HTTP to a `services` call; money
//! moving endpoints pass the rate limiter first and honour the
//! `Idempotency-Key` header where a retry could double-apply.

pub mod admin;
pub mod auth;
pub mod error;
pub mod invest;
pub mod vouchers;
pub mod wallet;

use axum::Router;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, patch, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use crate::state::AppState;
use error::ApiError;

pub(crate) const IDEMPOTENCY_HEADER: &str = "idempotency-key";
const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// The request's `Idempotency-Key`, if present and sane.
pub(crate) fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty() && k.len() <= MAX_IDEMPOTENCY_KEY_LEN)
        .map(str::to_owned)
}

/// Count a money-moving request against the caller's rate limits.
pub(crate) fn throttle(state: &AppState, user_id: Uuid) -> Result<(), ApiError> {
    state.rate_limiter.check_and_record(user_id).map_err(|e| {
        warn!(%user_id, error = %e, "rate limited");
        ApiError::from(e)
    })
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/kyc", post(wallet::submit_kyc))
        .route("/api/wallet", get(wallet::summary))
        .route("/api/wallet/transactions", get(wallet::list_transactions))
        .route("/api/wallet/deposits", post(wallet::request_deposit))
        .route("/api/wallet/transfers", post(wallet::transfer))
        .route("/api/wallet/withdrawals/quote", post(wallet::quote_withdrawal))
        .route("/api/wallet/withdrawals", post(wallet::request_withdrawal))
        .route("/api/wallet/withdrawals/{id}/confirm", post(wallet::confirm_withdrawal))
        .route("/api/wallet/withdrawals/{id}", delete(wallet::cancel_withdrawal))
        .route("/api/vouchers", get(vouchers::list).post(vouchers::create))
        .route("/api/vouchers/redeem", post(vouchers::redeem))
        .route("/api/vouchers/{code}", delete(vouchers::cancel))
        .route("/api/transactions/{id}/dispute", post(vouchers::open_dispute))
        .route("/api/plans", get(invest::plans))
        .route("/api/investments", post(invest::invest))
        .route("/api/investments/claim", post(invest::claim))
        .route("/api/investments/withdraw", post(invest::request_withdrawal))
        .route("/api/copy-trading/traders", get(invest::traders))
        .route("/api/copy-trading/positions", get(invest::list_positions).post(invest::start_copy))
        .route("/api/copy-trading/positions/{id}/stop", post(invest::stop_copy))
        .route("/api/admin/review", get(admin::review_queue))
        .route("/api/admin/transactions/{id}/decision", post(admin::decide))
        .route("/api/admin/kyc/{user_id}/approve", post(admin::approve_kyc))
        .route("/api/admin/kyc/{user_id}/reject", post(admin::reject_kyc))
        .route("/api/admin/disputes/{tx_id}/escalate", post(admin::escalate_dispute))
        .route("/api/admin/disputes/{tx_id}/resolve", post(admin::resolve_dispute))
        .route("/api/admin/disputes/{tx_id}/reject", post(admin::reject_dispute))
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/{id}", patch(admin::update_user))
        .route("/api/admin/users/{id}/adjust", post(admin::adjust_balance))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
