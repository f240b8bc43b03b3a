//! Wallet routes: KYC, balances, deposits, transfers, and withdrawals.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::ApiError;
use super::{idempotency_key, throttle};
use crate::models::{Transaction, User, WithdrawalIntent};
use crate::services::{kyc, wallet, withdrawal};
use crate::state::AppState;

/// `POST /api/kyc`
pub async fn submit_kyc(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<kyc::KycRequest>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(kyc::submit(&state, auth.id(), body).await?))
}

/// `GET /api/wallet`
pub async fn summary(State(state): State<AppState>, auth: AuthUser) -> Result<Json<wallet::WalletSummary>, ApiError> {
    Ok(Json(wallet::summary(&state, auth.id()).await?))
}

#[derive(Debug, Default, Deserialize)]
pub struct Page {
    limit: Option<usize>,
    offset: Option<usize>,
}

/// `GET /api/wallet/transactions?limit=&offset=`
pub async fn list_transactions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Transaction>>, ApiError> {
    Ok(Json(wallet::list_transactions(&state, auth.id(), page.limit, page.offset).await?))
}

/// `POST /api/wallet/deposits`
pub async fn request_deposit(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(body): Json<wallet::DepositRequest>,
) -> Result<impl IntoResponse, ApiError> {
    throttle(&state, auth.id())?;
    let key = idempotency_key(&headers);
    let tx = wallet::request_deposit(&state, auth.id(), body, key.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// `POST /api/wallet/transfers`: returns debit, credit, and fee records.
pub async fn transfer(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(body): Json<wallet::TransferRequest>,
) -> Result<impl IntoResponse, ApiError> {
    throttle(&state, auth.id())?;
    let key = idempotency_key(&headers);
    let txs = wallet::transfer(&state, auth.id(), body, key.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(txs)))
}

#[derive(Debug, Deserialize)]
pub struct QuoteBody {
    amount: Decimal,
}

/// `POST /api/wallet/withdrawals/quote`
pub async fn quote_withdrawal(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<QuoteBody>,
) -> Result<Json<withdrawal::WithdrawalQuote>, ApiError> {
    Ok(Json(withdrawal::quote(&state, auth.id(), body.amount).await?))
}

/// `POST /api/wallet/withdrawals`: starts the confirmation countdown.
pub async fn request_withdrawal(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<withdrawal::WithdrawalRequest>,
) -> Result<(StatusCode, Json<WithdrawalIntent>), ApiError> {
    throttle(&state, auth.id())?;
    let intent = withdrawal::request(&state, auth.id(), body).await?;
    Ok((StatusCode::CREATED, Json(intent)))
}

/// `POST /api/wallet/withdrawals/{id}/confirm`
pub async fn confirm_withdrawal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Transaction>, ApiError> {
    throttle(&state, auth.id())?;
    Ok(Json(withdrawal::confirm(&state, auth.id(), id).await?))
}

/// `DELETE /api/wallet/withdrawals/{id}`: abandon an unconfirmed intent.
pub async fn cancel_withdrawal(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    withdrawal::cancel(&state, auth.id(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}
