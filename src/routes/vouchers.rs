//! Voucher routes, plus opening a dispute on one of the caller's records.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::ApiError;
use super::{idempotency_key, throttle};
use crate::models::{Transaction, Voucher};
use crate::services::{dispute, voucher};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBody {
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct RedeemBody {
    code: String,
}

#[derive(Debug, Deserialize)]
pub struct DisputeBody {
    reason: String,
    #[serde(default)]
    details: String,
}

/// `GET /api/vouchers`: vouchers the caller created.
pub async fn list(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<Voucher>>, ApiError> {
    Ok(Json(voucher::list(&state, auth.id()).await?))
}

/// `POST /api/vouchers`
pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(body): Json<CreateBody>,
) -> Result<(StatusCode, Json<Voucher>), ApiError> {
    throttle(&state, auth.id())?;
    let key = idempotency_key(&headers);
    let created = voucher::create(&state, auth.id(), body.amount, key.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `POST /api/vouchers/redeem`
pub async fn redeem(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<RedeemBody>,
) -> Result<Json<Transaction>, ApiError> {
    throttle(&state, auth.id())?;
    Ok(Json(voucher::redeem(&state, auth.id(), &body.code).await?))
}

/// `DELETE /api/vouchers/{code}`: returns the refund record.
pub async fn cancel(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(code): Path<String>,
) -> Result<Json<Transaction>, ApiError> {
    throttle(&state, auth.id())?;
    Ok(Json(voucher::cancel(&state, auth.id(), &code).await?))
}

/// `POST /api/transactions/{id}/dispute`
pub async fn open_dispute(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<DisputeBody>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    let tx = dispute::open(&state, auth.id(), id, &body.reason, &body.details).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}
