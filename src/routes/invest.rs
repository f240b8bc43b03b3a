//! Investment plan and copy-trading routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::ApiError;
use super::throttle;
use crate::catalog::{CopyTrader, InvestmentPlan};
use crate::models::{CopyPosition, Transaction};
use crate::services::{copy_trading, investment};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InvestBody {
    plan_id: String,
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct CopyBody {
    trader_id: String,
    amount: Decimal,
}

/// `GET /api/plans`
pub async fn plans() -> Json<Vec<InvestmentPlan>> {
    Json(investment::plans())
}

/// `POST /api/investments`: open or top up the caller's plan.
pub async fn invest(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<InvestBody>,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    throttle(&state, auth.id())?;
    let tx = investment::invest(&state, auth.id(), &body.plan_id, body.amount).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// `POST /api/investments/claim`
pub async fn claim(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Transaction>, ApiError> {
    throttle(&state, auth.id())?;
    Ok(Json(investment::claim_profit(&state, auth.id()).await?))
}

/// `POST /api/investments/withdraw`: ask for the principal back.
pub async fn request_withdrawal(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<(StatusCode, Json<Transaction>), ApiError> {
    throttle(&state, auth.id())?;
    let tx = investment::request_withdrawal(&state, auth.id()).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// `GET /api/copy-trading/traders`
pub async fn traders() -> Json<Vec<CopyTrader>> {
    Json(copy_trading::traders())
}

/// `GET /api/copy-trading/positions`
pub async fn list_positions(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<CopyPosition>>, ApiError> {
    Ok(Json(copy_trading::list_positions(&state, auth.id()).await?))
}

/// `POST /api/copy-trading/positions`
pub async fn start_copy(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CopyBody>,
) -> Result<(StatusCode, Json<CopyPosition>), ApiError> {
    throttle(&state, auth.id())?;
    let position = copy_trading::start(&state, auth.id(), &body.trader_id, body.amount).await?;
    Ok((StatusCode::CREATED, Json(position)))
}

/// `POST /api/copy-trading/positions/{id}/stop`
pub async fn stop_copy(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<copy_trading::StopReceipt>, ApiError> {
    throttle(&state, auth.id())?;
    Ok(Json(copy_trading::stop(&state, auth.id(), id).await?))
}
