//! Admin routes: review queue, KYC, disputes, and account controls.
//!
//! Every service call re-checks the caller's role under the ledger lock;
//! these handlers only translate HTTP.

use axum::extract::{Path, State};
use axum::response::Json;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::auth::AuthUser;
use super::error::ApiError;
use crate::models::{Transaction, User};
use crate::services::{account, dispute, kyc, review, session};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    approve: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReasonBody {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    #[serde(default)]
    refund: bool,
    #[serde(default)]
    resolution: String,
}

#[derive(Debug, Deserialize)]
pub struct RulingBody {
    #[serde(default)]
    resolution: String,
}

#[derive(Debug, Deserialize)]
pub struct AdjustBody {
    amount: Decimal,
    reason: String,
}

/// `GET /api/admin/review`
pub async fn review_queue(State(state): State<AppState>, auth: AuthUser) -> Result<Json<review::ReviewQueue>, ApiError> {
    Ok(Json(review::queue(&state, auth.id()).await?))
}

/// `POST /api/admin/transactions/{id}/decision`
pub async fn decide(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(body): Json<DecisionBody>,
) -> Result<Json<Transaction>, ApiError> {
    Ok(Json(review::decide(&state, auth.id(), id, body.approve, body.reason.as_deref()).await?))
}

/// `POST /api/admin/kyc/{user_id}/approve`
pub async fn approve_kyc(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(kyc::approve(&state, auth.id(), user_id).await?))
}

/// `POST /api/admin/kyc/{user_id}/reject`
pub async fn reject_kyc(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(body): Json<ReasonBody>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(kyc::reject(&state, auth.id(), user_id, &body.reason).await?))
}

/// `POST /api/admin/disputes/{tx_id}/escalate`
pub async fn escalate_dispute(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(tx_id): Path<Uuid>,
) -> Result<Json<Transaction>, ApiError> {
    Ok(Json(dispute::escalate(&state, auth.id(), tx_id).await?))
}

/// `POST /api/admin/disputes/{tx_id}/resolve`
pub async fn resolve_dispute(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(tx_id): Path<Uuid>,
    Json(body): Json<ResolveBody>,
) -> Result<Json<dispute::DisputeOutcome>, ApiError> {
    Ok(Json(dispute::resolve(&state, auth.id(), tx_id, body.refund, &body.resolution).await?))
}

/// `POST /api/admin/disputes/{tx_id}/reject`
pub async fn reject_dispute(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(tx_id): Path<Uuid>,
    Json(body): Json<RulingBody>,
) -> Result<Json<Transaction>, ApiError> {
    Ok(Json(dispute::reject(&state, auth.id(), tx_id, &body.resolution).await?))
}

/// `GET /api/admin/users`
pub async fn list_users(State(state): State<AppState>, auth: AuthUser) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(account::list_users(&state, auth.id()).await?))
}

/// `PATCH /api/admin/users/{id}`: flags and role. Banning also revokes
/// every live session of the account.
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(update): Json<account::UserUpdate>,
) -> Result<Json<User>, ApiError> {
    let user = account::update_user(&state, auth.id(), user_id, update).await?;
    if update.banned == Some(true) {
        match session::delete_user_sessions(&state.pool, user_id).await {
            Ok(revoked) => info!(%user_id, revoked, "sessions revoked after ban"),
            Err(e) => warn!(%user_id, error = %e, "session revocation failed"),
        }
    }
    Ok(Json(user))
}

/// `POST /api/admin/users/{id}/adjust`
pub async fn adjust_balance(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<Uuid>,
    Json(body): Json<AdjustBody>,
) -> Result<Json<Transaction>, ApiError> {
    Ok(Json(account::adjust_balance(&state, auth.id(), user_id, body.amount, &body.reason).await?))
}
