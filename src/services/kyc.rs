//! KYC service: identity submission and admin review.
//!
//! Status moves `unverified | rejected -> pending -> verified | rejected`.
//! Withdrawals are gated on `verified`.

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use super::{ensure_active, ensure_admin};
use crate::error::LedgerError;
use crate::models::{KycStatus, KycSubmission, User};
use crate::state::AppState;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct KycRequest {
    pub full_name: String,
    pub document_type: String,
    pub document_number: String,
}

fn required(field: &str, value: &str) -> Result<String, LedgerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidInput(format!("{field} is required")));
    }
    Ok(trimmed.to_owned())
}

/// Submit identity documents for review.
///
/// # Errors
///
/// `InvalidState` if a review is already pending or the user is verified.
pub async fn submit(state: &AppState, user_id: Uuid, request: KycRequest) -> Result<User, LedgerError> {
    submit_at(state, user_id, request, Utc::now()).await
}

pub(crate) async fn submit_at(
    state: &AppState,
    user_id: Uuid,
    request: KycRequest,
    now: DateTime<Utc>,
) -> Result<User, LedgerError> {
    let submission = KycSubmission {
        full_name: required("full_name", &request.full_name)?,
        document_type: required("document_type", &request.document_type)?,
        document_number: required("document_number", &request.document_number)?,
        submitted_at: now,
        rejection_reason: None,
    };

    let mut ledger = state.ledger.write().await;
    let user = ledger.user(user_id)?;
    ensure_active(user)?;
    if !matches!(user.kyc_status, KycStatus::Unverified | KycStatus::Rejected) {
        return Err(LedgerError::InvalidState(format!("kyc is already {}", user.kyc_status.as_str())));
    }

    let user = ledger.user_mut(user_id)?;
    user.kyc_status = KycStatus::Pending;
    user.kyc = Some(submission);
    info!(%user_id, "kyc submitted");
    Ok(user.clone())
}

fn ensure_pending(user: &User) -> Result<(), LedgerError> {
    if user.kyc_status != KycStatus::Pending {
        return Err(LedgerError::InvalidState(format!("kyc is {}, not pending", user.kyc_status.as_str())));
    }
    Ok(())
}

/// # Errors
///
/// `Forbidden` unless the caller is an admin; `InvalidState` unless pending.
pub async fn approve(state: &AppState, admin_id: Uuid, user_id: Uuid) -> Result<User, LedgerError> {
    let mut ledger = state.ledger.write().await;
    ensure_admin(&ledger, admin_id)?;
    ensure_pending(ledger.user(user_id)?)?;

    let user = ledger.user_mut(user_id)?;
    user.kyc_status = KycStatus::Verified;
    info!(%admin_id, %user_id, "kyc approved");
    Ok(user.clone())
}

/// # Errors
///
/// `Forbidden` unless the caller is an admin; `InvalidState` unless pending.
pub async fn reject(state: &AppState, admin_id: Uuid, user_id: Uuid, reason: &str) -> Result<User, LedgerError> {
    let reason = required("reason", reason)?;
    let mut ledger = state.ledger.write().await;
    ensure_admin(&ledger, admin_id)?;
    ensure_pending(ledger.user(user_id)?)?;

    let user = ledger.user_mut(user_id)?;
    user.kyc_status = KycStatus::Rejected;
    if let Some(kyc) = user.kyc.as_mut() {
        kyc.rejection_reason = Some(reason);
    }
    info!(%admin_id, %user_id, "kyc rejected");
    Ok(user.clone())
}

#[cfg(test)]
#[path = "kyc_test.rs"]
mod tests;
