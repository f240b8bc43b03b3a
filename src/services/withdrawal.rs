//! Withdrawal service: quote, countdown confirmation, and admin payout.
//!
//! DESIGN
//! ======
//! A withdrawal runs in two user steps. `request` validates and parks a
//! `WithdrawalIntent` in memory with a `confirm_after` instant; `confirm`
//! refuses to act before that instant, so the countdown holds even when a
//! client skips it. Confirming moves `amount` from `balance` to
//! `on_hold_balance`, charges the fee, and opens a `withdrawal` record for
//! admin review.
//!
//! Admin approval releases the hold (the money has left the platform).
//! Rejection returns the held amount to `balance` and refunds the fee.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::{ensure_admin, ensure_can_debit, ensure_funds, pending_of};
use crate::config::AppConfig;
use crate::error::LedgerError;
use crate::models::{
    KycStatus, Transaction, TransactionStatus, TransactionType, User, WithdrawalDetails, WithdrawalIntent,
    WithdrawalMethod,
};
use crate::money::{fee_for, validate_amount};
use crate::state::{AppState, Ledger};

const MAX_DESTINATION_LEN: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WithdrawalQuote {
    pub amount: Decimal,
    pub fee: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: Decimal,
    pub method: WithdrawalMethod,
    pub destination: String,
}

fn quote_for(config: &AppConfig, user: &User, amount: Decimal) -> Result<WithdrawalQuote, LedgerError> {
    let fee = fee_for(amount, config.withdrawal_fee_bps, user.is_fee_exempt)?;
    Ok(WithdrawalQuote { amount, fee, total: amount + fee })
}

/// Fee and total debit for withdrawing `amount`.
///
/// # Errors
///
/// `InvalidAmount` or `UserNotFound`.
pub async fn quote(state: &AppState, user_id: Uuid, amount: Decimal) -> Result<WithdrawalQuote, LedgerError> {
    let amount = validate_amount(amount)?;
    let ledger = state.ledger.read().await;
    quote_for(&state.config, ledger.user(user_id)?, amount)
}

/// Checks shared by `request` and `confirm`; the ledger may have changed
/// between the two.
fn check_eligible(ledger: &Ledger, user_id: Uuid, total: Decimal) -> Result<(), LedgerError> {
    let user = ledger.user(user_id)?;
    ensure_can_debit(user)?;
    if user.kyc_status != KycStatus::Verified {
        return Err(LedgerError::KycRequired);
    }
    if ledger.has_open(user_id, TransactionType::Withdrawal) {
        return Err(LedgerError::PendingRequestExists("withdrawal"));
    }
    ensure_funds(user, total)
}

fn prune_expired_for(ledger: &mut Ledger, user_id: Uuid, now: DateTime<Utc>) {
    ledger.intents.retain(|_, intent| intent.user_id != user_id || intent.expires_at > now);
}

// =============================================================================
// USER STEPS
// =============================================================================

/// Validate a withdrawal and start its confirmation countdown.
///
/// # Errors
///
/// `BelowMinimum`, `KycRequired`, `AccountFrozen`/`AccountBanned`,
/// `PendingRequestExists` when a withdrawal is already open or awaiting
/// confirmation, or `InsufficientFunds` for `amount + fee`.
pub async fn request(state: &AppState, user_id: Uuid, request: WithdrawalRequest) -> Result<WithdrawalIntent, LedgerError> {
    request_at(state, user_id, request, Utc::now()).await
}

pub(crate) async fn request_at(
    state: &AppState,
    user_id: Uuid,
    request: WithdrawalRequest,
    now: DateTime<Utc>,
) -> Result<WithdrawalIntent, LedgerError> {
    let amount = validate_amount(request.amount)?;
    let destination = request.destination.trim().to_owned();
    if destination.is_empty() || destination.len() > MAX_DESTINATION_LEN {
        return Err(LedgerError::InvalidInput("destination is required".into()));
    }
    let config = &state.config;
    if amount < config.min_withdrawal {
        return Err(LedgerError::BelowMinimum { amount, minimum: config.min_withdrawal });
    }

    let mut ledger = state.ledger.write().await;
    prune_expired_for(&mut ledger, user_id, now);
    let quote = quote_for(config, ledger.user(user_id)?, amount)?;
    check_eligible(&ledger, user_id, quote.total)?;
    if ledger.intents.values().any(|intent| intent.user_id == user_id) {
        return Err(LedgerError::PendingRequestExists("withdrawal"));
    }

    let intent = WithdrawalIntent {
        id: Uuid::new_v4(),
        user_id,
        amount,
        fee: quote.fee,
        total: quote.total,
        details: WithdrawalDetails { method: request.method, destination, fee: quote.fee },
        created_at: now,
        confirm_after: now + Duration::seconds(config.withdrawal_countdown_secs),
        expires_at: now + Duration::seconds(config.withdrawal_intent_ttl_secs),
    };
    ledger.intents.insert(intent.id, intent.clone());
    info!(%user_id, intent_id = %intent.id, amount = %amount, fee = %quote.fee, "withdrawal requested");
    Ok(intent)
}

/// Seconds left until `at`, rounded up so a client never retries early.
fn seconds_until(at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (at - now).num_milliseconds().max(0);
    (millis + 999) / 1000
}

/// Commit a withdrawal after its countdown. Returns the `withdrawal` record.
///
/// # Errors
///
/// `IntentNotFound`, `CooldownActive` before the countdown ends,
/// `IntentExpired` after the intent's TTL, or any eligibility error if the
/// account changed since the request.
pub async fn confirm(state: &AppState, user_id: Uuid, intent_id: Uuid) -> Result<Transaction, LedgerError> {
    confirm_at(state, user_id, intent_id, Utc::now()).await
}

pub(crate) async fn confirm_at(
    state: &AppState,
    user_id: Uuid,
    intent_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Transaction, LedgerError> {
    let mut ledger = state.ledger.write().await;
    let intent = ledger
        .intents
        .get(&intent_id)
        .filter(|intent| intent.user_id == user_id)
        .cloned()
        .ok_or(LedgerError::IntentNotFound(intent_id))?;

    if now >= intent.expires_at {
        ledger.intents.remove(&intent_id);
        return Err(LedgerError::IntentExpired);
    }
    if now < intent.confirm_after {
        return Err(LedgerError::CooldownActive { remaining_secs: seconds_until(intent.confirm_after, now) });
    }
    check_eligible(&ledger, user_id, intent.total)?;

    ledger.intents.remove(&intent_id);
    let user = ledger.user_mut(user_id)?;
    user.balance -= intent.total;
    user.on_hold_balance += intent.amount;

    let mut withdrawal = Transaction::new(
        user_id,
        TransactionType::Withdrawal,
        -intent.amount,
        TransactionStatus::AwaitingConfirmation,
        now,
    );
    withdrawal.withdrawal_details = Some(intent.details.clone());
    let result = withdrawal.clone();
    let withdrawal_id = ledger.record(withdrawal);
    if intent.fee > Decimal::ZERO {
        let fee = Transaction::new(user_id, TransactionType::Fee, -intent.fee, TransactionStatus::Completed, now)
            .with_description("Withdrawal fee")
            .with_related(withdrawal_id);
        ledger.record(fee);
    }

    info!(%user_id, tx_id = %withdrawal_id, amount = %intent.amount, fee = %intent.fee, "withdrawal confirmed");
    Ok(result)
}

/// Drop an unconfirmed withdrawal. Nothing has moved yet.
///
/// # Errors
///
/// `IntentNotFound` when the intent does not exist or belongs to someone else.
pub async fn cancel(state: &AppState, user_id: Uuid, intent_id: Uuid) -> Result<(), LedgerError> {
    let mut ledger = state.ledger.write().await;
    if !ledger.intents.get(&intent_id).is_some_and(|intent| intent.user_id == user_id) {
        return Err(LedgerError::IntentNotFound(intent_id));
    }
    ledger.intents.remove(&intent_id);
    info!(%user_id, %intent_id, "withdrawal cancelled");
    Ok(())
}

/// Forget every intent past its TTL. Returns how many were dropped.
pub async fn prune_expired(state: &AppState, now: DateTime<Utc>) -> usize {
    let mut ledger = state.ledger.write().await;
    let before = ledger.intents.len();
    ledger.intents.retain(|_, intent| intent.expires_at > now);
    let dropped = before - ledger.intents.len();
    if dropped > 0 {
        debug!(dropped, "expired withdrawal intents pruned");
    }
    dropped
}

// =============================================================================
// ADMIN DECISIONS
// =============================================================================

pub(crate) fn approve_in(ledger: &mut Ledger, tx_id: Uuid) -> Result<Transaction, LedgerError> {
    let withdrawal = pending_of(ledger, tx_id, TransactionType::Withdrawal)?.clone();
    let held = -withdrawal.amount;

    let user = ledger.user_mut(withdrawal.user_id)?;
    user.on_hold_balance = (user.on_hold_balance - held).max(Decimal::ZERO);
    let tx = ledger.tx_mut(tx_id)?;
    tx.status = TransactionStatus::Completed;
    info!(user_id = %withdrawal.user_id, %tx_id, amount = %held, "withdrawal approved");
    Ok(tx.clone())
}

pub(crate) fn reject_in(ledger: &mut Ledger, tx_id: Uuid, reason: &str, now: DateTime<Utc>) -> Result<Transaction, LedgerError> {
    let withdrawal = pending_of(ledger, tx_id, TransactionType::Withdrawal)?.clone();
    let held = -withdrawal.amount;
    let fee = withdrawal.withdrawal_details.as_ref().map_or(Decimal::ZERO, |d| d.fee);
    let user_id = withdrawal.user_id;

    let user = ledger.user_mut(user_id)?;
    user.on_hold_balance = (user.on_hold_balance - held).max(Decimal::ZERO);
    user.balance += held + fee;
    let tx = ledger.tx_mut(tx_id)?;
    tx.status = TransactionStatus::Rejected;
    let result = tx.clone();

    if fee > Decimal::ZERO {
        let refund = Transaction::new(user_id, TransactionType::Refund, fee, TransactionStatus::Completed, now)
            .with_description(format!("Withdrawal fee refund: {reason}"))
            .with_related(tx_id);
        ledger.record(refund);
    }
    info!(%user_id, %tx_id, amount = %held, fee = %fee, reason, "withdrawal rejected");
    Ok(result)
}

/// # Errors
///
/// `Forbidden` unless the caller is an admin; `InvalidState` unless the
/// transaction is a pending withdrawal.
pub async fn approve(state: &AppState, admin_id: Uuid, tx_id: Uuid) -> Result<Transaction, LedgerError> {
    let mut ledger = state.ledger.write().await;
    ensure_admin(&ledger, admin_id)?;
    approve_in(&mut ledger, tx_id)
}

/// # Errors
///
/// `Forbidden` unless the caller is an admin; `InvalidState` unless the
/// transaction is a pending withdrawal.
pub async fn reject(state: &AppState, admin_id: Uuid, tx_id: Uuid, reason: &str) -> Result<Transaction, LedgerError> {
    let mut ledger = state.ledger.write().await;
    ensure_admin(&ledger, admin_id)?;
    reject_in(&mut ledger, tx_id, reason, Utc::now())
}

#[cfg(test)]
#[path = "withdrawal_test.rs"]
mod tests;
