//! Wallet service: deposits, internal transfers, and transaction history.
//!
//! DESIGN
//! ======
//! Deposits are requests: they sit `Awaiting Confirmation` until an admin
//! approves them, and only approval credits the balance. Transfers settle
//! immediately and write one record per side plus an optional fee record.
//!
//! Requests carrying an `Idempotency-Key` remember the transactions they
//! created; a retry with the same key returns those records unchanged.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::account::normalize_email;
use super::{ensure_active, ensure_admin, ensure_can_debit, ensure_funds, pending_of, scoped_key};
use crate::config::AppConfig;
use crate::error::LedgerError;
use crate::models::{PositionStatus, Transaction, TransactionStatus, TransactionType};
use crate::money::{bps_share, fee_for, validate_amount};
use crate::state::{AppState, Ledger};

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 200;
const MAX_NOTE_LEN: usize = 140;
const MAX_CURRENCY_LEN: usize = 8;

// =============================================================================
// SUMMARY / HISTORY
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    pub balance: Decimal,
    pub on_hold_balance: Decimal,
    pub invested: Decimal,
    pub unclaimed_profit: Decimal,
    pub copy_trading_allocated: Decimal,
    pub pending_deposits: Decimal,
}

/// # Errors
///
/// Returns `UserNotFound` for unknown ids.
pub async fn summary(state: &AppState, user_id: Uuid) -> Result<WalletSummary, LedgerError> {
    let ledger = state.ledger.read().await;
    let user = ledger.user(user_id)?;
    let copy_trading_allocated = ledger
        .positions
        .values()
        .filter(|p| p.user_id == user_id && p.status == PositionStatus::Open)
        .map(|p| p.allocated)
        .sum();
    let pending_deposits = ledger
        .transactions_for(user_id)
        .filter(|tx| tx.tx_type == TransactionType::Deposit && tx.is_pending())
        .map(|tx| tx.amount)
        .sum();
    Ok(WalletSummary {
        balance: user.balance,
        on_hold_balance: user.on_hold_balance,
        invested: user.invested,
        unclaimed_profit: user.unclaimed_profit,
        copy_trading_allocated,
        pending_deposits,
    })
}

/// A page of the user's transactions, newest first. `limit` defaults to 50
/// and is capped at 200.
///
/// # Errors
///
/// Returns `UserNotFound` for unknown ids.
pub async fn list_transactions(
    state: &AppState,
    user_id: Uuid,
    limit: Option<usize>,
    offset: Option<usize>,
) -> Result<Vec<Transaction>, LedgerError> {
    let ledger = state.ledger.read().await;
    ledger.user(user_id)?;
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    Ok(ledger
        .transactions_for(user_id)
        .skip(offset.unwrap_or(0))
        .take(limit)
        .cloned()
        .collect())
}

// =============================================================================
// DEPOSITS
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct DepositRequest {
    pub amount: Decimal,
    /// Amount in the currency the user paid with, for display only.
    #[serde(default)]
    pub original_amount: Option<Decimal>,
    #[serde(default)]
    pub original_currency: Option<String>,
}

/// Record a deposit awaiting admin confirmation.
///
/// # Errors
///
/// `InvalidAmount`, `AccountBanned`, or `PendingRequestExists` when the
/// user already has the maximum number of open deposits.
pub async fn request_deposit(
    state: &AppState,
    user_id: Uuid,
    request: DepositRequest,
    idempotency_key: Option<&str>,
) -> Result<Transaction, LedgerError> {
    request_deposit_at(state, user_id, request, idempotency_key, Utc::now()).await
}

pub(crate) async fn request_deposit_at(
    state: &AppState,
    user_id: Uuid,
    request: DepositRequest,
    idempotency_key: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Transaction, LedgerError> {
    let key = scoped_key("deposit", idempotency_key);
    let mut ledger = state.ledger.write().await;
    if let Some(first) = ledger.replay(user_id, key.as_deref()).and_then(|txs| txs.into_iter().next()) {
        return Ok(first);
    }

    let amount = validate_amount(request.amount)?;
    let original_amount = request.original_amount.map(validate_amount).transpose()?;
    let currency = request
        .original_currency
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty());
    if currency.as_ref().is_some_and(|c| c.len() > MAX_CURRENCY_LEN) {
        return Err(LedgerError::InvalidInput("original_currency is too long".into()));
    }
    ensure_active(ledger.user(user_id)?)?;
    if ledger.count_open(user_id, TransactionType::Deposit) >= state.config.max_pending_deposits {
        return Err(LedgerError::PendingRequestExists("deposit"));
    }

    let mut tx = Transaction::new(user_id, TransactionType::Deposit, amount, TransactionStatus::AwaitingConfirmation, now);
    tx.original_amount = original_amount;
    tx.original_currency = currency;
    let result = tx.clone();
    let id = ledger.record(tx);
    ledger.remember(user_id, key.as_deref(), vec![id], now);

    info!(%user_id, tx_id = %id, amount = %amount, "deposit requested");
    Ok(result)
}

/// Credit a pending deposit. Pays the referrer's bonus when this is the
/// user's first completed deposit.
pub(crate) fn approve_deposit_in(
    ledger: &mut Ledger,
    config: &AppConfig,
    tx_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Transaction, LedgerError> {
    let deposit = pending_of(ledger, tx_id, TransactionType::Deposit)?.clone();
    let user_id = deposit.user_id;
    let first_deposit = !ledger
        .transactions_for(user_id)
        .any(|tx| tx.tx_type == TransactionType::Deposit && tx.status == TransactionStatus::Completed);
    let referrer = ledger.user(user_id)?.referred_by;

    ledger.user_mut(user_id)?.balance += deposit.amount;
    let tx = ledger.tx_mut(tx_id)?;
    tx.status = TransactionStatus::Completed;
    let result = tx.clone();
    info!(%user_id, %tx_id, amount = %deposit.amount, "deposit approved");

    if let Some(referrer_id) = referrer.filter(|_| first_deposit) {
        let bonus = bps_share(deposit.amount, config.referral_bonus_bps)?;
        let eligible = ledger.user(referrer_id).is_ok_and(|r| !r.is_banned);
        if eligible && bonus > Decimal::ZERO {
            ledger.user_mut(referrer_id)?.balance += bonus;
            let reward = Transaction::new(referrer_id, TransactionType::Referral, bonus, TransactionStatus::Completed, now)
                .with_description("Referral bonus")
                .with_related(tx_id);
            let reward_id = ledger.record(reward);
            info!(%referrer_id, referred = %user_id, tx_id = %reward_id, amount = %bonus, "referral bonus paid");
        }
    }
    Ok(result)
}

pub(crate) fn reject_deposit_in(ledger: &mut Ledger, tx_id: Uuid) -> Result<Transaction, LedgerError> {
    pending_of(ledger, tx_id, TransactionType::Deposit)?;
    let tx = ledger.tx_mut(tx_id)?;
    tx.status = TransactionStatus::Rejected;
    info!(user_id = %tx.user_id, %tx_id, "deposit rejected");
    Ok(tx.clone())
}

/// # Errors
///
/// `Forbidden` unless the caller is an admin; `InvalidState` unless the
/// transaction is a pending deposit.
pub async fn approve_deposit(state: &AppState, admin_id: Uuid, tx_id: Uuid) -> Result<Transaction, LedgerError> {
    let mut ledger = state.ledger.write().await;
    ensure_admin(&ledger, admin_id)?;
    approve_deposit_in(&mut ledger, &state.config, tx_id, Utc::now())
}

/// # Errors
///
/// `Forbidden` unless the caller is an admin; `InvalidState` unless the
/// transaction is a pending deposit.
pub async fn reject_deposit(state: &AppState, admin_id: Uuid, tx_id: Uuid) -> Result<Transaction, LedgerError> {
    let mut ledger = state.ledger.write().await;
    ensure_admin(&ledger, admin_id)?;
    reject_deposit_in(&mut ledger, tx_id)
}

// =============================================================================
// TRANSFERS
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    /// Referral code, email address, or user id of the recipient.
    pub recipient: String,
    pub amount: Decimal,
    #[serde(default)]
    pub note: Option<String>,
}

/// Resolve a recipient identifier: user id, then email, then referral code.
fn resolve_recipient(ledger: &Ledger, raw: &str) -> Option<Uuid> {
    let raw = raw.trim();
    if let Ok(id) = Uuid::parse_str(raw) {
        return ledger.users.contains_key(&id).then_some(id);
    }
    if let Some(email) = normalize_email(raw) {
        return ledger.user_id_by_email(&email);
    }
    ledger.user_id_by_referral(&raw.to_ascii_uppercase())
}

/// Move funds to another user. Returns the sender's debit, the recipient's
/// credit, and the fee record when a fee was charged, in that order.
///
/// # Errors
///
/// `RecipientNotFound`, `InvalidInput` for self-transfers,
/// `AccountFrozen`/`AccountBanned`, or `InsufficientFunds`.
pub async fn transfer(
    state: &AppState,
    sender_id: Uuid,
    request: TransferRequest,
    idempotency_key: Option<&str>,
) -> Result<Vec<Transaction>, LedgerError> {
    transfer_at(state, sender_id, request, idempotency_key, Utc::now()).await
}

pub(crate) async fn transfer_at(
    state: &AppState,
    sender_id: Uuid,
    request: TransferRequest,
    idempotency_key: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Vec<Transaction>, LedgerError> {
    let key = scoped_key("transfer", idempotency_key);
    let mut ledger = state.ledger.write().await;
    if let Some(previous) = ledger.replay(sender_id, key.as_deref()) {
        return Ok(previous);
    }

    let amount = validate_amount(request.amount)?;
    let note = request
        .note
        .map(|n| n.trim().chars().take(MAX_NOTE_LEN).collect::<String>())
        .filter(|n| !n.is_empty());

    let sender = ledger.user(sender_id)?;
    ensure_can_debit(sender)?;
    let recipient_id = resolve_recipient(&ledger, &request.recipient).ok_or(LedgerError::RecipientNotFound)?;
    if recipient_id == sender_id {
        return Err(LedgerError::InvalidInput("cannot transfer to yourself".into()));
    }
    let recipient = ledger.user(recipient_id)?;
    if recipient.is_banned {
        return Err(LedgerError::RecipientNotFound);
    }
    let recipient_name = recipient.name.clone();
    let sender = ledger.user(sender_id)?;
    let fee = fee_for(amount, state.config.transfer_fee_bps, sender.is_fee_exempt)?;
    ensure_funds(sender, amount + fee)?;
    let sender_name = sender.name.clone();

    ledger.user_mut(sender_id)?.balance -= amount + fee;
    ledger.user_mut(recipient_id)?.balance += amount;

    let debit = Transaction::new(sender_id, TransactionType::Transfer, -amount, TransactionStatus::Completed, now)
        .with_recipient(recipient_id)
        .with_description(note.clone().unwrap_or_else(|| format!("Transfer to {recipient_name}")));
    let credit = Transaction::new(recipient_id, TransactionType::Transfer, amount, TransactionStatus::Completed, now)
        .with_related(debit.id)
        .with_description(note.unwrap_or_else(|| format!("Transfer from {sender_name}")));

    let mut created = vec![debit.clone(), credit.clone()];
    let mut ids = vec![ledger.record(debit.clone()), ledger.record(credit)];
    if fee > Decimal::ZERO {
        let fee_tx = Transaction::new(sender_id, TransactionType::Fee, -fee, TransactionStatus::Completed, now)
            .with_description("Transfer fee")
            .with_related(debit.id);
        created.push(fee_tx.clone());
        ids.push(ledger.record(fee_tx));
    }
    ledger.remember(sender_id, key.as_deref(), ids, now);

    info!(%sender_id, %recipient_id, tx_id = %debit.id, amount = %amount, fee = %fee, "transfer completed");
    Ok(created)
}

#[cfg(test)]
#[path = "wallet_test.rs"]
mod tests;
