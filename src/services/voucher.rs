//! Voucher service: prepaid codes that move balance between users.
//!
//! Creating a voucher debits the creator immediately; the code is then a
//! bearer claim on that amount. Redemption and cancellation are terminal,
//! so a voucher pays out at most once. Voucher transactions carry the code
//! in their description.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use super::{ensure_active, ensure_can_debit, ensure_funds, random_code, scoped_key};
use crate::error::LedgerError;
use crate::models::{Transaction, TransactionStatus, TransactionType, Voucher, VoucherStatus};
use crate::money::validate_amount;
use crate::state::{AppState, Ledger};

const CODE_PREFIX: &str = "VC";
const CODE_GROUP_LEN: usize = 4;

fn generate_code(ledger: &Ledger) -> String {
    loop {
        let code = format!("{CODE_PREFIX}-{}-{}", random_code(CODE_GROUP_LEN), random_code(CODE_GROUP_LEN));
        if !ledger.vouchers.contains_key(&code) {
            return code;
        }
    }
}

#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Issue a voucher for `amount`, debiting the creator.
///
/// # Errors
///
/// `InvalidAmount`, `AccountFrozen`/`AccountBanned`, or `InsufficientFunds`.
pub async fn create(
    state: &AppState,
    user_id: Uuid,
    amount: Decimal,
    idempotency_key: Option<&str>,
) -> Result<Voucher, LedgerError> {
    create_at(state, user_id, amount, idempotency_key, Utc::now()).await
}

pub(crate) async fn create_at(
    state: &AppState,
    user_id: Uuid,
    amount: Decimal,
    idempotency_key: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Voucher, LedgerError> {
    let key = scoped_key("voucher", idempotency_key);
    let mut ledger = state.ledger.write().await;
    let replayed = ledger
        .replay(user_id, key.as_deref())
        .and_then(|txs| txs.into_iter().next())
        .and_then(|tx| tx.description)
        .and_then(|code| ledger.vouchers.get(&code).cloned());
    if let Some(voucher) = replayed {
        return Ok(voucher);
    }

    let amount = validate_amount(amount)?;
    let user = ledger.user(user_id)?;
    ensure_can_debit(user)?;
    ensure_funds(user, amount)?;

    let code = generate_code(&ledger);
    let voucher = Voucher {
        code: code.clone(),
        amount,
        created_by: user_id,
        created_at: now,
        status: VoucherStatus::Active,
        redeemed_by: None,
        redeemed_at: None,
        version: 1,
    };
    ledger.user_mut(user_id)?.balance -= amount;
    ledger.insert_voucher(voucher.clone());
    let tx = Transaction::new(user_id, TransactionType::Voucher, -amount, TransactionStatus::Completed, now)
        .with_description(code.clone());
    let tx_id = ledger.record(tx);
    ledger.remember(user_id, key.as_deref(), vec![tx_id], now);

    info!(%user_id, %tx_id, %code, amount = %amount, "voucher created");
    Ok(voucher)
}

/// Redeem a voucher code into the caller's balance.
///
/// # Errors
///
/// `VoucherNotFound`, `VoucherUnavailable` once redeemed or cancelled,
/// `InvalidInput` when redeeming one's own voucher, `AccountBanned`.
pub async fn redeem(state: &AppState, user_id: Uuid, code: &str) -> Result<Transaction, LedgerError> {
    redeem_at(state, user_id, code, Utc::now()).await
}

pub(crate) async fn redeem_at(
    state: &AppState,
    user_id: Uuid,
    code: &str,
    now: DateTime<Utc>,
) -> Result<Transaction, LedgerError> {
    let code = normalize_code(code);
    let mut ledger = state.ledger.write().await;
    ensure_active(ledger.user(user_id)?)?;
    let voucher = ledger.vouchers.get(&code).ok_or(LedgerError::VoucherNotFound)?;
    if voucher.status != VoucherStatus::Active {
        return Err(LedgerError::VoucherUnavailable);
    }
    if voucher.created_by == user_id {
        return Err(LedgerError::InvalidInput("cannot redeem your own voucher".into()));
    }
    let amount = voucher.amount;

    let voucher = ledger.voucher_mut(&code)?;
    voucher.status = VoucherStatus::Redeemed;
    voucher.redeemed_by = Some(user_id);
    voucher.redeemed_at = Some(now);
    ledger.user_mut(user_id)?.balance += amount;
    let tx = Transaction::new(user_id, TransactionType::Voucher, amount, TransactionStatus::Completed, now)
        .with_description(code.clone());
    let result = tx.clone();
    ledger.record(tx);

    info!(%user_id, tx_id = %result.id, %code, amount = %amount, "voucher redeemed");
    Ok(result)
}

/// Cancel an unredeemed voucher and refund its creator.
///
/// # Errors
///
/// `VoucherNotFound` for unknown codes and for anyone but the creator,
/// `VoucherUnavailable` once redeemed or cancelled.
pub async fn cancel(state: &AppState, user_id: Uuid, code: &str) -> Result<Transaction, LedgerError> {
    cancel_at(state, user_id, code, Utc::now()).await
}

pub(crate) async fn cancel_at(
    state: &AppState,
    user_id: Uuid,
    code: &str,
    now: DateTime<Utc>,
) -> Result<Transaction, LedgerError> {
    let code = normalize_code(code);
    let mut ledger = state.ledger.write().await;
    ensure_active(ledger.user(user_id)?)?;
    let voucher = ledger
        .vouchers
        .get(&code)
        .filter(|v| v.created_by == user_id)
        .ok_or(LedgerError::VoucherNotFound)?;
    if voucher.status != VoucherStatus::Active {
        return Err(LedgerError::VoucherUnavailable);
    }
    let amount = voucher.amount;

    ledger.voucher_mut(&code)?.status = VoucherStatus::Cancelled;
    ledger.user_mut(user_id)?.balance += amount;
    let tx = Transaction::new(user_id, TransactionType::Voucher, amount, TransactionStatus::Completed, now)
        .with_description(code.clone());
    let result = tx.clone();
    ledger.record(tx);

    info!(%user_id, tx_id = %result.id, %code, amount = %amount, "voucher cancelled");
    Ok(result)
}

/// Vouchers the user created, newest first.
///
/// # Errors
///
/// Returns `UserNotFound` for unknown ids.
pub async fn list(state: &AppState, user_id: Uuid) -> Result<Vec<Voucher>, LedgerError> {
    let ledger = state.ledger.read().await;
    ledger.user(user_id)?;
    let mut vouchers: Vec<Voucher> = ledger.vouchers.values().filter(|v| v.created_by == user_id).cloned().collect();
    vouchers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(vouchers)
}

#[cfg(test)]
#[path = "voucher_test.rs"]
mod tests;
