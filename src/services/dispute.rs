//! Dispute service: challenge a completed debit and let an admin rule on it.
//!
//! DESIGN
//! ======
//! A dispute lives on the transaction it challenges. Its status only moves
//! forward: `open -> under_review -> resolved | rejected`, with `open` also
//! allowed to jump straight to a ruling. A transaction carries at most one
//! dispute for its lifetime, so a rejected claim cannot be reopened.
//!
//! Money already returned by another path cannot be refunded again: a
//! rejected withdrawal refunds its fee, and a cancelled voucher refunds the
//! debit that funded it.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::{ensure_active, ensure_admin};
use crate::error::LedgerError;
use crate::models::{Dispute, DisputeStatus, Transaction, TransactionStatus, TransactionType, VoucherStatus};
use crate::state::{AppState, Ledger};

const MAX_TEXT_LEN: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct DisputeOutcome {
    pub transaction: Transaction,
    pub refund: Option<Transaction>,
}

/// Types a user may dispute. Transfers only from the sending side.
fn disputable(tx: &Transaction) -> bool {
    match tx.tx_type {
        TransactionType::Transfer => tx.amount < Decimal::ZERO,
        TransactionType::Withdrawal
        | TransactionType::Fee
        | TransactionType::Voucher
        | TransactionType::Adjustment
        | TransactionType::CopyTrade
        | TransactionType::Investment => true,
        _ => false,
    }
}

/// Whether the debit in `tx` has already been paid back.
fn already_refunded(ledger: &Ledger, tx: &Transaction) -> bool {
    let direct = ledger
        .transactions_for(tx.user_id)
        .any(|t| t.tx_type == TransactionType::Refund && t.related_id == Some(tx.id));
    direct
        || match tx.tx_type {
            TransactionType::Fee => tx
                .related_id
                .and_then(|id| ledger.transactions.get(&id))
                .is_some_and(|parent| {
                    parent.tx_type == TransactionType::Withdrawal && parent.status == TransactionStatus::Rejected
                }),
            TransactionType::Voucher => {
                tx.amount < Decimal::ZERO
                    && tx
                        .description
                        .as_deref()
                        .and_then(|code| ledger.vouchers.get(code))
                        .is_some_and(|v| v.status == VoucherStatus::Cancelled)
            }
            _ => false,
        }
}

fn clean(text: &str) -> String {
    text.trim().chars().take(MAX_TEXT_LEN).collect()
}

/// Open a dispute on one of the caller's completed transactions.
///
/// # Errors
///
/// `TransactionNotFound` for foreign ids, `InvalidState` for ineligible
/// transactions or a closed dispute window, `DisputeExists`, `InvalidInput`
/// for an empty reason.
pub async fn open(
    state: &AppState,
    user_id: Uuid,
    tx_id: Uuid,
    reason: &str,
    details: &str,
) -> Result<Transaction, LedgerError> {
    open_at(state, user_id, tx_id, reason, details, Utc::now()).await
}

pub(crate) async fn open_at(
    state: &AppState,
    user_id: Uuid,
    tx_id: Uuid,
    reason: &str,
    details: &str,
    now: DateTime<Utc>,
) -> Result<Transaction, LedgerError> {
    let reason = clean(reason);
    if reason.is_empty() {
        return Err(LedgerError::InvalidInput("a dispute reason is required".into()));
    }

    let mut ledger = state.ledger.write().await;
    ensure_active(ledger.user(user_id)?)?;
    let tx = ledger
        .transactions
        .get(&tx_id)
        .filter(|tx| tx.user_id == user_id)
        .ok_or(LedgerError::TransactionNotFound(tx_id))?;
    if tx.dispute.is_some() {
        return Err(LedgerError::DisputeExists);
    }
    if tx.status != TransactionStatus::Completed {
        return Err(LedgerError::InvalidState("only completed transactions can be disputed".into()));
    }
    if !disputable(tx) {
        return Err(LedgerError::InvalidState(format!("{} transactions cannot be disputed", tx.tx_type.as_str())));
    }
    if now - tx.date > Duration::days(state.config.dispute_window_days) {
        return Err(LedgerError::InvalidState("the dispute window has closed".into()));
    }
    if already_refunded(&ledger, tx) {
        return Err(LedgerError::InvalidState("transaction was already refunded".into()));
    }

    let tx = ledger.tx_mut(tx_id)?;
    tx.dispute = Some(Dispute {
        status: DisputeStatus::Open,
        reason,
        details: clean(details),
        opened_at: now,
        resolution: None,
    });
    info!(%user_id, %tx_id, "dispute opened");
    Ok(tx.clone())
}

/// The dispute on `tx_id` if it still awaits a ruling.
fn active_dispute(ledger: &Ledger, tx_id: Uuid) -> Result<DisputeStatus, LedgerError> {
    let dispute = ledger.tx(tx_id)?.dispute.as_ref().ok_or(LedgerError::NoDispute)?;
    if !dispute.status.is_active() {
        return Err(LedgerError::InvalidState("dispute is already closed".into()));
    }
    Ok(dispute.status)
}

/// Mark an open dispute as under review.
///
/// # Errors
///
/// `Forbidden`, `NoDispute`, or `InvalidState` unless the dispute is open.
pub async fn escalate(state: &AppState, admin_id: Uuid, tx_id: Uuid) -> Result<Transaction, LedgerError> {
    let mut ledger = state.ledger.write().await;
    ensure_admin(&ledger, admin_id)?;
    if active_dispute(&ledger, tx_id)? != DisputeStatus::Open {
        return Err(LedgerError::InvalidState("dispute is already under review".into()));
    }

    let tx = ledger.tx_mut(tx_id)?;
    if let Some(dispute) = tx.dispute.as_mut() {
        dispute.status = DisputeStatus::UnderReview;
    }
    info!(%admin_id, %tx_id, "dispute escalated");
    Ok(tx.clone())
}

/// Rule in the user's favour. With `refund`, a debit is credited back as a
/// `refund` transaction. Refunding a voucher debit also cancels the voucher
/// if it is still active.
///
/// # Errors
///
/// `Forbidden`, `NoDispute`, or `InvalidState` once closed or when the
/// debit was already refunded elsewhere.
pub async fn resolve(
    state: &AppState,
    admin_id: Uuid,
    tx_id: Uuid,
    refund: bool,
    resolution: &str,
) -> Result<DisputeOutcome, LedgerError> {
    resolve_at(state, admin_id, tx_id, refund, resolution, Utc::now()).await
}

pub(crate) async fn resolve_at(
    state: &AppState,
    admin_id: Uuid,
    tx_id: Uuid,
    refund: bool,
    resolution: &str,
    now: DateTime<Utc>,
) -> Result<DisputeOutcome, LedgerError> {
    let mut ledger = state.ledger.write().await;
    ensure_admin(&ledger, admin_id)?;
    active_dispute(&ledger, tx_id)?;
    if refund && already_refunded(&ledger, ledger.tx(tx_id)?) {
        return Err(LedgerError::InvalidState("transaction was already refunded".into()));
    }

    let tx = ledger.tx_mut(tx_id)?;
    if let Some(dispute) = tx.dispute.as_mut() {
        dispute.status = DisputeStatus::Resolved;
        dispute.resolution = Some(clean(resolution)).filter(|r| !r.is_empty());
    }
    let transaction = tx.clone();

    let refund = if refund && transaction.amount < Decimal::ZERO {
        let amount = -transaction.amount;
        ledger.user_mut(transaction.user_id)?.balance += amount;
        let credit = Transaction::new(transaction.user_id, TransactionType::Refund, amount, TransactionStatus::Completed, now)
            .with_description("Dispute refund")
            .with_related(tx_id);
        ledger.record(credit.clone());
        if transaction.tx_type == TransactionType::Voucher {
            retire_voucher(&mut ledger, &transaction)?;
        }
        Some(credit)
    } else {
        None
    };

    info!(%admin_id, %tx_id, refunded = refund.is_some(), "dispute resolved");
    Ok(DisputeOutcome { transaction, refund })
}

/// Cancel the still-active voucher funded by `debit` so it cannot be
/// redeemed or cancelled after its money was returned.
fn retire_voucher(ledger: &mut Ledger, debit: &Transaction) -> Result<(), LedgerError> {
    let Some(code) = debit.description.as_deref() else {
        return Ok(());
    };
    if ledger.vouchers.get(code).is_some_and(|v| v.status == VoucherStatus::Active) {
        ledger.voucher_mut(code)?.status = VoucherStatus::Cancelled;
        info!(tx_id = %debit.id, %code, "voucher cancelled by dispute refund");
    }
    Ok(())
}

/// Rule against the user.
///
/// # Errors
///
/// `Forbidden`, `NoDispute`, or `InvalidState` once closed.
pub async fn reject(state: &AppState, admin_id: Uuid, tx_id: Uuid, resolution: &str) -> Result<Transaction, LedgerError> {
    let mut ledger = state.ledger.write().await;
    ensure_admin(&ledger, admin_id)?;
    active_dispute(&ledger, tx_id)?;

    let tx = ledger.tx_mut(tx_id)?;
    if let Some(dispute) = tx.dispute.as_mut() {
        dispute.status = DisputeStatus::Rejected;
        dispute.resolution = Some(clean(resolution)).filter(|r| !r.is_empty());
    }
    info!(%admin_id, %tx_id, "dispute rejected");
    Ok(tx.clone())
}

#[cfg(test)]
#[path = "dispute_test.rs"]
mod tests;
