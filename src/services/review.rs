//! Admin review queue: everything waiting on a human decision.

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{ensure_admin, investment, wallet, withdrawal};
use crate::error::LedgerError;
use crate::models::{KycStatus, Transaction, TransactionType, User};
use crate::state::AppState;

const DEFAULT_REJECT_REASON: &str = "rejected by review";

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReviewQueue {
    pub deposits: Vec<Transaction>,
    pub withdrawals: Vec<Transaction>,
    pub investment_withdrawals: Vec<Transaction>,
    pub kyc: Vec<User>,
    pub disputes: Vec<Transaction>,
}

/// Pending requests, KYC submissions, and live disputes, oldest first.
///
/// # Errors
///
/// `Forbidden` unless the caller is an admin.
pub async fn queue(state: &AppState, admin_id: Uuid) -> Result<ReviewQueue, LedgerError> {
    let ledger = state.ledger.read().await;
    ensure_admin(&ledger, admin_id)?;

    let mut queue = ReviewQueue::default();
    for tx in ledger.transactions.values() {
        if tx.dispute.as_ref().is_some_and(|d| d.status.is_active()) {
            queue.disputes.push(tx.clone());
        }
        if !tx.is_pending() {
            continue;
        }
        match tx.tx_type {
            TransactionType::Deposit => queue.deposits.push(tx.clone()),
            TransactionType::Withdrawal => queue.withdrawals.push(tx.clone()),
            TransactionType::InvestmentWithdrawal => queue.investment_withdrawals.push(tx.clone()),
            _ => {}
        }
    }
    queue.kyc = ledger
        .users
        .values()
        .filter(|u| u.kyc_status == KycStatus::Pending)
        .cloned()
        .collect();

    queue.deposits.sort_by_key(|tx| tx.date);
    queue.withdrawals.sort_by_key(|tx| tx.date);
    queue.investment_withdrawals.sort_by_key(|tx| tx.date);
    queue.disputes.sort_by_key(|tx| tx.dispute.as_ref().map(|d| d.opened_at));
    queue.kyc.sort_by_key(|u| u.kyc.as_ref().map(|k| k.submitted_at));
    Ok(queue)
}

/// Approve or reject a pending request, dispatching on its type.
///
/// # Errors
///
/// `Forbidden`, `TransactionNotFound`, or `InvalidState` for transactions
/// that are not reviewable or no longer pending.
pub async fn decide(
    state: &AppState,
    admin_id: Uuid,
    tx_id: Uuid,
    approve: bool,
    reason: Option<&str>,
) -> Result<Transaction, LedgerError> {
    let now = Utc::now();
    let mut ledger = state.ledger.write().await;
    if let Err(e) = ensure_admin(&ledger, admin_id) {
        warn!(%admin_id, %tx_id, "review decision refused");
        return Err(e);
    }
    let reason = reason.map(str::trim).filter(|r| !r.is_empty()).unwrap_or(DEFAULT_REJECT_REASON);

    let tx_type = ledger.tx(tx_id)?.tx_type;
    let tx = match (tx_type, approve) {
        (TransactionType::Deposit, true) => wallet::approve_deposit_in(&mut ledger, &state.config, tx_id, now)?,
        (TransactionType::Deposit, false) => wallet::reject_deposit_in(&mut ledger, tx_id)?,
        (TransactionType::Withdrawal, true) => withdrawal::approve_in(&mut ledger, tx_id)?,
        (TransactionType::Withdrawal, false) => withdrawal::reject_in(&mut ledger, tx_id, reason, now)?,
        (TransactionType::InvestmentWithdrawal, true) => investment::approve_withdrawal_in(&mut ledger, tx_id, now)?,
        (TransactionType::InvestmentWithdrawal, false) => investment::reject_withdrawal_in(&mut ledger, tx_id)?,
        (other, _) => {
            return Err(LedgerError::InvalidState(format!("{} transactions are not reviewed", other.as_str())));
        }
    };
    info!(%admin_id, %tx_id, approve, status = tx.status.as_str(), "review decision recorded");
    Ok(tx)
}

#[cfg(test)]
#[path = "review_test.rs"]
mod tests;
