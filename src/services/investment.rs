//! Investment service: fixed-rate plans with daily profit accrual.
//!
//! DESIGN
//! ======
//! A user holds at most one active plan. Profit accrues in whole days from
//! `last_accrual_at` into `unclaimed_profit`; the clock only advances by the
//! days actually credited, so partial days carry over to the next run.
//! Every operation that changes `invested` settles accrual first so the
//! old principal earns up to that instant.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use super::{ensure_active, ensure_admin, ensure_can_debit, ensure_funds, pending_of};
use crate::catalog::{self, InvestmentPlan};
use crate::error::LedgerError;
use crate::models::{Transaction, TransactionStatus, TransactionType, User};
use crate::money::{accrual, validate_amount};
use crate::state::{AppState, Ledger};

#[must_use]
pub fn plans() -> Vec<InvestmentPlan> {
    catalog::plans()
}

// =============================================================================
// ACCRUAL
// =============================================================================

/// Whole days of profit owed to `user` at `now`, with the amount.
fn pending_accrual(user: &User, now: DateTime<Utc>) -> Result<Option<(i64, Decimal)>, LedgerError> {
    let Some(plan) = user.active_plan_id.as_deref().and_then(catalog::find_plan) else {
        return Ok(None);
    };
    let Some(since) = user.last_accrual_at else {
        return Ok(None);
    };
    let days = (now - since).num_days();
    if days <= 0 || user.invested <= Decimal::ZERO {
        return Ok(None);
    }
    Ok(Some((days, accrual(user.invested, plan.daily_profit_rate, days)?)))
}

/// Credit owed profit to `unclaimed_profit`. Leaves the user untouched when
/// nothing is owed.
fn settle(ledger: &mut Ledger, user_id: Uuid, now: DateTime<Utc>) -> Result<Decimal, LedgerError> {
    let Some((days, profit)) = pending_accrual(ledger.user(user_id)?, now)? else {
        return Ok(Decimal::ZERO);
    };
    let user = ledger.user_mut(user_id)?;
    user.unclaimed_profit += profit;
    user.last_accrual_at = user.last_accrual_at.map(|t| t + Duration::days(days));
    Ok(profit)
}

/// Run accrual for every user with an active plan. Returns how many users
/// were credited.
pub(crate) fn accrue_in(ledger: &mut Ledger, now: DateTime<Utc>) -> usize {
    let due: Vec<Uuid> = ledger
        .users
        .values()
        .filter(|u| !matches!(pending_accrual(u, now), Ok(None)))
        .map(|u| u.id)
        .collect();
    for user_id in &due {
        match settle(ledger, *user_id, now) {
            Ok(profit) => info!(%user_id, amount = %profit, "investment profit accrued"),
            Err(e) => warn!(%user_id, error = %e, "investment accrual failed"),
        }
    }
    due.len()
}

pub async fn accrue_all(state: &AppState, now: DateTime<Utc>) -> usize {
    let mut ledger = state.ledger.write().await;
    accrue_in(&mut ledger, now)
}

// =============================================================================
// USER OPERATIONS
// =============================================================================

/// Put `amount` into `plan_id`. Topping up the active plan is allowed;
/// switching plans is not.
///
/// # Errors
///
/// `PlanNotFound`, `BelowMinimum`, `PlanAlreadyActive`, `PendingRequestExists`
/// while a plan withdrawal is open, or `InsufficientFunds`.
pub async fn invest(state: &AppState, user_id: Uuid, plan_id: &str, amount: Decimal) -> Result<Transaction, LedgerError> {
    invest_at(state, user_id, plan_id, amount, Utc::now()).await
}

pub(crate) async fn invest_at(
    state: &AppState,
    user_id: Uuid,
    plan_id: &str,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<Transaction, LedgerError> {
    let plan = catalog::find_plan(plan_id).ok_or_else(|| LedgerError::PlanNotFound(plan_id.to_owned()))?;
    let amount = validate_amount(amount)?;
    if amount < plan.min_investment {
        return Err(LedgerError::BelowMinimum { amount, minimum: plan.min_investment });
    }

    let mut ledger = state.ledger.write().await;
    let user = ledger.user(user_id)?;
    ensure_can_debit(user)?;
    if let Some(active) = user.active_plan_id.as_deref().filter(|active| *active != plan.id) {
        return Err(LedgerError::PlanAlreadyActive(active.to_owned()));
    }
    ensure_funds(user, amount)?;
    if ledger.has_open(user_id, TransactionType::InvestmentWithdrawal) {
        return Err(LedgerError::PendingRequestExists("investment withdrawal"));
    }

    settle(&mut ledger, user_id, now)?;
    let user = ledger.user_mut(user_id)?;
    user.balance -= amount;
    user.invested += amount;
    user.active_plan_id = Some(plan.id.to_owned());
    user.plan_started_at.get_or_insert(now);
    user.last_accrual_at.get_or_insert(now);

    let tx = Transaction::new(user_id, TransactionType::Investment, -amount, TransactionStatus::Completed, now)
        .with_description(plan.id);
    let result = tx.clone();
    ledger.record(tx);
    info!(%user_id, plan = plan.id, tx_id = %result.id, amount = %amount, "investment placed");
    Ok(result)
}

/// Move accrued profit into the spendable balance.
///
/// # Errors
///
/// `NothingToClaim` when no profit has accrued.
pub async fn claim_profit(state: &AppState, user_id: Uuid) -> Result<Transaction, LedgerError> {
    claim_profit_at(state, user_id, Utc::now()).await
}

pub(crate) async fn claim_profit_at(state: &AppState, user_id: Uuid, now: DateTime<Utc>) -> Result<Transaction, LedgerError> {
    let mut ledger = state.ledger.write().await;
    ensure_active(ledger.user(user_id)?)?;
    settle(&mut ledger, user_id, now)?;
    let profit = ledger.user(user_id)?.unclaimed_profit;
    if profit <= Decimal::ZERO {
        return Err(LedgerError::NothingToClaim);
    }

    let user = ledger.user_mut(user_id)?;
    user.balance += profit;
    user.unclaimed_profit = Decimal::ZERO;
    let tx = Transaction::new(user_id, TransactionType::Profit, profit, TransactionStatus::Completed, now);
    let result = tx.clone();
    ledger.record(tx);
    info!(%user_id, tx_id = %result.id, amount = %profit, "profit claimed");
    Ok(result)
}

/// Ask for the principal back. Funds return on admin approval.
///
/// # Errors
///
/// `InvalidState` without an investment, `PendingRequestExists` when a
/// request is already open.
pub async fn request_withdrawal(state: &AppState, user_id: Uuid) -> Result<Transaction, LedgerError> {
    request_withdrawal_at(state, user_id, Utc::now()).await
}

pub(crate) async fn request_withdrawal_at(
    state: &AppState,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Transaction, LedgerError> {
    let mut ledger = state.ledger.write().await;
    let user = ledger.user(user_id)?;
    ensure_active(user)?;
    if user.invested <= Decimal::ZERO {
        return Err(LedgerError::InvalidState("no active investment".into()));
    }
    if ledger.has_open(user_id, TransactionType::InvestmentWithdrawal) {
        return Err(LedgerError::PendingRequestExists("investment withdrawal"));
    }

    let mut tx = Transaction::new(
        user_id,
        TransactionType::InvestmentWithdrawal,
        user.invested,
        TransactionStatus::AwaitingConfirmation,
        now,
    );
    tx.description = user.active_plan_id.clone();
    let result = tx.clone();
    ledger.record(tx);
    info!(%user_id, tx_id = %result.id, amount = %result.amount, "investment withdrawal requested");
    Ok(result)
}

// =============================================================================
// ADMIN DECISIONS
// =============================================================================

pub(crate) fn approve_withdrawal_in(ledger: &mut Ledger, tx_id: Uuid, now: DateTime<Utc>) -> Result<Transaction, LedgerError> {
    let user_id = pending_of(ledger, tx_id, TransactionType::InvestmentWithdrawal)?.user_id;
    settle(ledger, user_id, now)?;

    let user = ledger.user_mut(user_id)?;
    let principal = user.invested;
    user.balance += principal;
    user.invested = Decimal::ZERO;
    user.active_plan_id = None;
    user.plan_started_at = None;
    user.last_accrual_at = None;
    let tx = ledger.tx_mut(tx_id)?;
    tx.status = TransactionStatus::Completed;
    info!(%user_id, %tx_id, amount = %principal, "investment withdrawal approved");
    Ok(tx.clone())
}

pub(crate) fn reject_withdrawal_in(ledger: &mut Ledger, tx_id: Uuid) -> Result<Transaction, LedgerError> {
    pending_of(ledger, tx_id, TransactionType::InvestmentWithdrawal)?;
    let tx = ledger.tx_mut(tx_id)?;
    tx.status = TransactionStatus::Rejected;
    info!(user_id = %tx.user_id, %tx_id, "investment withdrawal rejected");
    Ok(tx.clone())
}

/// # Errors
///
/// `Forbidden` unless the caller is an admin; `InvalidState` unless the
/// transaction is a pending investment withdrawal.
pub async fn approve_withdrawal(state: &AppState, admin_id: Uuid, tx_id: Uuid) -> Result<Transaction, LedgerError> {
    let mut ledger = state.ledger.write().await;
    ensure_admin(&ledger, admin_id)?;
    approve_withdrawal_in(&mut ledger, tx_id, Utc::now())
}

/// # Errors
///
/// `Forbidden` unless the caller is an admin; `InvalidState` unless the
/// transaction is a pending investment withdrawal.
pub async fn reject_withdrawal(state: &AppState, admin_id: Uuid, tx_id: Uuid) -> Result<Transaction, LedgerError> {
    let mut ledger = state.ledger.write().await;
    ensure_admin(&ledger, admin_id)?;
    reject_withdrawal_in(&mut ledger, tx_id)
}

#[cfg(test)]
#[path = "investment_test.rs"]
mod tests;
