//! Copy-trading service: mirror a catalog trader's simulated daily return.
//!
//! An open position accrues `allocated * daily_roi` per whole day into
//! `pnl`, which may go negative. Stopping pays out `allocated + pnl`,
//! floored at zero.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::{ensure_active, ensure_can_debit, ensure_funds};
use crate::catalog::{self, CopyTrader};
use crate::error::LedgerError;
use crate::models::{CopyPosition, PositionStatus, Transaction, TransactionStatus, TransactionType};
use crate::money::{accrual, validate_amount};
use crate::state::{AppState, Ledger};

#[must_use]
pub fn traders() -> Vec<CopyTrader> {
    catalog::traders()
}

#[derive(Debug, Clone, Serialize)]
pub struct StopReceipt {
    pub position: CopyPosition,
    pub payout: Transaction,
}

fn pending_pnl(position: &CopyPosition, now: DateTime<Utc>) -> Result<Option<(i64, Decimal)>, LedgerError> {
    if position.status != PositionStatus::Open {
        return Ok(None);
    }
    let Some(trader) = catalog::find_trader(&position.trader_id) else {
        return Ok(None);
    };
    let days = (now - position.last_accrual_at).num_days();
    if days <= 0 {
        return Ok(None);
    }
    Ok(Some((days, accrual(position.allocated, trader.daily_roi, days)?)))
}

fn settle(ledger: &mut Ledger, position_id: Uuid, now: DateTime<Utc>) -> Result<(), LedgerError> {
    let position = ledger.positions.get(&position_id).ok_or(LedgerError::PositionNotFound(position_id))?;
    if let Some((days, pnl)) = pending_pnl(position, now)? {
        let position = ledger.position_mut(position_id)?;
        position.pnl += pnl;
        position.last_accrual_at += Duration::days(days);
    }
    Ok(())
}

/// Accrue every open position. Returns how many moved.
pub(crate) fn accrue_in(ledger: &mut Ledger, now: DateTime<Utc>) -> usize {
    let due: Vec<Uuid> = ledger
        .positions
        .values()
        .filter(|p| !matches!(pending_pnl(p, now), Ok(None)))
        .map(|p| p.id)
        .collect();
    for id in &due {
        if let Err(e) = settle(ledger, *id, now) {
            warn!(position_id = %id, error = %e, "copy position accrual failed");
        }
    }
    due.len()
}

pub async fn accrue_all(state: &AppState, now: DateTime<Utc>) -> usize {
    let mut ledger = state.ledger.write().await;
    accrue_in(&mut ledger, now)
}

/// Open a position mirroring `trader_id`.
///
/// # Errors
///
/// `TraderNotFound`, `BelowMinimum`, `PendingRequestExists` when a position
/// with this trader is already open, or `InsufficientFunds`.
pub async fn start(state: &AppState, user_id: Uuid, trader_id: &str, amount: Decimal) -> Result<CopyPosition, LedgerError> {
    start_at(state, user_id, trader_id, amount, Utc::now()).await
}

pub(crate) async fn start_at(
    state: &AppState,
    user_id: Uuid,
    trader_id: &str,
    amount: Decimal,
    now: DateTime<Utc>,
) -> Result<CopyPosition, LedgerError> {
    let trader = catalog::find_trader(trader_id).ok_or_else(|| LedgerError::TraderNotFound(trader_id.to_owned()))?;
    let amount = validate_amount(amount)?;
    if amount < trader.min_allocation {
        return Err(LedgerError::BelowMinimum { amount, minimum: trader.min_allocation });
    }

    let mut ledger = state.ledger.write().await;
    let user = ledger.user(user_id)?;
    ensure_can_debit(user)?;
    ensure_funds(user, amount)?;
    let already_open = ledger
        .positions
        .values()
        .any(|p| p.user_id == user_id && p.trader_id == trader.id && p.status == PositionStatus::Open);
    if already_open {
        return Err(LedgerError::PendingRequestExists("copy-trading position"));
    }

    let position = CopyPosition {
        id: Uuid::new_v4(),
        user_id,
        trader_id: trader.id.to_owned(),
        allocated: amount,
        pnl: Decimal::ZERO,
        opened_at: now,
        last_accrual_at: now,
        closed_at: None,
        status: PositionStatus::Open,
        version: 1,
    };
    ledger.user_mut(user_id)?.balance -= amount;
    ledger.insert_position(position.clone());
    let tx = Transaction::new(user_id, TransactionType::CopyTrade, -amount, TransactionStatus::Completed, now)
        .with_description(format!("Copy {}", trader.name))
        .with_related(position.id);
    ledger.record(tx);

    info!(%user_id, trader = trader.id, position_id = %position.id, amount = %amount, "copy position opened");
    Ok(position)
}

/// Close a position and pay out `allocated + pnl` (never below zero).
///
/// # Errors
///
/// `PositionNotFound` for unknown or foreign positions, `InvalidState` when
/// already closed.
pub async fn stop(state: &AppState, user_id: Uuid, position_id: Uuid) -> Result<StopReceipt, LedgerError> {
    stop_at(state, user_id, position_id, Utc::now()).await
}

pub(crate) async fn stop_at(
    state: &AppState,
    user_id: Uuid,
    position_id: Uuid,
    now: DateTime<Utc>,
) -> Result<StopReceipt, LedgerError> {
    let mut ledger = state.ledger.write().await;
    ensure_active(ledger.user(user_id)?)?;
    let position = ledger
        .positions
        .get(&position_id)
        .filter(|p| p.user_id == user_id)
        .ok_or(LedgerError::PositionNotFound(position_id))?;
    if position.status != PositionStatus::Open {
        return Err(LedgerError::InvalidState("position is already closed".into()));
    }

    settle(&mut ledger, position_id, now)?;
    let position = ledger.position_mut(position_id)?;
    let payout = (position.allocated + position.pnl).max(Decimal::ZERO);
    position.status = PositionStatus::Closed;
    position.closed_at = Some(now);
    let position = position.clone();

    ledger.user_mut(user_id)?.balance += payout;
    let tx = Transaction::new(user_id, TransactionType::CopyTrade, payout, TransactionStatus::Completed, now)
        .with_description("Copy position closed")
        .with_related(position_id);
    ledger.record(tx.clone());

    info!(%user_id, %position_id, pnl = %position.pnl, payout = %payout, "copy position closed");
    Ok(StopReceipt { position, payout: tx })
}

/// The user's positions, newest first.
///
/// # Errors
///
/// Returns `UserNotFound` for unknown ids.
pub async fn list_positions(state: &AppState, user_id: Uuid) -> Result<Vec<CopyPosition>, LedgerError> {
    let ledger = state.ledger.read().await;
    ledger.user(user_id)?;
    let mut positions: Vec<CopyPosition> = ledger.positions.values().filter(|p| p.user_id == user_id).cloned().collect();
    positions.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
    Ok(positions)
}

#[cfg(test)]
#[path = "copy_trading_test.rs"]
mod tests;
