//! Domain services used by HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the ledger rules so route handlers can stay focused
//! on protocol translation and auth plumbing. Every mutation validates
//! against the ledger first and only then applies changes, all under one
//! write lock: a failed call leaves nothing half-applied.

pub mod account;
pub mod copy_trading;
pub mod dispute;
pub mod investment;
pub mod kyc;
pub mod persistence;
pub mod review;
pub mod session;
pub mod voucher;
pub mod wallet;
pub mod withdrawal;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::models::{Transaction, TransactionType, User};
use crate::state::{AppState, Ledger};

/// Uppercase alphanumerics without the look-alikes `0 O 1 I`.
pub(crate) const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[must_use]
pub(crate) fn random_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| {
            let idx = rng.random_range(0..CODE_ALPHABET.len());
            char::from(CODE_ALPHABET[idx])
        })
        .collect()
}

/// Banned accounts may not act at all.
pub(crate) fn ensure_active(user: &User) -> Result<(), LedgerError> {
    if user.is_banned {
        return Err(LedgerError::AccountBanned);
    }
    Ok(())
}

/// Frozen accounts keep receiving credits but may not move money out.
pub(crate) fn ensure_can_debit(user: &User) -> Result<(), LedgerError> {
    ensure_active(user)?;
    if user.is_frozen {
        return Err(LedgerError::AccountFrozen);
    }
    Ok(())
}

pub(crate) fn ensure_funds(user: &User, needed: Decimal) -> Result<(), LedgerError> {
    if user.balance < needed {
        return Err(LedgerError::InsufficientFunds { needed, available: user.balance });
    }
    Ok(())
}

pub(crate) fn ensure_admin(ledger: &Ledger, admin_id: Uuid) -> Result<(), LedgerError> {
    let admin = ledger.user(admin_id)?;
    if !admin.is_admin() || admin.is_banned {
        return Err(LedgerError::Forbidden);
    }
    Ok(())
}

/// A transaction of `tx_type` that is still awaiting an admin decision.
pub(crate) fn pending_of(ledger: &Ledger, tx_id: Uuid, tx_type: TransactionType) -> Result<&Transaction, LedgerError> {
    let tx = ledger.tx(tx_id)?;
    if tx.tx_type != tx_type {
        return Err(LedgerError::InvalidState(format!(
            "transaction is a {}, not a {}",
            tx.tx_type.as_str(),
            tx_type.as_str()
        )));
    }
    if !tx.is_pending() {
        return Err(LedgerError::InvalidState(format!("transaction is already {}", tx.status.as_str())));
    }
    Ok(tx)
}

/// Namespace an `Idempotency-Key` by operation so one key cannot replay
/// another operation's result.
pub(crate) fn scoped_key(operation: &str, key: Option<&str>) -> Option<String> {
    key.map(str::trim).filter(|k| !k.is_empty()).map(|k| format!("{operation}:{k}"))
}

/// Forget idempotency keys older than `IDEMPOTENCY_TTL_SECS`. Returns how
/// many were dropped.
pub async fn prune_idempotency_keys(state: &AppState, now: DateTime<Utc>) -> usize {
    let cutoff = now - Duration::seconds(state.config.idempotency_ttl_secs);
    let dropped = state.ledger.write().await.prune_idempotency(cutoff);
    if dropped > 0 {
        debug!(dropped, "expired idempotency keys pruned");
    }
    dropped
}
