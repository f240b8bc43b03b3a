//! Persistence service: write-behind flush of the ledger to Postgres.
//!
//! DESIGN
//! ======
//! The ledger in memory is authoritative while the process runs. A
//! background task wakes every `LEDGER_FLUSH_INTERVAL_MS`, clones dirty
//! records under a short read lock, releases it, then upserts them in one
//! Postgres transaction. Dirty flags are cleared only after the commit and
//! only for records whose version did not move during the write, so an
//! edit racing a flush is picked up by the next cycle.
//!
//! On startup `hydrate_ledger` reads every table back into a fresh ledger.
//! A second task runs daily accrual and prunes expired withdrawal intents,
//! idempotency keys, and sessions.

use std::time::Duration;

use chrono::Utc;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{copy_trading, investment, session, withdrawal};
use crate::models::{
    CopyPosition, KycStatus, PositionStatus, Role, Transaction, TransactionStatus, TransactionType, User, Voucher,
    VoucherStatus,
};
use crate::state::{AppState, DirtySnapshot, Ledger};

// =============================================================================
// BACKGROUND TASKS
// =============================================================================

/// Spawn the background persistence task. Returns a handle for shutdown.
pub fn spawn_persistence_task(state: AppState) -> JoinHandle<()> {
    let period = Duration::from_millis(state.config.ledger_flush_interval_ms.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            flush_all_dirty(&state).await;
        }
    })
}

/// Spawn the accrual and housekeeping task.
pub fn spawn_accrual_task(state: AppState) -> JoinHandle<()> {
    let period = Duration::from_secs(state.config.accrual_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let now = Utc::now();
            let users = investment::accrue_all(&state, now).await;
            let positions = copy_trading::accrue_all(&state, now).await;
            let intents = withdrawal::prune_expired(&state, now).await;
            let idempotency_keys = super::prune_idempotency_keys(&state, now).await;
            let sessions = session::purge_expired(&state.pool).await.unwrap_or_else(|e| {
                warn!(error = %e, "expired session purge failed");
                0
            });
            info!(users, positions, intents, idempotency_keys, sessions, "accrual cycle complete");
        }
    })
}

/// Flush every dirty record once. Returns how many records were written.
pub async fn flush_all_dirty(state: &AppState) -> usize {
    let snapshot = state.ledger.read().await.snapshot_dirty();
    if snapshot.is_empty() {
        return 0;
    }

    match flush_snapshot(&state.pool, &snapshot).await {
        Ok(()) => {
            state.ledger.write().await.ack_flushed(&snapshot);
            debug!(count = snapshot.len(), "ledger flushed");
            snapshot.len()
        }
        Err(e) => {
            error!(error = %e, count = snapshot.len(), "ledger flush failed; records stay dirty for retry");
            0
        }
    }
}

// =============================================================================
// WRITE
// =============================================================================

/// Upsert a snapshot in a single database transaction.
///
/// # Errors
///
/// Returns a database error if any statement or the commit fails; nothing
/// is written in that case.
pub async fn flush_snapshot(pool: &PgPool, snapshot: &DirtySnapshot) -> Result<(), sqlx::Error> {
    let mut db = pool.begin().await?;
    for user in &snapshot.users {
        upsert_user(&mut db, user).await?;
    }
    for tx in &snapshot.transactions {
        upsert_transaction(&mut db, tx).await?;
    }
    for voucher in &snapshot.vouchers {
        upsert_voucher(&mut db, voucher).await?;
    }
    for position in &snapshot.positions {
        upsert_position(&mut db, position).await?;
    }
    db.commit().await
}

type DbTx<'a> = sqlx::Transaction<'a, Postgres>;

async fn upsert_user(db: &mut DbTx<'_>, user: &User) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO users (id, email, name, password_hash, role, kyc_status, kyc, balance, on_hold_balance, \
             invested, unclaimed_profit, active_plan_id, plan_started_at, last_accrual_at, is_frozen, is_banned, \
             is_fee_exempt, referral_code, referred_by, created_at, version, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, now()) \
         ON CONFLICT (id) DO UPDATE SET \
             email = EXCLUDED.email, name = EXCLUDED.name, password_hash = EXCLUDED.password_hash, \
             role = EXCLUDED.role, kyc_status = EXCLUDED.kyc_status, kyc = EXCLUDED.kyc, \
             balance = EXCLUDED.balance, on_hold_balance = EXCLUDED.on_hold_balance, \
             invested = EXCLUDED.invested, unclaimed_profit = EXCLUDED.unclaimed_profit, \
             active_plan_id = EXCLUDED.active_plan_id, plan_started_at = EXCLUDED.plan_started_at, \
             last_accrual_at = EXCLUDED.last_accrual_at, is_frozen = EXCLUDED.is_frozen, \
             is_banned = EXCLUDED.is_banned, is_fee_exempt = EXCLUDED.is_fee_exempt, \
             version = EXCLUDED.version, updated_at = now() \
         WHERE users.version <= EXCLUDED.version",
    )
    .bind(user.id)
    .bind(&user.email)
    .bind(&user.name)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .bind(user.kyc_status.as_str())
    .bind(user.kyc.as_ref().map(Json))
    .bind(user.balance)
    .bind(user.on_hold_balance)
    .bind(user.invested)
    .bind(user.unclaimed_profit)
    .bind(&user.active_plan_id)
    .bind(user.plan_started_at)
    .bind(user.last_accrual_at)
    .bind(user.is_frozen)
    .bind(user.is_banned)
    .bind(user.is_fee_exempt)
    .bind(&user.referral_code)
    .bind(user.referred_by)
    .bind(user.created_at)
    .bind(user.version)
    .execute(&mut **db)
    .await?;
    Ok(())
}

async fn upsert_transaction(db: &mut DbTx<'_>, tx: &Transaction) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO transactions (id, date, user_id, recipient_id, amount, tx_type, status, description, dispute, \
             withdrawal_details, original_amount, original_currency, related_id, version, seq, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, now()) \
         ON CONFLICT (id) DO UPDATE SET \
             status = EXCLUDED.status, dispute = EXCLUDED.dispute, version = EXCLUDED.version, updated_at = now() \
         WHERE transactions.version <= EXCLUDED.version",
    )
    .bind(tx.id)
    .bind(tx.date)
    .bind(tx.user_id)
    .bind(tx.recipient_id)
    .bind(tx.amount)
    .bind(tx.tx_type.as_str())
    .bind(tx.status.as_str())
    .bind(&tx.description)
    .bind(tx.dispute.as_ref().map(Json))
    .bind(tx.withdrawal_details.as_ref().map(Json))
    .bind(tx.original_amount)
    .bind(&tx.original_currency)
    .bind(tx.related_id)
    .bind(tx.version)
    .bind(tx.seq)
    .execute(&mut **db)
    .await?;
    Ok(())
}

async fn upsert_voucher(db: &mut DbTx<'_>, voucher: &Voucher) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO vouchers (code, amount, created_by, created_at, status, redeemed_by, redeemed_at, version) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (code) DO UPDATE SET \
             status = EXCLUDED.status, redeemed_by = EXCLUDED.redeemed_by, \
             redeemed_at = EXCLUDED.redeemed_at, version = EXCLUDED.version \
         WHERE vouchers.version <= EXCLUDED.version",
    )
    .bind(&voucher.code)
    .bind(voucher.amount)
    .bind(voucher.created_by)
    .bind(voucher.created_at)
    .bind(voucher.status.as_str())
    .bind(voucher.redeemed_by)
    .bind(voucher.redeemed_at)
    .bind(voucher.version)
    .execute(&mut **db)
    .await?;
    Ok(())
}

async fn upsert_position(db: &mut DbTx<'_>, position: &CopyPosition) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO copy_positions (id, user_id, trader_id, allocated, pnl, opened_at, last_accrual_at, closed_at, \
             status, version) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
         ON CONFLICT (id) DO UPDATE SET \
             pnl = EXCLUDED.pnl, last_accrual_at = EXCLUDED.last_accrual_at, closed_at = EXCLUDED.closed_at, \
             status = EXCLUDED.status, version = EXCLUDED.version \
         WHERE copy_positions.version <= EXCLUDED.version",
    )
    .bind(position.id)
    .bind(position.user_id)
    .bind(&position.trader_id)
    .bind(position.allocated)
    .bind(position.pnl)
    .bind(position.opened_at)
    .bind(position.last_accrual_at)
    .bind(position.closed_at)
    .bind(position.status.as_str())
    .bind(position.version)
    .execute(&mut **db)
    .await?;
    Ok(())
}

// =============================================================================
// READ
// =============================================================================

fn decode_text<T>(column: &str, raw: &str, parse: fn(&str) -> Option<T>) -> Result<T, sqlx::Error> {
    parse(raw).ok_or_else(|| sqlx::Error::Decode(format!("unknown {column} value: {raw}").into()))
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        password_hash: row.try_get("password_hash")?,
        role: decode_text("role", row.try_get("role")?, Role::parse)?,
        kyc_status: decode_text("kyc_status", row.try_get("kyc_status")?, KycStatus::parse)?,
        kyc: row.try_get::<Option<Json<_>>, _>("kyc")?.map(|j| j.0),
        balance: row.try_get("balance")?,
        on_hold_balance: row.try_get("on_hold_balance")?,
        invested: row.try_get("invested")?,
        unclaimed_profit: row.try_get("unclaimed_profit")?,
        active_plan_id: row.try_get("active_plan_id")?,
        plan_started_at: row.try_get("plan_started_at")?,
        last_accrual_at: row.try_get("last_accrual_at")?,
        is_frozen: row.try_get("is_frozen")?,
        is_banned: row.try_get("is_banned")?,
        is_fee_exempt: row.try_get("is_fee_exempt")?,
        referral_code: row.try_get("referral_code")?,
        referred_by: row.try_get("referred_by")?,
        created_at: row.try_get("created_at")?,
        version: row.try_get("version")?,
    })
}

fn transaction_from_row(row: &sqlx::postgres::PgRow) -> Result<Transaction, sqlx::Error> {
    Ok(Transaction {
        id: row.try_get("id")?,
        date: row.try_get("date")?,
        user_id: row.try_get("user_id")?,
        recipient_id: row.try_get("recipient_id")?,
        amount: row.try_get("amount")?,
        tx_type: decode_text("tx_type", row.try_get("tx_type")?, TransactionType::parse)?,
        status: decode_text("status", row.try_get("status")?, TransactionStatus::parse)?,
        description: row.try_get("description")?,
        dispute: row.try_get::<Option<Json<_>>, _>("dispute")?.map(|j| j.0),
        withdrawal_details: row.try_get::<Option<Json<_>>, _>("withdrawal_details")?.map(|j| j.0),
        original_amount: row.try_get("original_amount")?,
        original_currency: row.try_get("original_currency")?,
        related_id: row.try_get("related_id")?,
        version: row.try_get("version")?,
        seq: row.try_get("seq")?,
    })
}

fn voucher_from_row(row: &sqlx::postgres::PgRow) -> Result<Voucher, sqlx::Error> {
    Ok(Voucher {
        code: row.try_get("code")?,
        amount: row.try_get("amount")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        status: decode_text("status", row.try_get("status")?, VoucherStatus::parse)?,
        redeemed_by: row.try_get("redeemed_by")?,
        redeemed_at: row.try_get("redeemed_at")?,
        version: row.try_get("version")?,
    })
}

fn position_from_row(row: &sqlx::postgres::PgRow) -> Result<CopyPosition, sqlx::Error> {
    Ok(CopyPosition {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        trader_id: row.try_get("trader_id")?,
        allocated: row.try_get("allocated")?,
        pnl: row.try_get("pnl")?,
        opened_at: row.try_get("opened_at")?,
        last_accrual_at: row.try_get("last_accrual_at")?,
        closed_at: row.try_get("closed_at")?,
        status: decode_text("status", row.try_get("status")?, PositionStatus::parse)?,
        version: row.try_get("version")?,
    })
}

/// Load every persisted record into a fresh ledger.
///
/// # Errors
///
/// Returns a database error if a query fails or a row does not decode.
pub async fn hydrate_ledger(pool: &PgPool) -> Result<Ledger, sqlx::Error> {
    let users = sqlx::query("SELECT * FROM users")
        .fetch_all(pool)
        .await?
        .iter()
        .map(user_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    let transactions = sqlx::query("SELECT * FROM transactions")
        .fetch_all(pool)
        .await?
        .iter()
        .map(transaction_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    let vouchers = sqlx::query("SELECT * FROM vouchers")
        .fetch_all(pool)
        .await?
        .iter()
        .map(voucher_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    let positions = sqlx::query("SELECT * FROM copy_positions")
        .fetch_all(pool)
        .await?
        .iter()
        .map(position_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        users = users.len(),
        transactions = transactions.len(),
        vouchers = vouchers.len(),
        positions = positions.len(),
        "ledger hydrated"
    );
    Ok(Ledger::from_records(users, transactions, vouchers, positions))
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
