//! Account service: registration, password login, and admin controls.
//!
//! DESIGN
//! ======
//! Password hashing (argon2) is CPU-bound, so it runs on the blocking pool
//! and never while the ledger lock is held. Uniqueness of email and
//! referral code is checked under the write lock at insert time.

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use super::{ensure_admin, random_code};
use crate::error::LedgerError;
use crate::models::{Role, Transaction, TransactionStatus, TransactionType, User};
use crate::money::{MAX_AMOUNT, round_money};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 8;
const REFERRAL_CODE_LEN: usize = 8;
const MAX_NAME_LEN: usize = 80;

// =============================================================================
// INPUT NORMALIZATION
// =============================================================================

#[must_use]
pub fn normalize_email(email: &str) -> Option<String> {
    let normalized = email.trim().to_ascii_lowercase();
    let (local, domain) = normalized.split_once('@')?;
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return None;
    }
    Some(normalized)
}

fn normalize_name(name: &str, email: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return email.split('@').next().unwrap_or("user").to_owned();
    }
    trimmed.chars().take(MAX_NAME_LEN).collect()
}

// =============================================================================
// PASSWORDS
// =============================================================================

fn hash_password(password: &str) -> Result<String, LedgerError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| LedgerError::PasswordHash(e.to_string()))
}

fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored)
        .is_ok_and(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

async fn hash_password_blocking(password: String) -> Result<String, LedgerError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| LedgerError::PasswordHash(e.to_string()))?
}

// =============================================================================
// REGISTRATION / LOGIN
// =============================================================================

/// Register a new account.
///
/// # Errors
///
/// `InvalidInput` for a bad email or short password, `EmailTaken`, or
/// `RecipientNotFound` when the referral code does not exist.
pub async fn register(
    state: &AppState,
    email: &str,
    name: &str,
    password: &str,
    referral_code: Option<&str>,
) -> Result<User, LedgerError> {
    register_at(state, email, name, password, referral_code, Utc::now()).await
}

pub(crate) async fn register_at(
    state: &AppState,
    email: &str,
    name: &str,
    password: &str,
    referral_code: Option<&str>,
    now: DateTime<Utc>,
) -> Result<User, LedgerError> {
    let email = normalize_email(email).ok_or_else(|| LedgerError::InvalidInput("invalid email".into()))?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(LedgerError::InvalidInput(format!("password must be at least {MIN_PASSWORD_LEN} characters")));
    }
    let referral_code = referral_code
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty());

    let password_hash = hash_password_blocking(password.to_owned()).await?;

    let mut ledger = state.ledger.write().await;
    if ledger.user_id_by_email(&email).is_some() {
        return Err(LedgerError::EmailTaken);
    }
    let referred_by = match referral_code.as_deref() {
        Some(code) => Some(ledger.user_id_by_referral(code).ok_or(LedgerError::RecipientNotFound)?),
        None => None,
    };

    let code = loop {
        let candidate = random_code(REFERRAL_CODE_LEN);
        if ledger.user_id_by_referral(&candidate).is_none() {
            break candidate;
        }
    };

    let mut user = User::new(email.clone(), normalize_name(name, &email), password_hash, code, now);
    user.referred_by = referred_by;
    if state.config.admin_emails.contains(&email) {
        user.role = Role::Admin;
    }
    let result = user.clone();
    ledger.insert_user(user);

    info!(user_id = %result.id, role = result.role.as_str(), referred = referred_by.is_some(), "user registered");
    Ok(result)
}

/// Check credentials and return the account.
///
/// # Errors
///
/// `InvalidCredentials` for unknown emails or wrong passwords,
/// `AccountBanned` for banned accounts.
pub async fn authenticate(state: &AppState, email: &str, password: &str) -> Result<User, LedgerError> {
    let email = normalize_email(email).ok_or(LedgerError::InvalidCredentials)?;
    let user = {
        let ledger = state.ledger.read().await;
        let id = ledger.user_id_by_email(&email).ok_or(LedgerError::InvalidCredentials)?;
        ledger.user(id)?.clone()
    };

    let stored = user.password_hash.clone();
    let password = password.to_owned();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| LedgerError::PasswordHash(e.to_string()))?;
    if !valid {
        warn!(user_id = %user.id, "login failed: bad password");
        return Err(LedgerError::InvalidCredentials);
    }
    if user.is_banned {
        warn!(user_id = %user.id, "login refused: account banned");
        return Err(LedgerError::AccountBanned);
    }
    Ok(user)
}

/// # Errors
///
/// Returns `UserNotFound` for unknown ids.
pub async fn get_user(state: &AppState, user_id: Uuid) -> Result<User, LedgerError> {
    state.ledger.read().await.user(user_id).cloned()
}

// =============================================================================
// ADMIN CONTROLS
// =============================================================================

/// Account changes an admin may make in one request. `None` leaves a field
/// unchanged.
#[derive(Debug, Clone, Copy, Default, serde::Deserialize)]
pub struct UserUpdate {
    pub frozen: Option<bool>,
    pub banned: Option<bool>,
    pub fee_exempt: Option<bool>,
    pub role: Option<Role>,
}

/// Apply flag and role changes together. Every check runs before anything
/// is written, so a refused update leaves the account untouched.
///
/// # Errors
///
/// `Forbidden` unless the caller is an admin; `InvalidState` when an admin
/// tries to ban, freeze, or demote themselves.
pub async fn update_user(state: &AppState, admin_id: Uuid, user_id: Uuid, update: UserUpdate) -> Result<User, LedgerError> {
    let mut ledger = state.ledger.write().await;
    ensure_admin(&ledger, admin_id)?;
    ledger.user(user_id)?;
    if admin_id == user_id {
        if update.banned == Some(true) || update.frozen == Some(true) {
            return Err(LedgerError::InvalidState("admins cannot restrict their own account".into()));
        }
        if update.role.is_some_and(|role| role != Role::Admin) {
            return Err(LedgerError::InvalidState("admins cannot demote themselves".into()));
        }
    }

    let user = ledger.user_mut(user_id)?;
    if let Some(frozen) = update.frozen {
        user.is_frozen = frozen;
    }
    if let Some(banned) = update.banned {
        user.is_banned = banned;
    }
    if let Some(exempt) = update.fee_exempt {
        user.is_fee_exempt = exempt;
    }
    if let Some(role) = update.role {
        user.role = role;
    }
    info!(
        %admin_id, %user_id,
        frozen = user.is_frozen, banned = user.is_banned, fee_exempt = user.is_fee_exempt, role = user.role.as_str(),
        "account updated"
    );
    Ok(user.clone())
}

/// Credit or debit a user's balance by hand, recording an `adjustment`.
///
/// # Errors
///
/// `InvalidAmount` for zero or anything past `MAX_AMOUNT`, `InvalidInput` for an empty reason, and
/// `InsufficientFunds` when a debit would take the balance negative.
pub async fn adjust_balance(
    state: &AppState,
    admin_id: Uuid,
    user_id: Uuid,
    amount: Decimal,
    reason: &str,
) -> Result<Transaction, LedgerError> {
    adjust_balance_at(state, admin_id, user_id, amount, reason, Utc::now()).await
}

pub(crate) async fn adjust_balance_at(
    state: &AppState,
    admin_id: Uuid,
    user_id: Uuid,
    amount: Decimal,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<Transaction, LedgerError> {
    let amount = round_money(amount);
    if amount.is_zero() || amount.abs() > MAX_AMOUNT {
        return Err(LedgerError::InvalidAmount(amount));
    }
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(LedgerError::InvalidInput("adjustment reason is required".into()));
    }

    let mut ledger = state.ledger.write().await;
    ensure_admin(&ledger, admin_id)?;
    let user = ledger.user(user_id)?;
    if user.balance + amount < Decimal::ZERO {
        return Err(LedgerError::InsufficientFunds { needed: -amount, available: user.balance });
    }

    ledger.user_mut(user_id)?.balance += amount;
    let tx = Transaction::new(user_id, TransactionType::Adjustment, amount, TransactionStatus::Completed, now)
        .with_description(reason);
    let result = tx.clone();
    ledger.record(tx);

    info!(%admin_id, %user_id, tx_id = %result.id, amount = %amount, "balance adjusted");
    Ok(result)
}

/// Every account, oldest first.
///
/// # Errors
///
/// `Forbidden` unless the caller is an admin.
pub async fn list_users(state: &AppState, admin_id: Uuid) -> Result<Vec<User>, LedgerError> {
    let ledger = state.ledger.read().await;
    ensure_admin(&ledger, admin_id)?;
    let mut users: Vec<User> = ledger.users.values().cloned().collect();
    users.sort_by_key(|u| u.created_at);
    Ok(users)
}

#[cfg(test)]
#[path = "account_test.rs"]
mod tests;
