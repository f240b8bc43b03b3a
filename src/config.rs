//! Runtime configuration parsed from environment variables.
//!
//! Every knob has a default; a present but unparsable value falls back to
//! the default rather than failing startup. Only `DATABASE_URL` is required,
//! and that is read in `main`.

use std::collections::HashSet;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_WITHDRAWAL_FEE_BPS: u32 = 550;
pub const DEFAULT_TRANSFER_FEE_BPS: u32 = 0;
pub const DEFAULT_REFERRAL_BONUS_BPS: u32 = 500;
pub const DEFAULT_MIN_WITHDRAWAL: Decimal = dec!(10);
pub const DEFAULT_MAX_PENDING_DEPOSITS: usize = 3;
pub const DEFAULT_WITHDRAWAL_COUNTDOWN_SECS: i64 = 10;
pub const DEFAULT_WITHDRAWAL_INTENT_TTL_SECS: i64 = 300;
pub const DEFAULT_DISPUTE_WINDOW_DAYS: i64 = 30;
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 168;
pub const DEFAULT_LEDGER_FLUSH_INTERVAL_MS: u64 = 200;
pub const DEFAULT_ACCRUAL_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: i64 = 86_400;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub withdrawal_fee_bps: u32,
    pub transfer_fee_bps: u32,
    pub referral_bonus_bps: u32,
    pub min_withdrawal: Decimal,
    pub max_pending_deposits: usize,
    pub withdrawal_countdown_secs: i64,
    pub withdrawal_intent_ttl_secs: i64,
    pub dispute_window_days: i64,
    pub session_ttl_hours: i64,
    pub ledger_flush_interval_ms: u64,
    pub accrual_interval_secs: u64,
    /// How long an `Idempotency-Key` replays its first response.
    pub idempotency_ttl_secs: i64,
    /// Lowercased emails that register with the admin role.
    pub admin_emails: HashSet<String>,
    pub cookie_secure: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            withdrawal_fee_bps: DEFAULT_WITHDRAWAL_FEE_BPS,
            transfer_fee_bps: DEFAULT_TRANSFER_FEE_BPS,
            referral_bonus_bps: DEFAULT_REFERRAL_BONUS_BPS,
            min_withdrawal: DEFAULT_MIN_WITHDRAWAL,
            max_pending_deposits: DEFAULT_MAX_PENDING_DEPOSITS,
            withdrawal_countdown_secs: DEFAULT_WITHDRAWAL_COUNTDOWN_SECS,
            withdrawal_intent_ttl_secs: DEFAULT_WITHDRAWAL_INTENT_TTL_SECS,
            dispute_window_days: DEFAULT_DISPUTE_WINDOW_DAYS,
            session_ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            ledger_flush_interval_ms: DEFAULT_LEDGER_FLUSH_INTERVAL_MS,
            accrual_interval_secs: DEFAULT_ACCRUAL_INTERVAL_SECS,
            idempotency_ttl_secs: DEFAULT_IDEMPOTENCY_TTL_SECS,
            admin_emails: HashSet::new(),
            cookie_secure: false,
        }
    }
}

impl AppConfig {
    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `PORT`: default 3000
    /// - `WITHDRAWAL_FEE_BPS`, `TRANSFER_FEE_BPS`, `REFERRAL_BONUS_BPS`
    /// - `MIN_WITHDRAWAL`: decimal, default 10
    /// - `MAX_PENDING_DEPOSITS`
    /// - `WITHDRAWAL_COUNTDOWN_SECS`, `WITHDRAWAL_INTENT_TTL_SECS`
    /// - `DISPUTE_WINDOW_DAYS`, `SESSION_TTL_HOURS`
    /// - `LEDGER_FLUSH_INTERVAL_MS`, `ACCRUAL_INTERVAL_SECS`
    /// - `IDEMPOTENCY_TTL_SECS`: default one day
    /// - `ADMIN_EMAILS`: comma separated
    /// - `COOKIE_SECURE`: boolean
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            withdrawal_fee_bps: env_parse("WITHDRAWAL_FEE_BPS", DEFAULT_WITHDRAWAL_FEE_BPS),
            transfer_fee_bps: env_parse("TRANSFER_FEE_BPS", DEFAULT_TRANSFER_FEE_BPS),
            referral_bonus_bps: env_parse("REFERRAL_BONUS_BPS", DEFAULT_REFERRAL_BONUS_BPS),
            min_withdrawal: env_parse("MIN_WITHDRAWAL", DEFAULT_MIN_WITHDRAWAL),
            max_pending_deposits: env_parse("MAX_PENDING_DEPOSITS", DEFAULT_MAX_PENDING_DEPOSITS),
            withdrawal_countdown_secs: env_parse("WITHDRAWAL_COUNTDOWN_SECS", DEFAULT_WITHDRAWAL_COUNTDOWN_SECS),
            withdrawal_intent_ttl_secs: env_parse("WITHDRAWAL_INTENT_TTL_SECS", DEFAULT_WITHDRAWAL_INTENT_TTL_SECS),
            dispute_window_days: env_parse("DISPUTE_WINDOW_DAYS", DEFAULT_DISPUTE_WINDOW_DAYS),
            session_ttl_hours: env_parse("SESSION_TTL_HOURS", DEFAULT_SESSION_TTL_HOURS),
            ledger_flush_interval_ms: env_parse("LEDGER_FLUSH_INTERVAL_MS", DEFAULT_LEDGER_FLUSH_INTERVAL_MS),
            accrual_interval_secs: env_parse("ACCRUAL_INTERVAL_SECS", DEFAULT_ACCRUAL_INTERVAL_SECS),
            idempotency_ttl_secs: env_parse("IDEMPOTENCY_TTL_SECS", DEFAULT_IDEMPOTENCY_TTL_SECS),
            admin_emails: parse_email_list(std::env::var("ADMIN_EMAILS").ok().as_deref()),
            cookie_secure: env_bool("COOKIE_SECURE").unwrap_or(false),
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

pub(crate) fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .and_then(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
}

fn parse_email_list(raw: Option<&str>) -> HashSet<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
