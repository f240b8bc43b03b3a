//! Ledger error taxonomy.
//!
//! DESIGN
//! ======
//! Every service returns `LedgerError`. Each variant carries a stable,
//! grepable `E_*` code that the HTTP layer exposes alongside the message;
//! the status mapping lives in `routes`.

use rust_decimal::Decimal;
use uuid::Uuid;

/// Stable machine-readable error codes.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("user not found: {0}")]
    UserNotFound(Uuid),
    #[error("recipient not found")]
    RecipientNotFound,
    #[error("transaction not found: {0}")]
    TransactionNotFound(Uuid),
    #[error("voucher not found")]
    VoucherNotFound,
    #[error("withdrawal request not found: {0}")]
    IntentNotFound(Uuid),
    #[error("copy position not found: {0}")]
    PositionNotFound(Uuid),
    #[error("unknown investment plan: {0}")]
    PlanNotFound(String),
    #[error("unknown trader: {0}")]
    TraderNotFound(String),
    #[error("admin role required")]
    Forbidden,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("email already registered")]
    EmailTaken,
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("amount {amount} is below the minimum of {minimum}")]
    BelowMinimum { amount: Decimal, minimum: Decimal },
    #[error("insufficient funds: need {needed}, available {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },
    #[error("account is frozen")]
    AccountFrozen,
    #[error("account is banned")]
    AccountBanned,
    #[error("identity verification required")]
    KycRequired,
    #[error("an open {0} request already exists")]
    PendingRequestExists(&'static str),
    #[error("another plan is already active: {0}")]
    PlanAlreadyActive(String),
    #[error("confirmation available in {remaining_secs}s")]
    CooldownActive { remaining_secs: i64 },
    #[error("withdrawal request expired")]
    IntentExpired,
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("voucher is not redeemable")]
    VoucherUnavailable,
    #[error("transaction already has a dispute")]
    DisputeExists,
    #[error("transaction has no dispute")]
    NoDispute,
    #[error("nothing to claim")]
    NothingToClaim,
    #[error("too many requests: {0}")]
    RateLimited(String),
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl ErrorCode for LedgerError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::UserNotFound(_) => "E_USER_NOT_FOUND",
            Self::RecipientNotFound => "E_RECIPIENT_NOT_FOUND",
            Self::TransactionNotFound(_) => "E_TRANSACTION_NOT_FOUND",
            Self::VoucherNotFound => "E_VOUCHER_NOT_FOUND",
            Self::IntentNotFound(_) => "E_WITHDRAWAL_NOT_FOUND",
            Self::PositionNotFound(_) => "E_POSITION_NOT_FOUND",
            Self::PlanNotFound(_) => "E_PLAN_NOT_FOUND",
            Self::TraderNotFound(_) => "E_TRADER_NOT_FOUND",
            Self::Forbidden => "E_FORBIDDEN",
            Self::InvalidCredentials => "E_INVALID_CREDENTIALS",
            Self::EmailTaken => "E_EMAIL_TAKEN",
            Self::InvalidAmount(_) => "E_INVALID_AMOUNT",
            Self::InvalidInput(_) => "E_INVALID_INPUT",
            Self::BelowMinimum { .. } => "E_BELOW_MINIMUM",
            Self::InsufficientFunds { .. } => "E_INSUFFICIENT_FUNDS",
            Self::AccountFrozen => "E_ACCOUNT_FROZEN",
            Self::AccountBanned => "E_ACCOUNT_BANNED",
            Self::KycRequired => "E_KYC_REQUIRED",
            Self::PendingRequestExists(_) => "E_PENDING_REQUEST_EXISTS",
            Self::PlanAlreadyActive(_) => "E_PLAN_ALREADY_ACTIVE",
            Self::CooldownActive { .. } => "E_COOLDOWN_ACTIVE",
            Self::IntentExpired => "E_WITHDRAWAL_EXPIRED",
            Self::InvalidState(_) => "E_INVALID_STATE",
            Self::VoucherUnavailable => "E_VOUCHER_UNAVAILABLE",
            Self::DisputeExists => "E_DISPUTE_EXISTS",
            Self::NoDispute => "E_NO_DISPUTE",
            Self::NothingToClaim => "E_NOTHING_TO_CLAIM",
            Self::RateLimited(_) => "E_RATE_LIMITED",
            Self::PasswordHash(_) => "E_INTERNAL",
            Self::Database(_) => "E_DATABASE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::CooldownActive { .. } | Self::RateLimited(_) | Self::Database(_))
    }
}
