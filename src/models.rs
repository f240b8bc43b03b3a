//! Ledger records: users, transactions, vouchers, copy positions, and
//! withdrawal intents.
//!
//! Enum variants round-trip to the text columns in Postgres through
//! `as_str` / `parse`, and to JSON through serde.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }

            #[must_use]
            pub fn parse(raw: &str) -> Option<Self> {
                match raw {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

// =============================================================================
// USER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

text_enum!(Role { User => "user", Admin => "admin" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KycStatus {
    Unverified,
    Pending,
    Verified,
    Rejected,
}

text_enum!(KycStatus {
    Unverified => "unverified",
    Pending => "pending",
    Verified => "verified",
    Rejected => "rejected",
});

/// Identity documents submitted for review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KycSubmission {
    pub full_name: String,
    pub document_type: String,
    pub document_number: String,
    pub submitted_at: DateTime<Utc>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: Role,
    pub kyc_status: KycStatus,
    pub kyc: Option<KycSubmission>,
    pub balance: Decimal,
    pub on_hold_balance: Decimal,
    pub invested: Decimal,
    pub unclaimed_profit: Decimal,
    pub active_plan_id: Option<String>,
    pub plan_started_at: Option<DateTime<Utc>>,
    pub last_accrual_at: Option<DateTime<Utc>>,
    pub is_frozen: bool,
    pub is_banned: bool,
    pub is_fee_exempt: bool,
    pub referral_code: String,
    pub referred_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub version: i32,
}

impl User {
    #[must_use]
    pub fn new(email: String, name: String, password_hash: String, referral_code: String, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            name,
            password_hash,
            role: Role::User,
            kyc_status: KycStatus::Unverified,
            kyc: None,
            balance: Decimal::ZERO,
            on_hold_balance: Decimal::ZERO,
            invested: Decimal::ZERO,
            unclaimed_profit: Decimal::ZERO,
            active_plan_id: None,
            plan_started_at: None,
            last_accrual_at: None,
            is_frozen: false,
            is_banned: false,
            is_fee_exempt: false,
            referral_code,
            referred_by: None,
            created_at: now,
            version: 1,
        }
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// =============================================================================
// TRANSACTION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
    Investment,
    InvestmentWithdrawal,
    Profit,
    Fee,
    Adjustment,
    Voucher,
    Referral,
    Refund,
    CopyTrade,
}

text_enum!(TransactionType {
    Deposit => "deposit",
    Withdrawal => "withdrawal",
    Transfer => "transfer",
    Investment => "investment",
    InvestmentWithdrawal => "investment_withdrawal",
    Profit => "profit",
    Fee => "fee",
    Adjustment => "adjustment",
    Voucher => "voucher",
    Referral => "referral",
    Refund => "refund",
    CopyTrade => "copy_trade",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    Completed,
    #[serde(rename = "Awaiting Confirmation")]
    AwaitingConfirmation,
    Rejected,
    Cancelled,
}

text_enum!(TransactionStatus {
    Completed => "Completed",
    AwaitingConfirmation => "Awaiting Confirmation",
    Rejected => "Rejected",
    Cancelled => "Cancelled",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    UnderReview,
    Resolved,
    Rejected,
}

impl DisputeStatus {
    /// Disputes still awaiting an admin outcome.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Open | Self::UnderReview)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dispute {
    pub status: DisputeStatus,
    pub reason: String,
    pub details: String,
    pub opened_at: DateTime<Utc>,
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalMethod {
    Bank,
    Crypto,
    Card,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalDetails {
    pub method: WithdrawalMethod,
    pub destination: String,
    #[serde(default)]
    pub fee: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub user_id: Uuid,
    pub recipient_id: Option<Uuid>,
    /// Signed: credits are positive, debits negative.
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub description: Option<String>,
    pub dispute: Option<Dispute>,
    pub withdrawal_details: Option<WithdrawalDetails>,
    pub original_amount: Option<Decimal>,
    pub original_currency: Option<String>,
    /// Links a fee or refund to the transaction that caused it.
    pub related_id: Option<Uuid>,
    pub version: i32,
    /// Ledger insertion order; breaks ties between records sharing a `date`.
    #[serde(skip)]
    pub seq: i64,
}

impl Transaction {
    #[must_use]
    pub fn new(
        user_id: Uuid,
        tx_type: TransactionType,
        amount: Decimal,
        status: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            date: now,
            user_id,
            recipient_id: None,
            amount,
            tx_type,
            status,
            description: None,
            dispute: None,
            withdrawal_details: None,
            original_amount: None,
            original_currency: None,
            related_id: None,
            version: 1,
            seq: 0,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_recipient(mut self, recipient_id: Uuid) -> Self {
        self.recipient_id = Some(recipient_id);
        self
    }

    #[must_use]
    pub fn with_related(mut self, related_id: Uuid) -> Self {
        self.related_id = Some(related_id);
        self
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::AwaitingConfirmation
    }
}

// =============================================================================
// VOUCHER
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoucherStatus {
    Active,
    Redeemed,
    Cancelled,
}

text_enum!(VoucherStatus { Active => "active", Redeemed => "redeemed", Cancelled => "cancelled" });

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voucher {
    pub code: String,
    pub amount: Decimal,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: VoucherStatus,
    pub redeemed_by: Option<Uuid>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub version: i32,
}

// =============================================================================
// COPY TRADING
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    Closed,
}

text_enum!(PositionStatus { Open => "open", Closed => "closed" });

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyPosition {
    pub id: Uuid,
    pub user_id: Uuid,
    pub trader_id: String,
    pub allocated: Decimal,
    pub pnl: Decimal,
    pub opened_at: DateTime<Utc>,
    pub last_accrual_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub status: PositionStatus,
    pub version: i32,
}

// =============================================================================
// WITHDRAWAL INTENT
// =============================================================================

/// The confirm step of a withdrawal. Lives only in memory: an intent that
/// is never confirmed has not moved any money.
#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalIntent {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub fee: Decimal,
    pub total: Decimal,
    pub details: WithdrawalDetails,
    pub created_at: DateTime<Utc>,
    pub confirm_after: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
#[path = "models_test.rs"]
mod tests;
