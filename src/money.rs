//! Money arithmetic: rounding, fee computation, and amount validation.
//!
//! DESIGN
//! ======
//! All amounts are `Decimal` in the platform currency with two fractional
//! digits. Rounding is midpoint-away-from-zero so that a fee of half a cent
//! is always charged rather than alternating the way banker's rounding does.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

use crate::error::LedgerError;

/// Number of fractional digits carried by every stored amount.
pub const MONEY_SCALE: u32 = 2;

/// Largest amount a single request may move. Balances are stored as
/// `NUMERIC(20,2)`, so this leaves room for many maximal credits.
pub const MAX_AMOUNT: Decimal = dec!(1000000000000);

/// Divisor that turns basis points into a fraction.
const BPS_DENOMINATOR: i64 = 10_000;

/// Round to cents, midpoint away from zero.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Fee charged on `amount` at `bps` basis points. Exempt accounts pay nothing.
///
/// # Errors
///
/// `InvalidAmount` when the product does not fit a `Decimal`.
pub fn fee_for(amount: Decimal, bps: u32, exempt: bool) -> Result<Decimal, LedgerError> {
    if exempt || bps == 0 {
        return Ok(Decimal::ZERO);
    }
    amount
        .checked_mul(Decimal::from(bps))
        .and_then(|scaled| scaled.checked_div(Decimal::from(BPS_DENOMINATOR)))
        .map(round_money)
        .ok_or(LedgerError::InvalidAmount(amount))
}

/// Share of `amount` at `bps` basis points, rounded to cents.
///
/// # Errors
///
/// `InvalidAmount` on overflow.
pub fn bps_share(amount: Decimal, bps: u32) -> Result<Decimal, LedgerError> {
    fee_for(amount, bps, false)
}

/// Simple daily accrual: `principal * rate * days`, rounded to cents.
///
/// # Errors
///
/// `InvalidAmount` when the product does not fit a `Decimal`.
pub fn accrual(principal: Decimal, daily_rate: Decimal, days: i64) -> Result<Decimal, LedgerError> {
    if days <= 0 {
        return Ok(Decimal::ZERO);
    }
    principal
        .checked_mul(daily_rate)
        .and_then(|daily| daily.checked_mul(Decimal::from(days)))
        .map(round_money)
        .ok_or(LedgerError::InvalidAmount(principal))
}

/// Normalize a user-supplied amount and reject anything that is not a
/// positive number of cents no larger than [`MAX_AMOUNT`].
///
/// # Errors
///
/// Returns `InvalidAmount` when the rounded amount is zero, negative, or
/// above the ceiling.
pub fn validate_amount(amount: Decimal) -> Result<Decimal, LedgerError> {
    let rounded = round_money(amount);
    if rounded <= Decimal::ZERO || rounded > MAX_AMOUNT {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(rounded)
}

#[cfg(test)]
#[path = "money_test.rs"]
mod tests;
