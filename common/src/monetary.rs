//! Exact-decimal money helpers.
//!
//! Every amount in the ledger is a [`Decimal`]; nothing here ever goes
//! through a floating point value.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{LedgerError, Result};

/// Number of fractional digits kept for computed amounts.
pub const MONEY_SCALE: u32 = 2;

/// Divisor turning a percentage rate into a fraction.
const PERCENT: Decimal = Decimal::ONE_HUNDRED;

/// Parse an amount from its decimal string form.
///
/// Malformed input is reported as [`LedgerError::InvalidAmount`], the same
/// kind as a non-positive amount.
pub fn parse_amount(value: &str) -> Result<Decimal> {
    value
        .trim()
        .parse::<Decimal>()
        .map_err(|e| LedgerError::InvalidAmount(format!("'{value}' is not a decimal amount: {e}")))
}

/// Require an amount strictly greater than zero.
pub fn ensure_positive(amount: Decimal) -> Result<Decimal> {
    if amount > Decimal::ZERO {
        Ok(amount)
    } else {
        Err(LedgerError::InvalidAmount(format!(
            "amount must be positive, got {amount}"
        )))
    }
}

/// Round to [`MONEY_SCALE`] places, halves away from zero.
///
/// For the non-negative amounts the ledger deals in this is round-half-up.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// `base * rate_percent / 100`, rounded with [`round_money`].
pub fn percent_of(base: Decimal, rate_percent: Decimal) -> Decimal {
    round_money(base * rate_percent / PERCENT)
}
