//! Amounts are `Decimal` everywhere above the storage layer and `i64` minor units
//! (hundredths) in the database.

use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};

use crate::errors::{Error, Result};

pub const SCALE: u32 = 2;

pub fn from_minor(minor: i64) -> Decimal {
    Decimal::new(minor, SCALE)
}

/// Rejects amounts with more than two decimal places instead of silently rounding them.
pub fn to_minor(amount: Decimal) -> Result<i64> {
    let rounded = amount.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero);
    if rounded != amount {
        return Err(Error::Validation(format!(
            "Amount {} has more than {} decimal places",
            amount, SCALE
        )));
    }

    rounded
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|minor| minor.to_i64())
        .ok_or_else(|| Error::Validation(format!("Amount {} is out of range", amount)))
}
