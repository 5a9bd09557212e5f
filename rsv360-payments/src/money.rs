//! Major/minor currency unit conversion

use crate::error::{PaymentError, PaymentResult};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Decimal places of a minor unit (cents, centavos)
pub const MINOR_UNIT_SCALE: u32 = 2;

/// Convert a major-unit amount (e.g. `10.00`) into minor units (`1000`).
///
/// Amounts finer than one minor unit (`10.005`) are rejected rather than
/// rounded, so `from_minor(to_minor(x)?) == x` for every accepted `x`.
pub fn to_minor(amount: Decimal) -> PaymentResult<i64> {
    if amount.normalize().scale() > MINOR_UNIT_SCALE {
        return Err(PaymentError::InvalidRequest(format!(
            "amount {} has more than {} decimal places",
            amount, MINOR_UNIT_SCALE
        )));
    }

    let factor = Decimal::from(10i64.pow(MINOR_UNIT_SCALE));
    amount
        .checked_mul(factor)
        .and_then(|minor| minor.to_i64())
        .ok_or_else(|| PaymentError::InvalidRequest(format!("amount {} is out of range", amount)))
}

/// Convert a minor-unit amount (`1000`) back into major units (`10.00`).
pub fn from_minor(minor: i64) -> Decimal {
    Decimal::new(minor, MINOR_UNIT_SCALE)
}

/// Uppercase ISO currency code
pub fn normalize_currency(code: &str) -> String {
    code.trim().to_uppercase()
}
