// ============================================================================
// Numeric Module
// Decimal arithmetic for prices, quantities and volume-weighted averages
// ============================================================================
//
// This module provides:
// - Price/Quantity aliases over rust_decimal::Decimal (base-10 fixed point)
// - VolumeWeighted: running notional/volume accumulator for average prices
// - Increment checks for tick size and lot size
// - NumericError: error type for checked arithmetic
//
// Binary floating point never appears on a matching path.

mod errors;
mod weighted;

pub use errors::{NumericError, NumericResult};
pub use weighted::VolumeWeighted;

use rust_decimal::Decimal;

/// Price in quote currency units
pub type Price = Decimal;

/// Quantity in asset units
pub type Quantity = Decimal;

/// Returns true if `value` is an exact multiple of `increment`.
///
/// A non-positive increment never constrains the value.
pub fn is_multiple_of(value: Decimal, increment: Decimal) -> bool {
    if increment <= Decimal::ZERO {
        return true;
    }
    match value.checked_rem(increment) {
        Some(rem) => rem.is_zero(),
        None => false,
    }
}

/// Checked `price * quantity`.
pub fn notional(price: Price, quantity: Quantity) -> NumericResult<Decimal> {
    price.checked_mul(quantity).ok_or(NumericError::Overflow)
}
