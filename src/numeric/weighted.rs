// ============================================================================
// Volume-Weighted Accumulator
// ============================================================================

use super::errors::{NumericError, NumericResult};
use super::{Price, Quantity};
use rust_decimal::Decimal;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Running Σ(price × quantity) and Σ(quantity).
///
/// Keeping the notional instead of a running average means the average is
/// recomputed from exact sums after every fill, so no rounding error
/// accumulates across partial fills.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VolumeWeighted {
    notional: Decimal,
    volume: Quantity,
}

impl VolumeWeighted {
    pub const fn new() -> Self {
        Self {
            notional: Decimal::ZERO,
            volume: Decimal::ZERO,
        }
    }

    /// Add one fill.
    pub fn add(&mut self, price: Price, quantity: Quantity) -> NumericResult<()> {
        let fill_notional = price.checked_mul(quantity).ok_or(NumericError::Overflow)?;
        let notional = self
            .notional
            .checked_add(fill_notional)
            .ok_or(NumericError::Overflow)?;
        let volume = self
            .volume
            .checked_add(quantity)
            .ok_or(NumericError::Overflow)?;

        self.notional = notional;
        self.volume = volume;
        Ok(())
    }

    /// Volume-weighted average price, `None` when nothing was added.
    pub fn average(&self) -> Option<Price> {
        if self.volume.is_zero() {
            return None;
        }
        self.notional.checked_div(self.volume)
    }

    pub fn notional(&self) -> Decimal {
        self.notional
    }

    pub fn volume(&self) -> Quantity {
        self.volume
    }

    pub fn is_empty(&self) -> bool {
        self.volume.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_average_is_undefined() {
        assert_eq!(VolumeWeighted::new().average(), None);
    }

    #[test]
    fn test_average_of_two_fills() {
        let mut acc = VolumeWeighted::new();
        acc.add(Decimal::from(99), Decimal::from(5)).unwrap();
        acc.add(Decimal::from(101), Decimal::from(5)).unwrap();
        assert_eq!(acc.average(), Some(Decimal::from(100)));
        assert_eq!(acc.volume(), Decimal::from(10));
        assert_eq!(acc.notional(), Decimal::from(1000));
    }

    #[test]
    fn test_uneven_fills_are_weighted_by_volume() {
        // (1 * 100 + 2 * 103) / 3 = 102
        let mut acc = VolumeWeighted::new();
        acc.add(Decimal::from(100), Decimal::ONE).unwrap();
        acc.add(Decimal::from(103), Decimal::from(2)).unwrap();
        assert_eq!(acc.average(), Some(Decimal::from(102)));
    }

    #[test]
    fn test_overflow_leaves_state_untouched() {
        let mut acc = VolumeWeighted::new();
        acc.add(Decimal::from(10), Decimal::ONE).unwrap();
        assert_eq!(
            acc.add(Decimal::MAX, Decimal::from(2)),
            Err(NumericError::Overflow)
        );
        assert_eq!(acc.volume(), Decimal::ONE);
    }
}
