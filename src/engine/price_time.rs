// ============================================================================
// Price/Time Priority Matching Algorithm (FIFO)
// Most common in traditional exchanges (NASDAQ, NYSE, etc.)
// ============================================================================

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{Order, OrderBook};
use crate::error::EngineError;
use crate::interfaces::{Fill, Fills, MatchingAlgorithm};

/// Price/Time Priority (FIFO) matching algorithm
///
/// Orders at the same price level are matched in time priority order, and
/// every fill trades at the resting order's price.
///
/// # Example
/// ```text
/// Book:  100 @ 3 (Order A, seq=1)
///        100 @ 4 (Order B, seq=2)
///
/// Incoming: Buy 5 @ 100
/// Result: Match 3 with A, then 2 with B; B keeps its place with 2 left
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct PriceTimePriority;

impl PriceTimePriority {
    pub fn new() -> Self {
        Self
    }
}

impl MatchingAlgorithm for PriceTimePriority {
    fn match_order(
        &self,
        incoming: &mut Order,
        book: &mut OrderBook,
        at: DateTime<Utc>,
    ) -> Result<Fills, EngineError> {
        let mut fills = Fills::new();
        let opposite = incoming.side.opposite();

        while incoming.remaining_quantity() > Decimal::ZERO {
            let Some((maker_id, price, maker_remaining)) = book
                .front_order(opposite)
                .and_then(|maker| Some((maker.id, maker.limit_price()?, maker.remaining_quantity())))
            else {
                break;
            };

            if !self.prices_cross(incoming, price) {
                break;
            }

            let quantity = incoming.remaining_quantity().min(maker_remaining);
            let maker = book.fill_resting(maker_id, quantity, price, at)?;
            incoming.apply_fill(quantity, price, at)?;

            tracing::debug!(
                maker = %maker_id,
                taker = %incoming.id,
                %price,
                %quantity,
                "orders crossed"
            );
            fills.push(Fill {
                maker,
                quantity,
                price,
            });
        }

        Ok(fills)
    }

    fn name(&self) -> &str {
        "PriceTime"
    }
}
