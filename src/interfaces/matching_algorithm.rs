// ============================================================================
// Matching Algorithm Interface
// Defines the contract for pluggable matching algorithms
// ============================================================================

use chrono::{DateTime, Utc};
use smallvec::SmallVec;

use crate::domain::order_book::crosses;
use crate::domain::{Order, OrderBook};
use crate::error::EngineError;
use crate::numeric::{Price, Quantity};

/// One crossing between the incoming order and a resting order
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    /// Resting order as it stands after this fill
    pub maker: Order,
    pub quantity: Quantity,
    /// Always the maker's price
    pub price: Price,
}

/// Most incoming orders cross a handful of makers at most
pub type Fills = SmallVec<[Fill; 4]>;

/// Strategy pattern interface for matching algorithms
pub trait MatchingAlgorithm: Send + Sync {
    /// Cross an incoming order against the opposite side of the book.
    ///
    /// Mutates the incoming order and the resting orders it trades with.
    /// Never rests, cancels or rejects the remainder; that is the caller's
    /// decision.
    fn match_order(
        &self,
        incoming: &mut Order,
        book: &mut OrderBook,
        at: DateTime<Utc>,
    ) -> Result<Fills, EngineError>;

    /// Get the algorithm name for logging/metrics
    fn name(&self) -> &str;

    /// Whether the opposite side holds enough crossing quantity to fill the
    /// whole remainder (FOK pre-check)
    fn can_fill_completely(&self, incoming: &Order, book: &OrderBook) -> bool {
        book.crossing_liquidity(incoming.side, incoming.limit_price())
            >= incoming.remaining_quantity()
    }

    /// Optional: Check if two prices can cross
    /// Default implementation handles buy/sell logic; orders without a
    /// limit cross any price
    fn prices_cross(&self, incoming: &Order, book_price: Price) -> bool {
        crosses(incoming.side, incoming.limit_price(), book_price)
    }
}
