// ============================================================================
// Order Book Domain Model
// ============================================================================

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use super::order::OrderError;
use super::{AssetId, Order, OrderId, OrderStatus, Side};
use crate::numeric::{self, NumericError, NumericResult, Price, Quantity};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookError {
    #[error("order {0} is not resting in the book")]
    NotFound(OrderId),

    #[error("order {0} is already resting in the book")]
    Duplicate(OrderId),

    #[error("order {id} cannot rest: {reason}")]
    NotRestable { id: OrderId, reason: &'static str },

    #[error("order {order_id} belongs to asset {order_asset}, book is {book_asset}")]
    WrongAsset {
        order_id: OrderId,
        order_asset: AssetId,
        book_asset: AssetId,
    },

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Numeric(#[from] NumericError),
}

// ============================================================================
// Order Book Level
// ============================================================================

/// FIFO queue of resting orders at one price
#[derive(Debug, Clone)]
pub struct PriceLevel {
    price: Price,
    orders: VecDeque<OrderId>,
    /// Sum of the remaining quantities of the queued orders
    total_quantity: Quantity,
}

impl PriceLevel {
    fn new(price: Price) -> Self {
        Self {
            price,
            orders: VecDeque::new(),
            total_quantity: Decimal::ZERO,
        }
    }

    pub fn price(&self) -> Price {
        self.price
    }

    pub fn total_quantity(&self) -> Quantity {
        self.total_quantity
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Order with time priority at this price
    pub fn front(&self) -> Option<OrderId> {
        self.orders.front().copied()
    }

    pub fn order_ids(&self) -> impl Iterator<Item = &OrderId> {
        self.orders.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    fn to_depth(&self) -> DepthLevel {
        DepthLevel {
            price: self.price,
            quantity: self.total_quantity,
            order_count: self.orders.len(),
        }
    }
}

// ============================================================================
// Order Book Side
// ============================================================================

/// One side of the book. Levels are keyed by price; bids are walked from the
/// highest key, asks from the lowest.
#[derive(Debug, Clone)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Price, PriceLevel>,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Levels ordered from the touch outwards
    pub fn levels(&self) -> Box<dyn Iterator<Item = &PriceLevel> + '_> {
        match self.side {
            Side::Buy => Box::new(self.levels.values().rev()),
            Side::Sell => Box::new(self.levels.values()),
        }
    }

    /// Get the best (top-of-book) level
    pub fn best_level(&self) -> Option<&PriceLevel> {
        self.levels().next()
    }

    pub fn best_price(&self) -> Option<Price> {
        self.best_level().map(PriceLevel::price)
    }

    /// Get depth at N levels
    pub fn depth(&self, num_levels: usize) -> Vec<DepthLevel> {
        self.levels()
            .take(num_levels)
            .map(PriceLevel::to_depth)
            .collect()
    }

    pub fn total_quantity(&self) -> Quantity {
        self.levels.values().map(PriceLevel::total_quantity).sum()
    }

    pub fn order_count(&self) -> usize {
        self.levels.values().map(PriceLevel::order_count).sum()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    fn push(&mut self, price: Price, id: OrderId, quantity: Quantity) -> NumericResult<()> {
        let level = self
            .levels
            .entry(price)
            .or_insert_with(|| PriceLevel::new(price));
        let total = level
            .total_quantity
            .checked_add(quantity)
            .ok_or(NumericError::Overflow);
        match total {
            Ok(total) => {
                level.orders.push_back(id);
                level.total_quantity = total;
                Ok(())
            },
            Err(err) => {
                if level.orders.is_empty() {
                    self.levels.remove(&price);
                }
                Err(err)
            },
        }
    }

    fn reduce(&mut self, price: Price, quantity: Quantity) {
        if let Some(level) = self.levels.get_mut(&price) {
            level.total_quantity -= quantity;
        }
    }

    /// Unlink an order from its level, dropping the level once empty
    fn unlink(&mut self, price: Price, id: OrderId, remaining: Quantity) {
        let Some(level) = self.levels.get_mut(&price) else {
            return;
        };
        if let Some(position) = level.orders.iter().position(|queued| *queued == id) {
            level.orders.remove(position);
            level.total_quantity -= remaining;
        }
        if level.orders.is_empty() {
            self.levels.remove(&price);
        }
    }
}

// ============================================================================
// Book Projections
// ============================================================================

/// Aggregated resting interest at one price
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DepthLevel {
    pub price: Price,
    pub quantity: Quantity,
    pub order_count: usize,
}

/// Best price level of one side together with its front order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BestLevel {
    pub price: Price,
    pub quantity: Quantity,
    pub order_count: usize,
    pub front_order_id: OrderId,
}

/// Order counts and aggregate resting volume for both sides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BookSummary {
    pub asset_id: AssetId,
    pub bid_orders: usize,
    pub ask_orders: usize,
    pub bid_levels: usize,
    pub ask_levels: usize,
    pub bid_volume: Quantity,
    pub ask_volume: Quantity,
}

impl BookSummary {
    pub fn total_orders(&self) -> usize {
        self.bid_orders + self.ask_orders
    }

    pub fn total_volume(&self) -> Quantity {
        self.bid_volume + self.ask_volume
    }
}

/// Walk of the opposite side for a hypothetical taker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillEstimate {
    /// Notional of the part the book can fill
    pub cost: Decimal,
    /// Quantity the book cannot fill
    pub unfilled: Quantity,
}

/// Immutable view of the order book state
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderBookView {
    pub asset_id: AssetId,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    /// Current spread (ask - bid)
    pub spread: Option<Price>,
    pub mid_price: Option<Price>,
}

impl OrderBookView {
    pub fn with_depth(asset_id: AssetId, bids: Vec<DepthLevel>, asks: Vec<DepthLevel>) -> Self {
        let (spread, mid_price) = match (bids.first(), asks.first()) {
            (Some(bid), Some(ask)) => (
                Some(ask.price - bid.price),
                Some((bid.price + ask.price) / Decimal::TWO),
            ),
            _ => (None, None),
        };

        Self {
            asset_id,
            bids,
            asks,
            spread,
            mid_price,
        }
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|level| level.price)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|level| level.price)
    }

    pub fn total_bid_quantity(&self) -> Quantity {
        self.bids.iter().map(|level| level.quantity).sum()
    }

    pub fn total_ask_quantity(&self) -> Quantity {
        self.asks.iter().map(|level| level.quantity).sum()
    }
}

// ============================================================================
// Order Book
// ============================================================================

/// Resting orders of one asset under price-time priority.
///
/// The book owns the live order records; levels only hold ids in arrival
/// order, so a partial fill mutates the record without touching the queue.
#[derive(Debug, Clone)]
pub struct OrderBook {
    asset_id: AssetId,
    bids: BookSide,
    asks: BookSide,
    orders: HashMap<OrderId, Order>,
}

impl OrderBook {
    pub fn new(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            bids: BookSide::new(Side::Buy),
            asks: BookSide::new(Side::Sell),
            orders: HashMap::new(),
        }
    }

    pub fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn contains(&self, id: OrderId) -> bool {
        self.orders.contains_key(&id)
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Add a live limit order at the back of its price level
    pub fn insert(&mut self, order: Order) -> Result<(), BookError> {
        if order.asset_id != self.asset_id {
            return Err(BookError::WrongAsset {
                order_id: order.id,
                order_asset: order.asset_id,
                book_asset: self.asset_id,
            });
        }
        if self.orders.contains_key(&order.id) {
            return Err(BookError::Duplicate(order.id));
        }
        if !matches!(
            order.status(),
            OrderStatus::Open | OrderStatus::PartiallyFilled
        ) {
            return Err(BookError::NotRestable {
                id: order.id,
                reason: "order is not live",
            });
        }
        let price = match order.limit_price() {
            Some(price) if order.rests_in_book() => price,
            _ => {
                return Err(BookError::NotRestable {
                    id: order.id,
                    reason: "order type never rests",
                })
            },
        };

        let side = order.side;
        let id = order.id;
        let remaining = order.remaining_quantity();
        self.side_mut(side).push(price, id, remaining)?;
        self.orders.insert(id, order);
        Ok(())
    }

    /// Take a resting order out of the book
    pub fn remove(&mut self, id: OrderId) -> Result<Order, BookError> {
        let order = self.orders.remove(&id).ok_or(BookError::NotFound(id))?;
        if let Some(price) = order.limit_price() {
            let remaining = order.remaining_quantity();
            self.side_mut(order.side).unlink(price, id, remaining);
        }
        Ok(order)
    }

    /// Apply a fill to a resting order in place.
    ///
    /// The order keeps its queue position while partially filled and leaves
    /// the book once executed. Returns the updated record.
    pub fn fill_resting(
        &mut self,
        id: OrderId,
        quantity: Quantity,
        price: Price,
        at: DateTime<Utc>,
    ) -> Result<Order, BookError> {
        let (side, level_price, updated) = {
            let order = self.orders.get_mut(&id).ok_or(BookError::NotFound(id))?;
            let level_price = order.limit_price().ok_or(BookError::NotRestable {
                id,
                reason: "resting order has no limit price",
            })?;
            order.apply_fill(quantity, price, at)?;
            (order.side, level_price, order.clone())
        };

        let book_side = self.side_mut(side);
        book_side.reduce(level_price, quantity);
        if updated.status() == OrderStatus::Executed {
            book_side.unlink(level_price, id, Decimal::ZERO);
            self.orders.remove(&id);
        }
        Ok(updated)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn best_bid(&self) -> Option<BestLevel> {
        Self::best_of(&self.bids)
    }

    pub fn best_ask(&self) -> Option<BestLevel> {
        Self::best_of(&self.asks)
    }

    fn best_of(side: &BookSide) -> Option<BestLevel> {
        let level = side.best_level()?;
        Some(BestLevel {
            price: level.price,
            quantity: level.total_quantity,
            order_count: level.order_count(),
            front_order_id: level.front()?,
        })
    }

    /// Order with price-time priority on one side
    pub fn front_order(&self, side: Side) -> Option<&Order> {
        let id = self.side(side).best_level()?.front()?;
        self.orders.get(&id)
    }

    pub fn depth(&self, side: Side, levels: usize) -> Vec<DepthLevel> {
        self.side(side).depth(levels)
    }

    pub fn snapshot(&self) -> BookSummary {
        BookSummary {
            asset_id: self.asset_id,
            bid_orders: self.bids.order_count(),
            ask_orders: self.asks.order_count(),
            bid_levels: self.bids.level_count(),
            ask_levels: self.asks.level_count(),
            bid_volume: self.bids.total_quantity(),
            ask_volume: self.asks.total_quantity(),
        }
    }

    /// Depth view with spread and mid price
    pub fn view(&self, levels: usize) -> OrderBookView {
        OrderBookView::with_depth(
            self.asset_id,
            self.bids.depth(levels),
            self.asks.depth(levels),
        )
    }

    pub fn spread(&self) -> Option<Price> {
        Some(self.asks.best_price()? - self.bids.best_price()?)
    }

    /// Opposite-side quantity a taker on `taker_side` could trade at or
    /// better than `limit`. A `None` limit crosses every level.
    pub fn crossing_liquidity(&self, taker_side: Side, limit: Option<Price>) -> Quantity {
        self.side(taker_side.opposite())
            .levels()
            .take_while(|level| crosses(taker_side, limit, level.price))
            .map(PriceLevel::total_quantity)
            .sum()
    }

    /// Cost of taking `quantity` from the opposite side at resting prices
    pub fn cost_to_fill(&self, taker_side: Side, quantity: Quantity) -> NumericResult<FillEstimate> {
        let mut cost = Decimal::ZERO;
        let mut unfilled = quantity;

        for level in self.side(taker_side.opposite()).levels() {
            if unfilled <= Decimal::ZERO {
                break;
            }
            let take = unfilled.min(level.total_quantity);
            cost = cost
                .checked_add(numeric::notional(level.price, take)?)
                .ok_or(NumericError::Overflow)?;
            unfilled -= take;
        }

        Ok(FillEstimate { cost, unfilled })
    }

    /// Best bid at or above best ask
    pub fn is_crossed(&self) -> bool {
        match (self.bids.best_price(), self.asks.best_price()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }
}

/// Whether a taker with `limit` trades against a resting `price`
pub fn crosses(taker_side: Side, limit: Option<Price>, price: Price) -> bool {
    match (taker_side, limit) {
        (_, None) => true,
        (Side::Buy, Some(limit)) => limit >= price,
        (Side::Sell, Some(limit)) => limit <= price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixtures::{market, resting};
    use crate::domain::{OrderType, PortfolioId, TimeInForce};

    fn dec(value: i64) -> Decimal {
        Decimal::from(value)
    }

    #[test]
    fn test_best_prices_by_side() {
        let mut book = OrderBook::new(AssetId(1));
        book.insert(resting(Side::Buy, 99, 1, 1)).unwrap();
        book.insert(resting(Side::Buy, 100, 1, 2)).unwrap();
        book.insert(resting(Side::Sell, 102, 1, 3)).unwrap();
        book.insert(resting(Side::Sell, 101, 1, 4)).unwrap();

        // Best bid should be highest price, best ask the lowest
        assert_eq!(book.best_bid().unwrap().price, dec(100));
        assert_eq!(book.best_ask().unwrap().price, dec(101));
        assert_eq!(book.spread(), Some(dec(1)));
        assert!(!book.is_crossed());
    }

    #[test]
    fn test_time_priority_within_level() {
        let mut book = OrderBook::new(AssetId(1));
        let first = resting(Side::Sell, 100, 3, 1);
        let second = resting(Side::Sell, 100, 4, 2);
        let first_id = first.id;
        book.insert(first).unwrap();
        book.insert(second).unwrap();

        let best = book.best_ask().unwrap();
        assert_eq!(best.front_order_id, first_id);
        assert_eq!(best.quantity, dec(7));
        assert_eq!(best.order_count, 2);
    }

    #[test]
    fn test_partial_fill_keeps_queue_position() {
        let mut book = OrderBook::new(AssetId(1));
        let first = resting(Side::Sell, 100, 5, 1);
        let first_id = first.id;
        book.insert(first).unwrap();
        book.insert(resting(Side::Sell, 100, 5, 2)).unwrap();

        let updated = book
            .fill_resting(first_id, dec(2), dec(100), Utc::now())
            .unwrap();
        assert_eq!(updated.status(), OrderStatus::PartiallyFilled);
        assert_eq!(book.best_ask().unwrap().front_order_id, first_id);
        assert_eq!(book.best_ask().unwrap().quantity, dec(8));

        let updated = book
            .fill_resting(first_id, dec(3), dec(100), Utc::now())
            .unwrap();
        assert_eq!(updated.status(), OrderStatus::Executed);
        assert!(!book.contains(first_id));
        assert_eq!(book.best_ask().unwrap().quantity, dec(5));
    }

    #[test]
    fn test_remove_drops_empty_level() {
        let mut book = OrderBook::new(AssetId(1));
        let order = resting(Side::Buy, 100, 5, 1);
        let id = order.id;
        book.insert(order).unwrap();

        assert_eq!(book.remove(id).unwrap().id, id);
        assert!(book.best_bid().is_none());
        assert_eq!(book.remove(id), Err(BookError::NotFound(id)));
    }

    #[test]
    fn test_level_total_overflow_is_refused() {
        let huge = |sequence| {
            let mut order = Order::new(
                PortfolioId(1),
                AssetId(1),
                Side::Sell,
                OrderType::Limit { price: dec(100) },
                Decimal::MAX,
                TimeInForce::GoodTillCancel,
                Utc::now(),
            );
            order.accept(sequence).unwrap();
            order
        };
        let mut book = OrderBook::new(AssetId(1));
        let first = huge(1);
        let first_id = first.id;
        book.insert(first).unwrap();

        let second = huge(2);
        let second_id = second.id;
        assert_eq!(
            book.insert(second),
            Err(BookError::Numeric(NumericError::Overflow))
        );
        assert!(!book.contains(second_id));
        assert_eq!(book.best_ask().unwrap().front_order_id, first_id);
        assert_eq!(book.best_ask().unwrap().order_count, 1);
    }

    #[test]
    fn test_market_orders_never_rest() {
        let mut book = OrderBook::new(AssetId(1));
        let mut order = market(Side::Buy, 5);
        order.accept(1).unwrap();
        assert!(matches!(
            book.insert(order),
            Err(BookError::NotRestable { .. })
        ));
    }

    #[test]
    fn test_depth_and_snapshot() {
        let mut book = OrderBook::new(AssetId(1));
        book.insert(resting(Side::Buy, 100, 2, 1)).unwrap();
        book.insert(resting(Side::Buy, 100, 3, 2)).unwrap();
        book.insert(resting(Side::Buy, 98, 1, 3)).unwrap();
        book.insert(resting(Side::Sell, 103, 4, 4)).unwrap();

        let depth = book.depth(Side::Buy, 5);
        assert_eq!(
            depth,
            vec![
                DepthLevel {
                    price: dec(100),
                    quantity: dec(5),
                    order_count: 2
                },
                DepthLevel {
                    price: dec(98),
                    quantity: dec(1),
                    order_count: 1
                },
            ]
        );

        let summary = book.snapshot();
        assert_eq!(summary.total_orders(), 4);
        assert_eq!(summary.bid_volume, dec(6));
        assert_eq!(summary.ask_volume, dec(4));

        let view = book.view(1);
        assert_eq!(view.spread, Some(dec(3)));
        assert_eq!(view.mid_price, Some(Decimal::new(1015, 1)));
    }

    #[test]
    fn test_crossing_liquidity_and_cost() {
        let mut book = OrderBook::new(AssetId(1));
        book.insert(resting(Side::Sell, 100, 3, 1)).unwrap();
        book.insert(resting(Side::Sell, 101, 4, 2)).unwrap();
        book.insert(resting(Side::Sell, 105, 10, 3)).unwrap();

        assert_eq!(book.crossing_liquidity(Side::Buy, Some(dec(101))), dec(7));
        assert_eq!(book.crossing_liquidity(Side::Buy, None), dec(17));
        assert_eq!(book.crossing_liquidity(Side::Buy, Some(dec(99))), dec(0));

        let estimate = book.cost_to_fill(Side::Buy, dec(5)).unwrap();
        assert_eq!(estimate.cost, dec(300 + 202));
        assert_eq!(estimate.unfilled, dec(0));

        let estimate = book.cost_to_fill(Side::Buy, dec(20)).unwrap();
        assert_eq!(estimate.unfilled, dec(3));
    }
}
