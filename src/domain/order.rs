// ============================================================================
// Order Domain Model
// ============================================================================

use super::{AssetId, OrderId, PortfolioId};
use crate::numeric::{NumericError, Price, Quantity, VolumeWeighted};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use state::{InvalidTransition, OrderStatus, OrderStatusTransition};

// ============================================================================
// Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat order type as it arrives on a request, before validation resolves it
/// into an [`OrderType`] carrying its prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
    StopLimit,
    TrailingStop,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::Market => "MARKET",
            OrderKind::Limit => "LIMIT",
            OrderKind::Stop => "STOP",
            OrderKind::StopLimit => "STOP_LIMIT",
            OrderKind::TrailingStop => "TRAILING_STOP",
        }
    }

    pub fn uses_price(&self) -> bool {
        matches!(self, OrderKind::Limit | OrderKind::StopLimit)
    }

    pub fn uses_stop_price(&self) -> bool {
        matches!(
            self,
            OrderKind::Stop | OrderKind::StopLimit | OrderKind::TrailingStop
        )
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type with the prices it needs to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrderType {
    Market,
    Limit { price: Price },
    Stop { stop_price: Price },
    StopLimit { price: Price, stop_price: Price },
    /// Stop that follows the last traded price at a fixed distance
    TrailingStop { stop_price: Price },
}

impl OrderType {
    pub fn kind(&self) -> OrderKind {
        match self {
            OrderType::Market => OrderKind::Market,
            OrderType::Limit { .. } => OrderKind::Limit,
            OrderType::Stop { .. } => OrderKind::Stop,
            OrderType::StopLimit { .. } => OrderKind::StopLimit,
            OrderType::TrailingStop { .. } => OrderKind::TrailingStop,
        }
    }

    /// Limit price, if the type carries one
    pub fn price(&self) -> Option<Price> {
        match self {
            OrderType::Limit { price } | OrderType::StopLimit { price, .. } => Some(*price),
            _ => None,
        }
    }

    pub fn stop_price(&self) -> Option<Price> {
        match self {
            OrderType::Stop { stop_price }
            | OrderType::StopLimit { stop_price, .. }
            | OrderType::TrailingStop { stop_price } => Some(*stop_price),
            _ => None,
        }
    }

    pub fn is_stop(&self) -> bool {
        self.kind().uses_stop_price()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TimeInForce {
    /// Rests until the end of the trading day it was created on
    #[cfg_attr(feature = "serde", serde(rename = "DAY"))]
    Day,
    /// Good Till Cancel - remains active until filled or cancelled
    #[cfg_attr(feature = "serde", serde(rename = "GTC"))]
    GoodTillCancel,
    /// Immediate Or Cancel - fill immediately or cancel remainder
    #[cfg_attr(feature = "serde", serde(rename = "IOC"))]
    ImmediateOrCancel,
    /// Fill Or Kill - fill entire order immediately or cancel all
    #[cfg_attr(feature = "serde", serde(rename = "FOK"))]
    FillOrKill,
}

impl TimeInForce {
    /// Whether an unfilled remainder may stay on the book
    pub fn can_rest(&self) -> bool {
        matches!(self, TimeInForce::Day | TimeInForce::GoodTillCancel)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Day => "DAY",
            TimeInForce::GoodTillCancel => "GTC",
            TimeInForce::ImmediateOrCancel => "IOC",
            TimeInForce::FillOrKill => "FOK",
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Order State Machine
// ============================================================================

pub mod state {
    use thiserror::Error;

    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    #[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
    pub enum OrderStatus {
        Pending,
        Open,
        PartiallyFilled,
        Executed,
        Cancelled,
        Rejected,
    }

    impl OrderStatus {
        pub fn is_terminal(&self) -> bool {
            matches!(
                self,
                OrderStatus::Executed | OrderStatus::Cancelled | OrderStatus::Rejected
            )
        }

        pub fn can_be_cancelled(&self) -> bool {
            matches!(self, OrderStatus::Open | OrderStatus::PartiallyFilled)
        }

        pub fn as_str(&self) -> &'static str {
            match self {
                OrderStatus::Pending => "PENDING",
                OrderStatus::Open => "OPEN",
                OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
                OrderStatus::Executed => "EXECUTED",
                OrderStatus::Cancelled => "CANCELLED",
                OrderStatus::Rejected => "REJECTED",
            }
        }
    }

    impl std::fmt::Display for OrderStatus {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.as_str())
        }
    }

    /// Valid state transitions for the order state machine
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum OrderStatusTransition {
        Accept,
        Reject,
        PartialFill,
        Fill,
        Cancel,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
    #[error("invalid transition from {from} via {via:?}")]
    pub struct InvalidTransition {
        pub from: OrderStatus,
        pub via: OrderStatusTransition,
    }

    impl OrderStatus {
        pub fn transition(
            &self,
            transition: OrderStatusTransition,
        ) -> Result<OrderStatus, InvalidTransition> {
            use OrderStatusTransition::*;

            match (self, transition) {
                (OrderStatus::Pending, Accept) => Ok(OrderStatus::Open),
                (OrderStatus::Pending, Reject) => Ok(OrderStatus::Rejected),

                (OrderStatus::Open, PartialFill) => Ok(OrderStatus::PartiallyFilled),
                (OrderStatus::Open, Fill) => Ok(OrderStatus::Executed),
                (OrderStatus::Open, Cancel) => Ok(OrderStatus::Cancelled),
                // market order that found no liquidity at all
                (OrderStatus::Open, Reject) => Ok(OrderStatus::Rejected),

                (OrderStatus::PartiallyFilled, PartialFill) => Ok(OrderStatus::PartiallyFilled),
                (OrderStatus::PartiallyFilled, Fill) => Ok(OrderStatus::Executed),
                (OrderStatus::PartiallyFilled, Cancel) => Ok(OrderStatus::Cancelled),

                _ => Err(InvalidTransition {
                    from: *self,
                    via: transition,
                }),
            }
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("fill quantity must be positive, got {0}")]
    NonPositiveFill(Quantity),

    #[error("fill of {requested} exceeds remaining quantity {remaining}")]
    Overfill {
        requested: Quantity,
        remaining: Quantity,
    },

    #[error(transparent)]
    Transition(#[from] InvalidTransition),

    #[error(transparent)]
    Numeric(#[from] NumericError),
}

// ============================================================================
// Order Entity
// ============================================================================

/// An order and its execution state.
///
/// Identity and request fields are public and never change after creation,
/// except the stop price of a trailing stop which follows the market.
/// Execution state is private and only moves through the state machine.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Order {
    pub id: OrderId,
    pub portfolio_id: PortfolioId,
    pub asset_id: AssetId,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Quantity,
    pub time_in_force: TimeInForce,
    pub creation_date: DateTime<Utc>,

    status: OrderStatus,
    executed_quantity: Quantity,
    fills: VolumeWeighted,
    execution_date: Option<DateTime<Utc>>,
    sequence: u64,
    triggered: bool,
    trail_offset: Option<Price>,
    replaces: Option<OrderId>,
}

impl Order {
    pub fn new(
        portfolio_id: PortfolioId,
        asset_id: AssetId,
        side: Side,
        order_type: OrderType,
        quantity: Quantity,
        time_in_force: TimeInForce,
        creation_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            portfolio_id,
            asset_id,
            side,
            order_type,
            quantity,
            time_in_force,
            creation_date,
            status: OrderStatus::Pending,
            executed_quantity: Decimal::ZERO,
            fills: VolumeWeighted::new(),
            execution_date: None,
            sequence: 0,
            triggered: false,
            trail_offset: None,
            replaces: None,
        }
    }

    // ========================================================================
    // Getters
    // ========================================================================

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn executed_quantity(&self) -> Quantity {
        self.executed_quantity
    }

    pub fn remaining_quantity(&self) -> Quantity {
        self.quantity - self.executed_quantity
    }

    /// Volume-weighted average of all fills, None until the first fill
    pub fn executed_price(&self) -> Option<Price> {
        self.fills.average()
    }

    pub fn execution_date(&self) -> Option<DateTime<Utc>> {
        self.execution_date
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }

    pub fn trail_offset(&self) -> Option<Price> {
        self.trail_offset
    }

    /// The order this one replaced, if it was created by a replace
    pub fn replaces(&self) -> Option<OrderId> {
        self.replaces
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// executed / quantity: 0 without fills, 1 once executed
    pub fn fill_ratio(&self) -> Decimal {
        if self.quantity.is_zero() {
            return Decimal::ZERO;
        }
        self.executed_quantity
            .checked_div(self.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    // ========================================================================
    // Matching Behaviour
    // ========================================================================

    /// Price limit applied while matching. None means the order takes any
    /// price (market orders and triggered stops).
    pub fn limit_price(&self) -> Option<Price> {
        self.order_type.price()
    }

    /// Armed stop whose trigger has not fired yet
    pub fn is_awaiting_trigger(&self) -> bool {
        self.order_type.is_stop() && !self.triggered
    }

    /// Whether an unfilled remainder belongs on the book
    pub fn rests_in_book(&self) -> bool {
        match self.order_type {
            OrderType::Limit { .. } => true,
            OrderType::StopLimit { .. } => self.triggered,
            _ => false,
        }
    }

    /// BUY stops trigger at or above the stop price, SELL stops at or below.
    pub fn stop_condition_met(&self, last_price: Price) -> bool {
        match self.order_type.stop_price() {
            Some(stop) => match self.side {
                Side::Buy => last_price >= stop,
                Side::Sell => last_price <= stop,
            },
            None => false,
        }
    }

    /// Follow the last traded price with a trailing stop.
    ///
    /// The first observed price fixes the trail distance; later prices only
    /// ever move the stop towards the market.
    pub fn track_last_price(&mut self, last_price: Price) {
        let OrderType::TrailingStop { stop_price } = self.order_type else {
            return;
        };

        let Some(offset) = self.trail_offset else {
            self.trail_offset = Some((last_price - stop_price).abs());
            return;
        };

        let candidate = match self.side {
            Side::Sell => last_price - offset,
            Side::Buy => last_price + offset,
        };
        let tighter = match self.side {
            Side::Sell => candidate > stop_price,
            Side::Buy => candidate < stop_price,
        };
        if tighter {
            self.order_type = OrderType::TrailingStop {
                stop_price: candidate,
            };
        }
    }

    // ========================================================================
    // State Transitions
    // ========================================================================

    /// Accept a validated order and give it its queue sequence
    pub fn accept(&mut self, sequence: u64) -> Result<(), OrderError> {
        self.status = self.status.transition(OrderStatusTransition::Accept)?;
        self.sequence = sequence;
        Ok(())
    }

    pub fn reject(&mut self, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.status = self.status.transition(OrderStatusTransition::Reject)?;
        self.execution_date.get_or_insert(at);
        Ok(())
    }

    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<(), OrderError> {
        self.status = self.status.transition(OrderStatusTransition::Cancel)?;
        self.execution_date.get_or_insert(at);
        Ok(())
    }

    /// Record one fill. Never lets executed quantity pass the order quantity.
    pub fn apply_fill(
        &mut self,
        quantity: Quantity,
        price: Price,
        at: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        if quantity <= Decimal::ZERO {
            return Err(OrderError::NonPositiveFill(quantity));
        }

        let remaining = self.remaining_quantity();
        if quantity > remaining {
            return Err(OrderError::Overfill {
                requested: quantity,
                remaining,
            });
        }

        let via = if quantity == remaining {
            OrderStatusTransition::Fill
        } else {
            OrderStatusTransition::PartialFill
        };
        let next = self.status.transition(via)?;

        self.fills.add(price, quantity)?;
        self.executed_quantity += quantity;
        self.status = next;
        self.execution_date.get_or_insert(at);
        Ok(())
    }

    /// Fire the stop trigger. The order is re-sequenced: it queues from the
    /// moment it became active, not from when it was armed.
    pub fn mark_triggered(&mut self, sequence: u64) {
        self.triggered = true;
        self.sequence = sequence;
    }

    /// A replacement of a stop that already fired does not wait again
    pub(crate) fn inherit_trigger(&mut self, original: &Order) {
        self.triggered = original.triggered;
    }

    pub(crate) fn set_replaces(&mut self, original: OrderId) {
        self.replaces = Some(original);
    }
}
