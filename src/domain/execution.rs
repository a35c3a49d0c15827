// ============================================================================
// Execution and Trade Domain Models
// ============================================================================

use super::{AssetId, ExecutionId, OrderId, PortfolioId, Side, TradeId};
use crate::numeric::{self, NumericResult, Price, Quantity};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum ExecutionType {
    /// Produced by continuous matching
    Match,
    /// Booked by an operator
    Manual,
    /// Produced by an administrative pass such as force-match
    System,
}

impl fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecutionType::Match => "MATCH",
            ExecutionType::Manual => "MANUAL",
            ExecutionType::System => "SYSTEM",
        })
    }
}

/// Which side of a match an execution was on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "UPPERCASE"))]
pub enum LiquiditySide {
    /// The resting order
    Maker,
    /// The incoming order
    Taker,
}

/// One fill of one order. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Execution {
    pub id: ExecutionId,
    pub order_id: OrderId,
    /// Shared with the counterparty's execution; None for manual bookings
    pub trade_id: Option<TradeId>,
    pub asset_id: AssetId,
    pub portfolio_id: PortfolioId,
    pub side: Side,
    pub liquidity: LiquiditySide,
    pub executed_quantity: Quantity,
    pub execution_price: Price,
    pub execution_time: DateTime<Utc>,
    pub commission: Decimal,
    pub execution_type: ExecutionType,
}

impl Execution {
    pub fn notional_value(&self) -> NumericResult<Decimal> {
        numeric::notional(self.execution_price, self.executed_quantity)
    }
}

/// The pairing record of one match between a maker and a taker
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Trade {
    pub id: TradeId,
    pub asset_id: AssetId,

    /// Order ID of the passive order (resting in book)
    pub maker_order_id: OrderId,
    pub maker_portfolio_id: PortfolioId,

    /// Order ID of the aggressive order (incoming)
    pub taker_order_id: OrderId,
    pub taker_portfolio_id: PortfolioId,
    pub taker_side: Side,

    /// Execution price, always the maker's price
    pub price: Price,
    pub quantity: Quantity,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    /// Calculate the notional value of the trade (price * quantity)
    ///
    /// Returns a Result because multiplication can overflow.
    pub fn notional_value(&self) -> NumericResult<Decimal> {
        numeric::notional(self.price, self.quantity)
    }

    pub fn buyer(&self) -> PortfolioId {
        match self.taker_side {
            Side::Buy => self.taker_portfolio_id,
            Side::Sell => self.maker_portfolio_id,
        }
    }

    pub fn seller(&self) -> PortfolioId {
        match self.taker_side {
            Side::Buy => self.maker_portfolio_id,
            Side::Sell => self.taker_portfolio_id,
        }
    }
}
