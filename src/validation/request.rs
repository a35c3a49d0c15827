// ============================================================================
// Order Request
// ============================================================================

use crate::domain::{AssetId, OrderKind, PortfolioId, Side, TimeInForce};
use crate::numeric::{Price, Quantity};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Order as submitted by a client, before validation.
///
/// Prices are optional here; the validator decides which ones the order type
/// needs and resolves them into an `OrderType`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderRequest {
    pub portfolio_id: PortfolioId,
    pub asset_id: AssetId,
    pub order_type: OrderKind,
    pub side: Side,
    pub quantity: Quantity,
    #[cfg_attr(feature = "serde", serde(default))]
    pub price: Option<Price>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub stop_price: Option<Price>,
    pub time_in_force: TimeInForce,
}

impl OrderRequest {
    fn base(
        portfolio_id: PortfolioId,
        asset_id: AssetId,
        order_type: OrderKind,
        side: Side,
        quantity: Quantity,
        time_in_force: TimeInForce,
    ) -> Self {
        Self {
            portfolio_id,
            asset_id,
            order_type,
            side,
            quantity,
            price: None,
            stop_price: None,
            time_in_force,
        }
    }

    /// GTC limit order
    pub fn limit(
        portfolio_id: PortfolioId,
        asset_id: AssetId,
        side: Side,
        quantity: Quantity,
        price: Price,
    ) -> Self {
        let mut request = Self::base(
            portfolio_id,
            asset_id,
            OrderKind::Limit,
            side,
            quantity,
            TimeInForce::GoodTillCancel,
        );
        request.price = Some(price);
        request
    }

    /// IOC market order
    pub fn market(portfolio_id: PortfolioId, asset_id: AssetId, side: Side, quantity: Quantity) -> Self {
        Self::base(
            portfolio_id,
            asset_id,
            OrderKind::Market,
            side,
            quantity,
            TimeInForce::ImmediateOrCancel,
        )
    }

    /// GTC stop order, executes as market once triggered
    pub fn stop(
        portfolio_id: PortfolioId,
        asset_id: AssetId,
        side: Side,
        quantity: Quantity,
        stop_price: Price,
    ) -> Self {
        let mut request = Self::base(
            portfolio_id,
            asset_id,
            OrderKind::Stop,
            side,
            quantity,
            TimeInForce::GoodTillCancel,
        );
        request.stop_price = Some(stop_price);
        request
    }

    /// GTC stop-limit order, executes as limit once triggered
    pub fn stop_limit(
        portfolio_id: PortfolioId,
        asset_id: AssetId,
        side: Side,
        quantity: Quantity,
        price: Price,
        stop_price: Price,
    ) -> Self {
        let mut request = Self::base(
            portfolio_id,
            asset_id,
            OrderKind::StopLimit,
            side,
            quantity,
            TimeInForce::GoodTillCancel,
        );
        request.price = Some(price);
        request.stop_price = Some(stop_price);
        request
    }

    /// GTC trailing stop with its initial stop price
    pub fn trailing_stop(
        portfolio_id: PortfolioId,
        asset_id: AssetId,
        side: Side,
        quantity: Quantity,
        stop_price: Price,
    ) -> Self {
        let mut request = Self::stop(portfolio_id, asset_id, side, quantity, stop_price);
        request.order_type = OrderKind::TrailingStop;
        request
    }

    /// Builder method: Set time in force
    pub fn with_time_in_force(mut self, time_in_force: TimeInForce) -> Self {
        self.time_in_force = time_in_force;
        self
    }

    /// Builder method: Set or clear the limit price
    pub fn with_price(mut self, price: Option<Price>) -> Self {
        self.price = price;
        self
    }

    /// Builder method: Set or clear the stop price
    pub fn with_stop_price(mut self, stop_price: Option<Price>) -> Self {
        self.stop_price = stop_price;
        self
    }
}
