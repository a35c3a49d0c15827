// ============================================================================
// Test Fixtures
// ============================================================================

use chrono::Utc;
use rust_decimal::Decimal;

use super::{AssetId, Order, OrderType, PortfolioId, Side, TimeInForce};

pub(crate) fn order(side: Side, order_type: OrderType, quantity: i64, tif: TimeInForce) -> Order {
    Order::new(
        PortfolioId(1),
        AssetId(1),
        side,
        order_type,
        Decimal::from(quantity),
        tif,
        Utc::now(),
    )
}

/// Accepted GTC limit order ready to rest
pub(crate) fn resting(side: Side, price: i64, quantity: i64, sequence: u64) -> Order {
    let mut order = order(
        side,
        OrderType::Limit {
            price: Decimal::from(price),
        },
        quantity,
        TimeInForce::GoodTillCancel,
    );
    order
        .accept(sequence)
        .expect("fresh order accepts");
    order
}

pub(crate) fn market(side: Side, quantity: i64) -> Order {
    order(side, OrderType::Market, quantity, TimeInForce::ImmediateOrCancel)
}

pub(crate) fn armed_stop(side: Side, stop_price: i64, quantity: i64, sequence: u64) -> Order {
    let mut order = order(
        side,
        OrderType::Stop {
            stop_price: Decimal::from(stop_price),
        },
        quantity,
        TimeInForce::GoodTillCancel,
    );
    order.accept(sequence).expect("fresh order accepts");
    order
}

pub(crate) fn armed_trailing_stop(
    side: Side,
    stop_price: i64,
    quantity: i64,
    sequence: u64,
) -> Order {
    let mut order = order(
        side,
        OrderType::TrailingStop {
            stop_price: Decimal::from(stop_price),
        },
        quantity,
        TimeInForce::GoodTillCancel,
    );
    order.accept(sequence).expect("fresh order accepts");
    order
}
