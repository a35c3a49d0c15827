// ============================================================================
// Matching Properties
// Random order flow against the invariants every book state must keep
// ============================================================================

mod common;

use std::collections::HashMap;

use common::{dec, Harness, ASSET};
use order_matching_engine::prelude::*;
use proptest::prelude::*;
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
struct Flow {
    side: Side,
    quantity: i64,
    /// `None` submits a MARKET order
    price: Option<i64>,
    time_in_force: TimeInForce,
}

fn side() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Buy), Just(Side::Sell)]
}

fn time_in_force() -> impl Strategy<Value = TimeInForce> {
    prop_oneof![
        3 => Just(TimeInForce::GoodTillCancel),
        1 => Just(TimeInForce::Day),
        1 => Just(TimeInForce::ImmediateOrCancel),
        1 => Just(TimeInForce::FillOrKill),
    ]
}

fn flow() -> impl Strategy<Value = Flow> {
    (
        side(),
        1i64..20,
        prop::option::weighted(0.85, 95i64..=105),
        time_in_force(),
    )
        .prop_map(|(side, quantity, price, time_in_force)| Flow {
            side,
            quantity,
            price,
            time_in_force,
        })
}

/// Submit the flow from rotating portfolios; returns the accepted order ids
/// and every trade published
fn run(h: &Harness, flows: &[Flow]) -> (Vec<OrderId>, Vec<Trade>) {
    let mut ids = Vec::new();
    for (i, flow) in flows.iter().enumerate() {
        let portfolio = PortfolioId(i as u64 % 4 + 1);
        let request = match flow.price {
            Some(price) => {
                OrderRequest::limit(portfolio, ASSET, flow.side, dec(flow.quantity), dec(price))
                    .with_time_in_force(flow.time_in_force)
            },
            None => OrderRequest::market(portfolio, ASSET, flow.side, dec(flow.quantity)),
        };
        if let Ok(outcome) = h.engine.submit(request) {
            ids.push(outcome.order.id);
        }

        let view = h.view();
        if let (Some(bid), Some(ask)) = (
            view.best_bid(ASSET).unwrap(),
            view.best_ask(ASSET).unwrap(),
        ) {
            assert!(bid.price < ask.price, "book crossed: {} >= {}", bid.price, ask.price);
        }
    }

    let trades = h
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            OrderEvent::TradeExecuted { trade, .. } => Some(trade),
            _ => None,
        })
        .collect();
    (ids, trades)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_quantities_are_conserved(flows in prop::collection::vec(flow(), 1..60)) {
        let h = Harness::new(4);
        let (ids, trades) = run(&h, &flows);

        let mut executed_by_side: HashMap<Side, Decimal> = HashMap::new();
        for id in &ids {
            let order = h.engine.order(*id).unwrap();
            prop_assert!(order.executed_quantity() >= Decimal::ZERO);
            prop_assert!(order.executed_quantity() <= order.quantity);
            prop_assert_eq!(
                order.executed_quantity() + order.remaining_quantity(),
                order.quantity
            );
            prop_assert_eq!(
                order.status() == OrderStatus::Executed,
                order.remaining_quantity().is_zero()
            );
            if order.status() == OrderStatus::PartiallyFilled {
                prop_assert!(order.executed_quantity() > Decimal::ZERO);
            }
            *executed_by_side.entry(order.side).or_default() += order.executed_quantity();
        }

        let volume: Decimal = trades.iter().map(|t| t.quantity).sum();
        prop_assert_eq!(executed_by_side.get(&Side::Buy).copied().unwrap_or_default(), volume);
        prop_assert_eq!(executed_by_side.get(&Side::Sell).copied().unwrap_or_default(), volume);
    }

    #[test]
    fn prop_trades_print_at_maker_price(flows in prop::collection::vec(flow(), 1..60)) {
        let h = Harness::new(4);
        let (_, trades) = run(&h, &flows);

        for trade in &trades {
            let maker = h.engine.order(trade.maker_order_id).unwrap();
            let taker = h.engine.order(trade.taker_order_id).unwrap();
            prop_assert_eq!(Some(trade.price), maker.limit_price());
            prop_assert_ne!(maker.side, taker.side);
            prop_assert!(maker.sequence() < taker.sequence());
            match (taker.side, taker.limit_price()) {
                (Side::Buy, Some(limit)) => prop_assert!(trade.price <= limit),
                (Side::Sell, Some(limit)) => prop_assert!(trade.price >= limit),
                (_, None) => {},
            }
        }
    }

    #[test]
    fn prop_fok_never_partially_fills(flows in prop::collection::vec(flow(), 1..60)) {
        let h = Harness::new(4);
        let (ids, _) = run(&h, &flows);

        for id in ids {
            let order = h.engine.order(id).unwrap();
            match order.time_in_force {
                TimeInForce::FillOrKill => prop_assert!(
                    order.status() == OrderStatus::Executed
                        || order.executed_quantity().is_zero()
                ),
                TimeInForce::ImmediateOrCancel => prop_assert!(order.status() != OrderStatus::Open),
                _ => {},
            }
        }
    }

    #[test]
    fn prop_resting_volume_matches_live_orders(flows in prop::collection::vec(flow(), 1..60)) {
        let h = Harness::new(4);
        let (ids, _) = run(&h, &flows);

        let live: Decimal = ids
            .iter()
            .map(|id| h.engine.order(*id).unwrap())
            .filter(|order| !order.is_terminal() && order.limit_price().is_some())
            .map(|order| order.remaining_quantity())
            .sum();
        let summary = h.view().snapshot(ASSET).unwrap();
        prop_assert_eq!(summary.total_volume(), live);
    }
}
