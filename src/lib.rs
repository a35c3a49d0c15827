// ============================================================================
// Order Matching Engine Library
// Per-asset continuous double auction with price/time priority
// ============================================================================

//! # Order Matching Engine
//!
//! Accepts buy and sell orders against tradable assets, keeps one live order
//! book per asset, matches crossing orders under price/time priority and
//! records the resulting executions.
//!
//! ## Features
//!
//! - **Order types**: MARKET, LIMIT, STOP, STOP_LIMIT and TRAILING_STOP
//! - **Time in force**: DAY, GTC, IOC and FOK
//! - **Per-asset locking**: one bounded reader/writer lock per book; assets
//!   never coordinate
//! - **Transactional commits**: order updates, executions and ledger
//!   settlement land together or the asset halts
//! - **Read models**: best bid/ask, spread, depth, snapshots, VWAP and fill
//!   ratios
//! - **Exact arithmetic**: prices and quantities are `rust_decimal::Decimal`
//!
//! ## Example
//!
//! ```rust
//! use order_matching_engine::prelude::*;
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! let acme = AssetId(1);
//! let ledger = Arc::new(InMemoryLedger::new());
//! ledger.deposit(PortfolioId(1), Decimal::from(10_000));
//! ledger.credit_position(PortfolioId(2), acme, Decimal::from(50));
//!
//! let engine = MatchingEngineBuilder::new()
//!     .asset(Asset::new(acme, "ACME"))
//!     .ledger(ledger)
//!     .event_handler(Arc::new(NoOpEventHandler))
//!     .build()
//!     .unwrap();
//!
//! // Resting ask
//! engine
//!     .submit(OrderRequest::limit(PortfolioId(2), acme, Side::Sell, Decimal::from(10), Decimal::from(100)))
//!     .unwrap();
//!
//! // Crossing bid fills at the maker's price
//! let outcome = engine
//!     .submit(OrderRequest::limit(PortfolioId(1), acme, Side::Buy, Decimal::from(4), Decimal::from(101)))
//!     .unwrap();
//! assert_eq!(outcome.disposition, Disposition::Filled);
//! assert_eq!(outcome.executions[0].execution_price, Decimal::from(100));
//!
//! let view = MarketDataView::new(&engine);
//! let ask = view.best_ask(acme).unwrap().unwrap();
//! assert_eq!(ask.quantity, Decimal::from(6));
//! ```

pub mod analytics;
pub mod domain;
pub mod engine;
pub mod error;
pub mod interfaces;
pub mod market_data;
pub mod numeric;
pub mod service;
pub mod validation;

#[cfg(feature = "logging")]
pub mod logging;

#[cfg(feature = "async")]
pub mod scheduler;

// Re-exports for convenience
pub mod prelude {
    pub use crate::analytics::{ExecutionAggregate, ExecutionAnalytics};
    pub use crate::domain::order::state::{OrderStatus, OrderStatusTransition};
    pub use crate::domain::{
        Asset, AssetCatalog, AssetId, EngineConfig, Execution, ExecutionType, LiquiditySide,
        Order, OrderId, OrderKind, OrderType, PortfolioId, RetryPolicy, Side, TimeInForce, Trade,
    };
    pub use crate::engine::{
        Disposition, ForceMatchReport, MatchingEngine, MatchingEngineBuilder,
        OrderLifecycleManager, PriceTimePriority, SubmitOutcome,
    };
    pub use crate::error::{EngineError, RejectCode, Rejection};
    pub use crate::interfaces::{
        CancelReason, ChannelEventHandler, Clock, EventHandler, InMemoryLedger,
        InMemoryOrderStore, LoggingEventHandler, ManualClock, MatchingAlgorithm, NoOpEventHandler,
        OrderEvent, OrderStore, PortfolioLedger, Reservation, SystemClock,
    };
    pub use crate::market_data::{MarketDataView, TopOfBook};
    pub use crate::numeric::{Price, Quantity};
    pub use crate::service::{ApiError, TradingService};
    pub use crate::validation::OrderRequest;
}

#[cfg(test)]
mod integration_tests {
    use super::prelude::*;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    #[test]
    fn test_end_to_end_matching() {
        let asset = AssetId(1);
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.deposit(PortfolioId(1), Decimal::from(100_000));
        ledger.credit_position(PortfolioId(2), asset, Decimal::from(1));
        let store = Arc::new(InMemoryOrderStore::new());
        let (handler, events) = ChannelEventHandler::bounded(64);

        let engine = MatchingEngineBuilder::new()
            .asset(Asset::new(asset, "BTC-USD"))
            .ledger(ledger.clone())
            .store(store.clone())
            .event_handler(Arc::new(handler))
            .build()
            .unwrap();

        // Add sell order
        let sell = engine
            .submit(OrderRequest::limit(
                PortfolioId(2),
                asset,
                Side::Sell,
                Decimal::ONE,
                Decimal::from(50_000),
            ))
            .unwrap();
        assert_eq!(sell.disposition, Disposition::Rested);

        // Add matching buy order
        let buy = engine
            .submit(OrderRequest::limit(
                PortfolioId(1),
                asset,
                Side::Buy,
                Decimal::ONE,
                Decimal::from(50_000),
            ))
            .unwrap();
        assert_eq!(buy.disposition, Disposition::Filled);

        // Verify trade occurred
        let events: Vec<OrderEvent> = events.try_iter().collect();
        assert!(events
            .iter()
            .any(|e| matches!(e, OrderEvent::TradeExecuted { .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, OrderEvent::OrderFilled { order_id, .. } if *order_id == sell.order.id)));

        // Verify book is empty and both sides settled
        let view = MarketDataView::new(&engine);
        let summary = view.snapshot(asset).unwrap();
        assert_eq!(summary.total_orders(), 0);
        assert_eq!(ledger.position(PortfolioId(1), asset), Some(Decimal::ONE));
        assert_eq!(store.order(sell.order.id).unwrap().unwrap().status(), OrderStatus::Executed);
    }
}
