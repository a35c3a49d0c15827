// ============================================================================
// Shared Test Harness
// ============================================================================

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use crossbeam::channel::Receiver;
use order_matching_engine::prelude::*;
use rust_decimal::Decimal;

pub const ASSET: AssetId = AssetId(1);

pub struct Harness {
    pub engine: Arc<MatchingEngine>,
    pub ledger: Arc<InMemoryLedger>,
    pub store: Arc<InMemoryOrderStore>,
    pub clock: Arc<ManualClock>,
    pub events: Receiver<OrderEvent>,
}

impl Harness {
    /// Engine over one asset with `portfolios` funded portfolios, ids from 1
    pub fn new(portfolios: u64) -> Self {
        Self::with_config(portfolios, EngineConfig::default())
    }

    pub fn with_config(portfolios: u64, config: EngineConfig) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        for id in 1..=portfolios {
            ledger.deposit(PortfolioId(id), Decimal::from(10_000_000));
            ledger.credit_position(PortfolioId(id), ASSET, Decimal::from(100_000));
        }
        let store = Arc::new(InMemoryOrderStore::new());
        let clock = Arc::new(ManualClock::new(start()));
        let (handler, events) = ChannelEventHandler::bounded(100_000);

        let engine = MatchingEngineBuilder::new()
            .config(config)
            .asset(Asset::new(ASSET, "ACME"))
            .ledger(ledger.clone())
            .store(store.clone())
            .event_handler(Arc::new(handler))
            .clock(clock.clone())
            .build()
            .expect("engine builds");

        Self {
            engine: Arc::new(engine),
            ledger,
            store,
            clock,
            events,
        }
    }

    pub fn limit(&self, portfolio: u64, side: Side, qty: i64, price: i64) -> SubmitOutcome {
        self.engine
            .submit(OrderRequest::limit(
                PortfolioId(portfolio),
                ASSET,
                side,
                dec(qty),
                dec(price),
            ))
            .expect("limit order accepted")
    }

    pub fn market(&self, portfolio: u64, side: Side, qty: i64) -> SubmitOutcome {
        self.engine
            .submit(OrderRequest::market(PortfolioId(portfolio), ASSET, side, dec(qty)))
            .expect("market order accepted")
    }

    pub fn view(&self) -> MarketDataView {
        MarketDataView::new(&self.engine)
    }

    pub fn drain_events(&self) -> Vec<OrderEvent> {
        self.events.try_iter().collect()
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 14, 30, 0).unwrap()
}

pub fn dec(value: i64) -> Decimal {
    Decimal::from(value)
}
