// ============================================================================
// Recovery
// Rebuilds in-memory books from the order store after a restart
// ============================================================================

use std::collections::BTreeMap;

use super::matching_engine::MatchingEngine;
use super::registry::LastTrade;
use crate::domain::{AssetId, Order};
use crate::error::EngineError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What `recover` put back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RecoveryReport {
    /// Orders placed back on a book
    pub resting: usize,
    /// Stop orders re-armed
    pub armed: usize,
    /// Live records with no place in a book (market remainders)
    pub skipped: usize,
    /// Orders already present in memory
    pub already_loaded: usize,
    /// Assets whose last trade price was restored
    pub last_prices: usize,
    /// Highest acceptance sequence seen
    pub last_sequence: u64,
}

impl MatchingEngine {
    /// Reload every live order from the store.
    ///
    /// Orders are reinserted in acceptance order so each price level gets
    /// its original queue, and each gets its ledger hold back. The engine sequence continues past the highest
    /// sequence found. Safe to call twice: orders already in memory are
    /// left alone.
    pub fn recover(&self) -> Result<RecoveryReport, EngineError> {
        let mut by_asset: BTreeMap<AssetId, Vec<Order>> = BTreeMap::new();
        for order in self.store().open_orders()? {
            by_asset.entry(order.asset_id).or_default().push(order);
        }

        let mut report = RecoveryReport::default();
        for (asset_id, mut orders) in by_asset {
            orders.sort_by_key(|order| order.sequence());
            let asset_book = self.registry().book(asset_id);
            let mut state = asset_book.write(self.config().lock_timeout)?;

            for order in orders {
                report.last_sequence = report.last_sequence.max(order.sequence());
                if state.book.contains(order.id) || state.stops.contains(order.id) {
                    report.already_loaded += 1;
                } else if order.is_awaiting_trigger() {
                    self.sync_reservation(&order)?;
                    state.stops.insert(order)?;
                    report.armed += 1;
                } else if order.rests_in_book() {
                    self.sync_reservation(&order)?;
                    state.book.insert(order)?;
                    report.resting += 1;
                } else {
                    tracing::debug!(order = %order.id, status = %order.status(), "live record not restorable");
                    report.skipped += 1;
                }
            }

            if state.last_trade.is_none() {
                if let Some(execution) = self.store().last_execution(asset_id)? {
                    state.last_trade = Some(LastTrade {
                        price: execution.execution_price,
                        timestamp: execution.execution_time,
                    });
                    report.last_prices += 1;
                }
            }
        }

        self.advance_sequence(report.last_sequence);
        tracing::info!(
            resting = report.resting,
            armed = report.armed,
            skipped = report.skipped,
            last_sequence = report.last_sequence,
            "order books recovered"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Asset, PortfolioId, Side};
    use crate::engine::{Disposition, MatchingEngineBuilder};
    use crate::interfaces::{
        InMemoryLedger, InMemoryOrderStore, NoOpEventHandler, OrderStore, PortfolioLedger,
        Reservation,
    };
    use crate::validation::OrderRequest;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    const ASSET: AssetId = AssetId(3);

    fn engine(ledger: Arc<InMemoryLedger>, store: Arc<InMemoryOrderStore>) -> MatchingEngine {
        MatchingEngineBuilder::new()
            .asset(Asset::new(ASSET, "XYZ"))
            .ledger(ledger)
            .store(store)
            .event_handler(Arc::new(NoOpEventHandler))
            .build()
            .unwrap()
    }

    fn funded_ledger() -> Arc<InMemoryLedger> {
        let ledger = Arc::new(InMemoryLedger::new());
        for id in 1..=3 {
            ledger.deposit(PortfolioId(id), Decimal::from(100_000));
            ledger.credit_position(PortfolioId(id), ASSET, Decimal::from(100));
        }
        ledger
    }

    #[test]
    fn test_recover_restores_queue_and_stops() {
        let ledger = funded_ledger();
        let store = Arc::new(InMemoryOrderStore::new());
        let first = engine(ledger.clone(), store.clone());

        let a = first
            .submit(OrderRequest::limit(PortfolioId(1), ASSET, Side::Buy, Decimal::from(5), Decimal::from(100)))
            .unwrap();
        let b = first
            .submit(OrderRequest::limit(PortfolioId(2), ASSET, Side::Buy, Decimal::from(5), Decimal::from(100)))
            .unwrap();
        first
            .submit(OrderRequest::limit(PortfolioId(3), ASSET, Side::Sell, Decimal::from(2), Decimal::from(100)))
            .unwrap();
        let stop = first
            .submit(OrderRequest::stop(PortfolioId(3), ASSET, Side::Sell, Decimal::from(1), Decimal::from(90)))
            .unwrap();
        assert_eq!(stop.disposition, Disposition::PendingTrigger);

        let restarted = engine(ledger, store.clone());
        let report = restarted.recover().unwrap();
        assert_eq!(report.resting, 2);
        assert_eq!(report.armed, 1);
        assert_eq!(report.last_prices, 1);
        assert!(restarted.last_sequence() >= report.last_sequence);

        let asset_book = restarted.registry().book(ASSET);
        let state = asset_book.read(restarted.config().lock_timeout).unwrap();
        let front = state.book.front_order(Side::Buy).unwrap();
        assert_eq!(front.id, a.order.id);
        assert_eq!(front.remaining_quantity(), Decimal::from(3));
        assert!(state.book.contains(b.order.id));
        assert!(state.stops.contains(stop.order.id));
        assert_eq!(state.last_price(), Some(Decimal::from(100)));
        assert_eq!(store.open_orders().unwrap().len(), 3);
    }

    #[test]
    fn test_recover_twice_is_harmless() {
        let ledger = funded_ledger();
        let store = Arc::new(InMemoryOrderStore::new());
        let engine = engine(ledger, store);
        engine
            .submit(OrderRequest::limit(PortfolioId(1), ASSET, Side::Buy, Decimal::from(1), Decimal::from(50)))
            .unwrap();

        let report = engine.recover().unwrap();
        assert_eq!(report.resting, 0);
        assert_eq!(report.already_loaded, 1);
    }

    #[test]
    fn test_recover_restores_ledger_holds() {
        let store = Arc::new(InMemoryOrderStore::new());
        let first = engine(funded_ledger(), store.clone());
        let bid = first
            .submit(OrderRequest::limit(PortfolioId(1), ASSET, Side::Buy, Decimal::from(10), Decimal::from(100)))
            .unwrap();
        let ask = first
            .submit(OrderRequest::limit(PortfolioId(2), ASSET, Side::Sell, Decimal::from(40), Decimal::from(120)))
            .unwrap();

        // the restarted ledger has balances but no holds yet
        let ledger = funded_ledger();
        let restarted = engine(ledger.clone(), store);
        restarted.recover().unwrap();

        assert_eq!(
            ledger.held(bid.order.id),
            Some(Reservation::Cash(Decimal::from(1_000)))
        );
        assert_eq!(ledger.available_cash(PortfolioId(1)), Ok(Decimal::from(99_000)));
        assert_eq!(
            ledger.held(ask.order.id),
            Some(Reservation::Holdings {
                asset: ASSET,
                quantity: Decimal::from(40)
            })
        );
        assert_eq!(
            ledger.available_quantity(PortfolioId(2), ASSET),
            Ok(Decimal::from(60))
        );
    }
}
