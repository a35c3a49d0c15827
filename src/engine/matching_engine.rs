// ============================================================================
// Matching Engine
// Core business logic for order matching
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::registry::{AssetBook, BookRegistry, BookState, LastTrade};
use super::transaction::Transaction;
use crate::domain::{
    AssetCatalog, AssetId, EngineConfig, Execution, ExecutionId, ExecutionType, LiquiditySide,
    Order, OrderStatus, Side, TimeInForce, Trade, TradeId,
};
use crate::error::{EngineError, RejectCode, Rejection};
use crate::interfaces::{
    CancelReason, Clock, EventHandler, MatchingAlgorithm, OrderEvent, OrderStore, PortfolioLedger,
    Settlement,
};
use crate::numeric::{Price, Quantity};
use crate::validation::{OrderRequest, OrderValidator};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What happened to an accepted order by the time `submit` returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum Disposition {
    /// Fully executed on arrival
    Filled,
    /// Remainder (or all of it) rests on the book
    Rested,
    /// Stop order armed, waiting for its trigger
    PendingTrigger,
    /// IOC remainder cancelled
    Cancelled,
    /// FOK that could not fill completely, nothing executed
    Killed,
    /// Market-style order that ran out of liquidity
    RemainderRejected,
}

/// Order record and the executions it received on submission
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubmitOutcome {
    pub order: Order,
    pub executions: Vec<Execution>,
    pub disposition: Disposition,
}

/// Continuous double auction over every asset's book.
///
/// Each asset is matched under its own write lock; different assets never
/// coordinate. A mutation and everything it produces are committed as one
/// transaction: store first, then ledger, then events.
pub struct MatchingEngine {
    registry: Arc<BookRegistry>,

    assets: Arc<AssetCatalog>,

    /// Pluggable matching algorithm
    algorithm: Box<dyn MatchingAlgorithm>,

    validator: OrderValidator,

    ledger: Arc<dyn PortfolioLedger>,

    store: Arc<dyn OrderStore>,

    /// Event handler for processing events
    event_handler: Arc<dyn EventHandler>,

    clock: Arc<dyn Clock>,

    config: EngineConfig,

    /// Engine-wide acceptance sequence
    sequence_counter: AtomicU64,
}

impl MatchingEngine {
    /// Create a new matching engine; see `MatchingEngineBuilder` for defaults
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        assets: Arc<AssetCatalog>,
        algorithm: Box<dyn MatchingAlgorithm>,
        ledger: Arc<dyn PortfolioLedger>,
        store: Arc<dyn OrderStore>,
        event_handler: Arc<dyn EventHandler>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let validator = OrderValidator::new(Arc::clone(&assets), Arc::clone(&ledger))
            .with_fee_rate(config.taker_fee_rate.max(config.maker_fee_rate));

        Ok(Self {
            registry: Arc::new(BookRegistry::new(config.lock_timeout)),
            assets,
            algorithm,
            validator,
            ledger,
            store,
            event_handler,
            clock,
            config,
            sequence_counter: AtomicU64::new(0),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn registry(&self) -> &Arc<BookRegistry> {
        &self.registry
    }

    pub fn assets(&self) -> &Arc<AssetCatalog> {
        &self.assets
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn algorithm_name(&self) -> &str {
        self.algorithm.name()
    }

    pub(crate) fn validator(&self) -> &OrderValidator {
        &self.validator
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence_counter.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Make sure the next sequence handed out is above `floor`
    pub(crate) fn advance_sequence(&self, floor: u64) {
        self.sequence_counter.fetch_max(floor, Ordering::AcqRel);
    }

    pub fn last_sequence(&self) -> u64 {
        self.sequence_counter.load(Ordering::Acquire)
    }

    // ========================================================================
    // Order Entry
    // ========================================================================

    /// Validate, accept and match one order.
    ///
    /// Business rejections come back as `EngineError::Rejected`; when the
    /// order got far enough to be recorded (insufficient funds/holdings) the
    /// REJECTED record is persisted and carried in the rejection.
    pub fn submit(&self, request: OrderRequest) -> Result<SubmitOutcome, EngineError> {
        let now = self.clock.now();
        let order = match self.validator.prepare(&request, now) {
            Ok(order) => order,
            Err(rejection) => {
                self.publish_rejection(&rejection, now);
                return Err(rejection.into());
            },
        };

        let asset_book = self.registry.book(order.asset_id);
        asset_book.ensure_active()?;
        let mut guard = asset_book.write(self.config.lock_timeout)?;
        asset_book.ensure_active()?;
        let state = &mut *guard;

        if let Err(err) =
            self.validator
                .reserve_buying_power(&order, &state.book, state.last_price(), now)
        {
            if let EngineError::Rejected(rejection) = &err {
                self.record_rejection(rejection, now)?;
            }
            return Err(err);
        }

        let mut tx = Transaction::new(order.asset_id, ExecutionType::Match, now);
        let (order, disposition) = match self.process(state, &mut tx, order) {
            Ok(result) => result,
            Err(err) => return Err(self.abort(&asset_book, &tx, err)),
        };
        let executions = tx.executions_for(order.id);
        self.commit(&asset_book, tx)?;

        Ok(SubmitOutcome {
            order,
            executions,
            disposition,
        })
    }

    /// Accept an order and run it through the book, including any stop
    /// cascade its trades set off. Returns the latest version of the order.
    pub(crate) fn process(
        &self,
        state: &mut BookState,
        tx: &mut Transaction,
        mut order: Order,
    ) -> Result<(Order, Disposition), EngineError> {
        order.accept(self.next_sequence())?;
        tx.event(OrderEvent::OrderAccepted {
            order_id: order.id,
            asset_id: order.asset_id,
            sequence: order.sequence(),
            timestamp: tx.now,
        });

        let (order, disposition) = if order.is_awaiting_trigger() {
            self.arm_or_trigger(state, tx, order)?
        } else {
            self.execute(state, tx, order)?
        };

        if tx.has_trades() {
            self.trigger_stops(state, tx)?;
        }

        let latest = tx.order(order.id).cloned().unwrap_or(order);
        Ok((latest, disposition))
    }

    fn arm_or_trigger(
        &self,
        state: &mut BookState,
        tx: &mut Transaction,
        mut order: Order,
    ) -> Result<(Order, Disposition), EngineError> {
        if let Some(last) = state.last_price() {
            order.track_last_price(last);
            if order.stop_condition_met(last) {
                order.mark_triggered(self.next_sequence());
                tx.event(OrderEvent::StopTriggered {
                    order_id: order.id,
                    asset_id: order.asset_id,
                    last_price: last,
                    timestamp: tx.now,
                });
                return self.execute(state, tx, order);
            }
        }

        state.stops.insert(order.clone())?;
        tx.record(&order);
        if let Some(stop_price) = order.order_type.stop_price() {
            tx.event(OrderEvent::StopArmed {
                order_id: order.id,
                asset_id: order.asset_id,
                stop_price,
                timestamp: tx.now,
            });
        }
        Ok((order, Disposition::PendingTrigger))
    }

    /// Match an active order and settle its remainder by time in force
    pub(crate) fn execute(
        &self,
        state: &mut BookState,
        tx: &mut Transaction,
        mut order: Order,
    ) -> Result<(Order, Disposition), EngineError> {
        if order.time_in_force == TimeInForce::FillOrKill
            && !self.algorithm.can_fill_completely(&order, &state.book)
        {
            return self.cancel_active(tx, order, CancelReason::FillOrKill, Disposition::Killed);
        }

        let fills = self.algorithm.match_order(&mut order, &mut state.book, tx.now)?;
        for fill in &fills {
            self.record_trade(state, tx, &fill.maker, &order, fill.quantity, fill.price)?;
            tx.event(fill_event(&fill.maker, fill.quantity, tx.now));
        }
        if !fills.is_empty() {
            tx.event(fill_event(&order, order.executed_quantity(), tx.now));
        }

        if order.status() == OrderStatus::Executed {
            tx.record(&order);
            return Ok((order, Disposition::Filled));
        }

        if order.rests_in_book() && order.time_in_force.can_rest() {
            let price = order.limit_price().unwrap_or_default();
            state.book.insert(order.clone())?;
            tx.record(&order);
            tx.event(OrderEvent::OrderRested {
                order_id: order.id,
                asset_id: order.asset_id,
                price,
                quantity: order.remaining_quantity(),
                timestamp: tx.now,
            });
            return Ok((order, Disposition::Rested));
        }

        if order.limit_price().is_none() {
            // a market order cannot rest; partial fills stay visible
            if order.executed_quantity().is_zero() {
                order.reject(tx.now)?;
            }
            tracing::debug!(
                order = %order.id,
                remaining = %order.remaining_quantity(),
                "market remainder rejected for lack of liquidity"
            );
            tx.record(&order);
            tx.event(OrderEvent::OrderRejected {
                order_id: Some(order.id),
                code: RejectCode::InsufficientLiquidity,
                reason: format!(
                    "{} of {} could not be filled",
                    order.remaining_quantity(),
                    order.quantity
                ),
                timestamp: tx.now,
            });
            return Ok((order, Disposition::RemainderRejected));
        }

        self.cancel_active(
            tx,
            order,
            CancelReason::ImmediateOrCancel,
            Disposition::Cancelled,
        )
    }

    fn cancel_active(
        &self,
        tx: &mut Transaction,
        mut order: Order,
        reason: CancelReason,
        disposition: Disposition,
    ) -> Result<(Order, Disposition), EngineError> {
        order.cancel(tx.now)?;
        tx.record(&order);
        tx.event(OrderEvent::OrderCancelled {
            order_id: order.id,
            reason,
            remaining_quantity: order.remaining_quantity(),
            timestamp: tx.now,
        });
        Ok((order, disposition))
    }

    /// Trigger armed stops against the last trade until no new trade moves
    /// the price. Stops fire in acceptance order.
    pub(crate) fn trigger_stops(
        &self,
        state: &mut BookState,
        tx: &mut Transaction,
    ) -> Result<(), EngineError> {
        loop {
            let Some(before) = state.last_trade else {
                return Ok(());
            };

            let fired = state.stops.take_triggered(before.price);
            for order in state.stops.orders().filter(|o| o.trail_offset().is_some()) {
                tx.record(order);
            }
            if fired.is_empty() {
                return Ok(());
            }

            for mut order in fired {
                order.mark_triggered(self.next_sequence());
                tracing::debug!(order = %order.id, last = %before.price, "stop triggered");
                tx.event(OrderEvent::StopTriggered {
                    order_id: order.id,
                    asset_id: order.asset_id,
                    last_price: before.price,
                    timestamp: tx.now,
                });
                self.execute(state, tx, order)?;
            }

            if state.last_trade == Some(before) {
                return Ok(());
            }
        }
    }

    /// Book one match: a trade, one execution per side, the ledger
    /// settlement and the new last price
    pub(crate) fn record_trade(
        &self,
        state: &mut BookState,
        tx: &mut Transaction,
        maker: &Order,
        taker: &Order,
        quantity: Quantity,
        price: Price,
    ) -> Result<(), EngineError> {
        let trade = Trade {
            id: TradeId::new(),
            asset_id: tx.asset_id,
            maker_order_id: maker.id,
            maker_portfolio_id: maker.portfolio_id,
            taker_order_id: taker.id,
            taker_portfolio_id: taker.portfolio_id,
            taker_side: taker.side,
            price,
            quantity,
            timestamp: tx.now,
        };

        let maker_commission = self
            .config
            .commission(LiquiditySide::Maker, price, quantity)?;
        let taker_commission = self
            .config
            .commission(LiquiditySide::Taker, price, quantity)?;

        for (order, liquidity, commission) in [
            (maker, LiquiditySide::Maker, maker_commission),
            (taker, LiquiditySide::Taker, taker_commission),
        ] {
            tx.executions.push(Execution {
                id: ExecutionId::new(),
                order_id: order.id,
                trade_id: Some(trade.id),
                asset_id: tx.asset_id,
                portfolio_id: order.portfolio_id,
                side: order.side,
                liquidity,
                executed_quantity: quantity,
                execution_price: price,
                execution_time: tx.now,
                commission,
                execution_type: tx.execution_type,
            });
        }

        let (buyer_commission, seller_commission) = match taker.side {
            Side::Buy => (taker_commission, maker_commission),
            Side::Sell => (maker_commission, taker_commission),
        };
        tx.settlements.push(Settlement {
            trade_id: trade.id,
            asset_id: tx.asset_id,
            buyer: trade.buyer(),
            seller: trade.seller(),
            quantity,
            price,
            buyer_commission,
            seller_commission,
        });

        tx.record(maker);
        tx.record(taker);
        tx.event(OrderEvent::TradeExecuted {
            trade: trade.clone(),
            execution_type: tx.execution_type,
        });
        tx.trades.push(trade);

        state.last_trade = Some(LastTrade {
            price,
            timestamp: tx.now,
        });
        Ok(())
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Persist, settle, then publish. A failure once matching has happened
    /// leaves the book ahead of the store or ledger: the asset is halted.
    pub(crate) fn commit(&self, asset_book: &AssetBook, tx: Transaction) -> Result<(), EngineError> {
        if tx.is_empty() {
            return Ok(());
        }

        let batch = tx.batch();
        if !batch.is_empty() {
            if let Err(err) = self.store.commit(&batch) {
                return Err(self.escalate(
                    asset_book,
                    format!("store rejected commit: {err}"),
                    tx.trade_ids(),
                    tx.now,
                ));
            }
        }

        for (settled, settlement) in tx.settlements.iter().enumerate() {
            if let Err(err) = self.ledger.settle(settlement) {
                let unsettled = tx.trade_ids().split_off(settled);
                return Err(self.escalate(
                    asset_book,
                    format!("ledger rejected settlement of trade {}: {err}", settlement.trade_id),
                    unsettled,
                    tx.now,
                ));
            }
        }

        for order in &batch.orders {
            if let Err(err) = self.sync_reservation(order) {
                return Err(self.escalate(
                    asset_book,
                    format!("ledger rejected the hold of order {}: {err}", order.id),
                    Vec::new(),
                    tx.now,
                ));
            }
        }

        self.event_handler.on_events(tx.events);
        Ok(())
    }

    /// Shrink a live order's ledger hold to what it may still need, or drop
    /// it once the order is done
    pub(crate) fn sync_reservation(&self, order: &Order) -> Result<(), EngineError> {
        match self.validator.reservation(order)? {
            Some(reservation) => self.ledger.hold(order.id, order.portfolio_id, reservation)?,
            None => self.ledger.release(order.id)?,
        }
        Ok(())
    }

    /// A mutation failed half way under the lock
    pub(crate) fn abort(&self, asset_book: &AssetBook, tx: &Transaction, err: EngineError) -> EngineError {
        match err {
            EngineError::SettlementInconsistency { .. } => err,
            other => self.escalate(
                asset_book,
                format!("matching aborted: {other}"),
                tx.trade_ids(),
                tx.now,
            ),
        }
    }

    fn escalate(
        &self,
        asset_book: &AssetBook,
        reason: String,
        trade_ids: Vec<TradeId>,
        now: DateTime<Utc>,
    ) -> EngineError {
        let asset = asset_book.asset_id();
        tracing::error!(
            %asset,
            %reason,
            trades = ?trade_ids,
            "settlement inconsistency, halting asset"
        );
        asset_book.halt(reason.clone());
        self.event_handler.on_event(OrderEvent::CriticalAlert {
            asset_id: asset,
            reason: reason.clone(),
            trade_ids: trade_ids.clone(),
            timestamp: now,
        });
        EngineError::SettlementInconsistency {
            asset,
            reason,
            trade_ids,
        }
    }

    fn publish_rejection(&self, rejection: &Rejection, now: DateTime<Utc>) {
        self.event_handler.on_event(OrderEvent::OrderRejected {
            order_id: rejection.order.as_ref().map(|order| order.id),
            code: rejection.code,
            reason: rejection.message.clone(),
            timestamp: now,
        });
    }

    /// Persist the REJECTED record a rejection carries, then publish it
    fn record_rejection(&self, rejection: &Rejection, now: DateTime<Utc>) -> Result<(), EngineError> {
        if let Some(order) = &rejection.order {
            self.store.commit(&crate::interfaces::CommitBatch {
                orders: vec![(**order).clone()],
                executions: Vec::new(),
            })?;
        }
        self.publish_rejection(rejection, now);
        Ok(())
    }

    // ========================================================================
    // Halting
    // ========================================================================

    /// Stop all mutations on an asset until `resume_asset`
    pub fn halt_asset(&self, asset_id: AssetId, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(asset = %asset_id, %reason, "asset halted");
        self.registry.book(asset_id).halt(reason);
    }

    /// Lift a halt after manual reconciliation. Returns false if the asset
    /// was not halted.
    pub fn resume_asset(&self, asset_id: AssetId) -> bool {
        let resumed = self
            .registry
            .get(asset_id)
            .map(|book| book.resume())
            .unwrap_or(false);
        if resumed {
            tracing::info!(asset = %asset_id, "asset resumed");
            self.event_handler.on_event(OrderEvent::AssetResumed {
                asset_id,
                timestamp: self.clock.now(),
            });
        }
        resumed
    }

    pub fn is_halted(&self, asset_id: AssetId) -> bool {
        self.registry
            .get(asset_id)
            .map(|book| book.is_halted())
            .unwrap_or(false)
    }

    /// Current record of an order
    pub fn order(&self, order_id: crate::domain::OrderId) -> Result<Order, EngineError> {
        self.store
            .order(order_id)?
            .ok_or(EngineError::NotFound(order_id))
    }

    /// Last traded price on an asset
    pub fn last_price(&self, asset_id: AssetId) -> Result<Option<Price>, EngineError> {
        match self.registry.get(asset_id) {
            Some(book) => Ok(book.read(self.config.lock_timeout)?.last_price()),
            None => Ok(None),
        }
    }
}

/// Partial or full fill event for an order's current state
pub(crate) fn fill_event(order: &Order, filled: Quantity, at: DateTime<Utc>) -> OrderEvent {
    if order.status() == OrderStatus::Executed {
        OrderEvent::OrderFilled {
            order_id: order.id,
            total_filled: order.executed_quantity(),
            average_price: order.executed_price(),
            timestamp: at,
        }
    } else {
        OrderEvent::OrderPartiallyFilled {
            order_id: order.id,
            filled_quantity: filled,
            remaining_quantity: order.remaining_quantity(),
            timestamp: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Asset, OrderKind, PortfolioId};
    use crate::engine::MatchingEngineBuilder;
    use crate::interfaces::{ChannelEventHandler, InMemoryLedger, InMemoryOrderStore, Reservation};
    use crossbeam::channel::Receiver;
    use rust_decimal::Decimal;

    const ASSET: AssetId = AssetId(1);
    const BUYER: PortfolioId = PortfolioId(1);
    const SELLER: PortfolioId = PortfolioId(2);

    struct Harness {
        engine: MatchingEngine,
        ledger: Arc<InMemoryLedger>,
        store: Arc<InMemoryOrderStore>,
        events: Receiver<OrderEvent>,
    }

    fn harness() -> Harness {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.deposit(BUYER, Decimal::from(1_000_000));
        ledger.deposit(SELLER, Decimal::from(1_000_000));
        ledger.credit_position(BUYER, ASSET, Decimal::from(1_000));
        ledger.credit_position(SELLER, ASSET, Decimal::from(1_000));
        let store = Arc::new(InMemoryOrderStore::new());
        let (handler, events) = ChannelEventHandler::bounded(1024);

        let engine = MatchingEngineBuilder::new()
            .asset(Asset::new(ASSET, "ACME"))
            .ledger(ledger.clone())
            .store(store.clone())
            .event_handler(Arc::new(handler))
            .build()
            .unwrap();

        Harness {
            engine,
            ledger,
            store,
            events,
        }
    }

    fn dec(value: i64) -> Decimal {
        Decimal::from(value)
    }

    fn limit(portfolio: PortfolioId, side: Side, qty: i64, price: i64) -> OrderRequest {
        OrderRequest::limit(portfolio, ASSET, side, dec(qty), dec(price))
    }

    #[test]
    fn test_limit_order_rests_without_liquidity() {
        let h = harness();
        let outcome = h.engine.submit(limit(BUYER, Side::Buy, 10, 100)).unwrap();

        assert_eq!(outcome.disposition, Disposition::Rested);
        assert_eq!(outcome.order.status(), OrderStatus::Open);
        assert!(outcome.executions.is_empty());
        assert_eq!(
            h.store.order(outcome.order.id).unwrap().unwrap().status(),
            OrderStatus::Open
        );
    }

    #[test]
    fn test_match_settles_and_publishes() {
        let h = harness();
        h.engine.submit(limit(SELLER, Side::Sell, 5, 99)).unwrap();
        let outcome = h.engine.submit(limit(BUYER, Side::Buy, 5, 100)).unwrap();

        assert_eq!(outcome.disposition, Disposition::Filled);
        assert_eq!(outcome.executions.len(), 1);
        assert_eq!(outcome.executions[0].execution_price, dec(99));
        assert_eq!(outcome.executions[0].liquidity, LiquiditySide::Taker);

        assert_eq!(h.ledger.cash(BUYER), Some(dec(1_000_000 - 495)));
        assert_eq!(h.ledger.position(SELLER, ASSET), Some(dec(995)));
        assert_eq!(h.store.execution_count(), 2);

        let trades: Vec<OrderEvent> = h
            .events
            .try_iter()
            .filter(|e| matches!(e, OrderEvent::TradeExecuted { .. }))
            .collect();
        assert_eq!(trades.len(), 1);
    }

    #[test]
    fn test_fok_kills_without_partial_fill() {
        let h = harness();
        h.engine.submit(limit(SELLER, Side::Sell, 3, 100)).unwrap();

        let outcome = h
            .engine
            .submit(limit(BUYER, Side::Buy, 5, 100).with_time_in_force(TimeInForce::FillOrKill))
            .unwrap();
        assert_eq!(outcome.disposition, Disposition::Killed);
        assert_eq!(outcome.order.status(), OrderStatus::Cancelled);
        assert_eq!(outcome.order.executed_quantity(), Decimal::ZERO);
        assert_eq!(h.store.execution_count(), 0);
    }

    #[test]
    fn test_ioc_remainder_cancelled() {
        let h = harness();
        h.engine.submit(limit(SELLER, Side::Sell, 3, 100)).unwrap();

        let outcome = h
            .engine
            .submit(
                limit(BUYER, Side::Buy, 5, 100).with_time_in_force(TimeInForce::ImmediateOrCancel),
            )
            .unwrap();
        assert_eq!(outcome.disposition, Disposition::Cancelled);
        assert_eq!(outcome.order.status(), OrderStatus::Cancelled);
        assert_eq!(outcome.order.executed_quantity(), dec(3));
        assert!(h
            .engine
            .registry()
            .book(ASSET)
            .read(h.engine.config().lock_timeout)
            .unwrap()
            .book
            .is_empty());
    }

    #[test]
    fn test_market_without_liquidity_is_rejected() {
        let h = harness();
        let outcome = h
            .engine
            .submit(OrderRequest::market(BUYER, ASSET, Side::Buy, dec(5)))
            .unwrap();
        assert_eq!(outcome.disposition, Disposition::RemainderRejected);
        assert_eq!(outcome.order.status(), OrderStatus::Rejected);
    }

    #[test]
    fn test_stop_triggers_after_trade() {
        let h = harness();
        let stop = h
            .engine
            .submit(OrderRequest::stop(SELLER, ASSET, Side::Sell, dec(2), dec(95)))
            .unwrap();
        assert_eq!(stop.disposition, Disposition::PendingTrigger);

        // liquidity for the stop to hit, then a trade at 95
        h.engine.submit(limit(BUYER, Side::Buy, 2, 90)).unwrap();
        h.engine.submit(limit(BUYER, Side::Buy, 1, 95)).unwrap();
        h.engine.submit(limit(SELLER, Side::Sell, 1, 95)).unwrap();

        let stop = h.engine.order(stop.order.id).unwrap();
        assert!(stop.is_triggered());
        assert_eq!(stop.status(), OrderStatus::Executed);
        assert_eq!(stop.executed_price(), Some(dec(90)));
    }

    #[test]
    fn test_stop_limit_rests_after_trigger() {
        let h = harness();
        h.engine.submit(limit(BUYER, Side::Buy, 1, 100)).unwrap();
        h.engine.submit(limit(SELLER, Side::Sell, 1, 100)).unwrap();

        // last trade 100 already satisfies a SELL stop at 101
        let outcome = h
            .engine
            .submit(OrderRequest::stop_limit(
                SELLER,
                ASSET,
                Side::Sell,
                dec(3),
                dec(102),
                dec(101),
            ))
            .unwrap();
        assert_eq!(outcome.disposition, Disposition::Rested);
        assert!(outcome.order.is_triggered());
        assert_eq!(
            outcome.order.order_type.kind(),
            OrderKind::StopLimit
        );
    }

    #[test]
    fn test_store_failure_after_match_halts_asset() {
        let h = harness();
        h.engine.submit(limit(SELLER, Side::Sell, 5, 100)).unwrap();

        h.store.set_unavailable(Some("disk full".into()));
        let err = h.engine.submit(limit(BUYER, Side::Buy, 5, 100)).unwrap_err();

        assert_eq!(err.code(), "SETTLEMENT_INCONSISTENCY");
        assert!(h.engine.is_halted(ASSET));
        let alerts = h
            .events
            .try_iter()
            .filter(|e| matches!(e, OrderEvent::CriticalAlert { .. }))
            .count();
        assert_eq!(alerts, 1);

        h.store.set_unavailable(None);
        let halted = h.engine.submit(limit(BUYER, Side::Buy, 1, 100)).unwrap_err();
        assert_eq!(halted.code(), "ASSET_HALTED");

        assert!(h.engine.resume_asset(ASSET));
        assert!(h.engine.submit(limit(BUYER, Side::Buy, 1, 100)).is_ok());
    }

    #[test]
    fn test_ledger_failure_during_settlement_halts_asset() {
        let h = harness();
        h.engine.submit(limit(SELLER, Side::Sell, 5, 100)).unwrap();

        // match under the lock, then lose the ledger before committing
        let asset_book = h.engine.registry().book(ASSET);
        let now = h.engine.now();
        let order = h
            .engine
            .validator()
            .prepare(&limit(BUYER, Side::Buy, 5, 100), now)
            .unwrap();
        let mut tx = Transaction::new(ASSET, ExecutionType::Match, now);
        {
            let mut guard = asset_book.write(h.engine.config().lock_timeout).unwrap();
            h.engine.process(&mut guard, &mut tx, order).unwrap();
        }
        h.ledger.set_unavailable(Some("settlement service down".into()));

        match h.engine.commit(&asset_book, tx).unwrap_err() {
            EngineError::SettlementInconsistency { trade_ids, .. } => {
                assert_eq!(trade_ids.len(), 1)
            },
            other => panic!("unexpected error {other:?}"),
        }
        assert!(h.engine.is_halted(ASSET));
    }

    #[test]
    fn test_insufficient_funds_persists_rejected_record() {
        let h = harness();
        let err = h
            .engine
            .submit(limit(PortfolioId(1), Side::Buy, 100_000, 100))
            .unwrap_err();
        let rejection = err.rejection().unwrap();
        assert_eq!(rejection.code, RejectCode::InsufficientFunds);

        let record = rejection.order.as_ref().unwrap();
        assert_eq!(
            h.store.order(record.id).unwrap().unwrap().status(),
            OrderStatus::Rejected
        );
    }

    #[test]
    fn test_stacked_orders_cannot_spend_the_same_cash() {
        let h = harness();
        let thin = PortfolioId(3);
        h.ledger.deposit(thin, dec(1_000));

        let first = h.engine.submit(limit(thin, Side::Buy, 10, 100)).unwrap();
        assert_eq!(first.disposition, Disposition::Rested);
        assert_eq!(h.ledger.held(first.order.id), Some(Reservation::Cash(dec(1_000))));

        for _ in 0..2 {
            let err = h.engine.submit(limit(thin, Side::Buy, 10, 100)).unwrap_err();
            assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
        }

        let sweep = h.engine.submit(limit(SELLER, Side::Sell, 30, 100)).unwrap();
        assert_eq!(sweep.order.executed_quantity(), dec(10));
        assert_eq!(h.ledger.cash(thin), Some(Decimal::ZERO));
        assert_eq!(h.ledger.held(first.order.id), None);
    }

    #[test]
    fn test_holds_follow_fills_and_cancels() {
        let h = harness();
        let resting = h.engine.submit(limit(SELLER, Side::Sell, 10, 100)).unwrap();
        assert_eq!(
            h.ledger.held(resting.order.id),
            Some(Reservation::Holdings {
                asset: ASSET,
                quantity: dec(10)
            })
        );
        assert_eq!(h.ledger.available_quantity(SELLER, ASSET), Ok(dec(990)));

        h.engine.submit(limit(BUYER, Side::Buy, 4, 100)).unwrap();
        assert_eq!(
            h.ledger.held(resting.order.id),
            Some(Reservation::Holdings {
                asset: ASSET,
                quantity: dec(6)
            })
        );
        assert_eq!(h.ledger.available_quantity(SELLER, ASSET), Ok(dec(990)));

        // an armed stop holds too
        let stop = h
            .engine
            .submit(OrderRequest::stop(BUYER, ASSET, Side::Buy, dec(2), dec(150)))
            .unwrap();
        assert_eq!(stop.disposition, Disposition::PendingTrigger);
        assert_eq!(h.ledger.held(stop.order.id), Some(Reservation::Cash(dec(300))));

        // IOC and market orders never keep a hold
        let ioc = h
            .engine
            .submit(limit(BUYER, Side::Buy, 8, 100).with_time_in_force(TimeInForce::ImmediateOrCancel))
            .unwrap();
        assert_eq!(ioc.order.status(), OrderStatus::Cancelled);
        assert_eq!(h.ledger.held(ioc.order.id), None);
        assert_eq!(h.ledger.held(resting.order.id), None);
        assert_eq!(h.ledger.available_quantity(SELLER, ASSET), Ok(dec(990)));
    }
}
