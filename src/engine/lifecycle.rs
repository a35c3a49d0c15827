// ============================================================================
// Order Lifecycle Manager
// Cancel, replace, DAY expiry, stale purge and administrative matching
// ============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::matching_engine::{fill_event, MatchingEngine, SubmitOutcome};
use super::registry::BookState;
use super::transaction::Transaction;
use crate::domain::{ExecutionType, Order, OrderId, OrderType, Side, TimeInForce};
use crate::error::{EngineError, RejectCode, Rejection};
use crate::interfaces::{CancelReason, OrderEvent};
use crate::numeric::{Price, Quantity};
use crate::validation::OrderRequest;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Result of an administrative matching pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ForceMatchReport {
    /// Trades produced
    pub matches: usize,
    /// Orders that became fully executed
    pub executed_orders: usize,
    /// Matched quantity
    pub volume: Quantity,
}

impl ForceMatchReport {
    fn absorb(&mut self, tx: &Transaction) {
        self.matches += tx.trades.len();
        self.executed_orders += tx.executed_orders();
        self.volume += tx.volume();
    }
}

/// Lifecycle operations that run beside order entry.
///
/// Every operation takes the same per-asset write lock as `submit` and
/// commits through the engine, so it never races a match on the same book.
pub struct OrderLifecycleManager {
    engine: Arc<MatchingEngine>,
}

impl OrderLifecycleManager {
    pub fn new(engine: Arc<MatchingEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<MatchingEngine> {
        &self.engine
    }

    // ========================================================================
    // Cancel / Replace
    // ========================================================================

    /// Cancel a live order.
    ///
    /// `AlreadyTerminal` if the order is done, `NotFound` if it is unknown or
    /// no longer live (such as a market order's rejected remainder).
    pub fn cancel(&self, order_id: OrderId) -> Result<Order, EngineError> {
        let stored = self.live_record(order_id)?;
        let asset_book = self.engine.registry().book(stored.asset_id);
        asset_book.ensure_active()?;
        let mut guard = asset_book.write(self.engine.config().lock_timeout)?;
        let state = &mut *guard;

        let mut order = self.take_live(state, order_id)?;
        let mut tx = Transaction::new(order.asset_id, ExecutionType::Match, self.engine.now());
        order.cancel(tx.now)?;
        tx.record(&order);
        tx.event(OrderEvent::OrderCancelled {
            order_id,
            reason: CancelReason::User,
            remaining_quantity: order.remaining_quantity(),
            timestamp: tx.now,
        });

        self.engine.commit(&asset_book, tx)?;
        tracing::debug!(order = %order_id, "order cancelled");
        Ok(order)
    }

    /// Cancel-then-reinsert under one book lock.
    ///
    /// The replacement gets a new id and a new queue position. It is
    /// validated before the original is touched; a rejected replacement
    /// leaves the original live. Without a new quantity the replacement
    /// carries the original's remaining quantity.
    pub fn replace(
        &self,
        order_id: OrderId,
        new_quantity: Option<Quantity>,
        new_price: Option<Price>,
    ) -> Result<SubmitOutcome, EngineError> {
        if new_quantity.is_none() && new_price.is_none() {
            return Err(Rejection::new(
                RejectCode::InvalidReplace,
                "replace needs a new quantity or a new price",
            )
            .into());
        }

        let stored = self.live_record(order_id)?;
        let asset_book = self.engine.registry().book(stored.asset_id);
        asset_book.ensure_active()?;
        let mut guard = asset_book.write(self.engine.config().lock_timeout)?;
        let state = &mut *guard;
        let now = self.engine.now();

        let original = live_order(state, order_id)
            .cloned()
            .ok_or_else(|| self.gone(order_id))?;
        let request = replacement_request(&original, new_quantity, new_price)?;

        let validator = self.engine.validator();
        let mut replacement = validator.prepare(&request, now)?;
        replacement.inherit_trigger(&original);
        validator.reserve_replacement(
            &replacement,
            &original,
            &state.book,
            state.last_price(),
            now,
        )?;

        let mut tx = Transaction::new(original.asset_id, ExecutionType::Match, now);
        let mut original = self.take_live(state, order_id)?;
        original.cancel(now)?;
        tx.record(&original);
        tx.event(OrderEvent::OrderCancelled {
            order_id,
            reason: CancelReason::Replaced,
            remaining_quantity: original.remaining_quantity(),
            timestamp: now,
        });

        replacement.set_replaces(order_id);
        let replacement_id = replacement.id;
        let (order, disposition) = match self.engine.process(state, &mut tx, replacement) {
            Ok(result) => result,
            Err(err) => return Err(self.engine.abort(&asset_book, &tx, err)),
        };
        tx.event(OrderEvent::OrderReplaced {
            original_id: order_id,
            replacement_id,
            timestamp: now,
        });

        let executions = tx.executions_for(order.id);
        self.engine.commit(&asset_book, tx)?;
        tracing::debug!(original = %order_id, replacement = %replacement_id, "order replaced");

        Ok(SubmitOutcome {
            order,
            executions,
            disposition,
        })
    }

    // ========================================================================
    // Sweeps
    // ========================================================================

    /// Cancel resting and armed DAY orders whose session has closed by
    /// `now`. GTC orders never expire.
    pub fn cancel_expired(&self, now: DateTime<Utc>) -> Result<usize, EngineError> {
        let config = self.engine.config();
        let count = self.sweep(now, CancelReason::Expired, |order| {
            order.time_in_force == TimeInForce::Day
                && config.is_day_expired(order.creation_date, now)
        })?;
        tracing::info!(count, "expired DAY orders cancelled");
        Ok(count)
    }

    /// `cancel_expired` at the engine clock's current time
    pub fn cancel_expired_now(&self) -> Result<usize, EngineError> {
        self.cancel_expired(self.engine.now())
    }

    /// Cancel every resting or armed order created before `cutoff`
    pub fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, EngineError> {
        let now = self.engine.now();
        let count = self.sweep(now, CancelReason::Purged, |order| {
            order.creation_date < cutoff
        })?;
        tracing::info!(count, %cutoff, "stale orders purged");
        Ok(count)
    }

    /// Cancel matching live orders asset by asset. Fails fast on the first
    /// lock timeout; assets already swept stay committed. Halted assets are
    /// skipped.
    fn sweep<F>(&self, now: DateTime<Utc>, reason: CancelReason, selects: F) -> Result<usize, EngineError>
    where
        F: Fn(&Order) -> bool,
    {
        let mut total = 0;
        for asset_book in self.engine.registry().books() {
            if asset_book.is_halted() {
                tracing::warn!(asset = %asset_book.asset_id(), "skipping halted asset in sweep");
                continue;
            }
            let mut guard = asset_book.write(self.engine.config().lock_timeout)?;
            let state = &mut *guard;

            let doomed: Vec<OrderId> = state
                .book
                .orders()
                .chain(state.stops.orders())
                .filter(|order| selects(order))
                .map(|order| order.id)
                .collect();
            if doomed.is_empty() {
                continue;
            }

            let mut tx = Transaction::new(asset_book.asset_id(), ExecutionType::Match, now);
            for id in doomed {
                let mut order = self.take_live(state, id)?;
                order.cancel(now)?;
                tx.record(&order);
                tx.event(OrderEvent::OrderCancelled {
                    order_id: id,
                    reason,
                    remaining_quantity: order.remaining_quantity(),
                    timestamp: now,
                });
                total += 1;
            }
            self.engine.commit(&asset_book, tx)?;
        }
        Ok(total)
    }

    // ========================================================================
    // Force Match
    // ========================================================================

    /// One extra matching pass over every asset: fire armed stops against
    /// the last trade, then uncross a crossed book. Executions produced here
    /// are typed SYSTEM.
    pub fn force_match(&self) -> Result<ForceMatchReport, EngineError> {
        let mut report = ForceMatchReport::default();
        for asset_book in self.engine.registry().books() {
            if asset_book.is_halted() {
                continue;
            }
            let mut guard = asset_book.write(self.engine.config().lock_timeout)?;
            let state = &mut *guard;

            let mut tx = Transaction::new(asset_book.asset_id(), ExecutionType::System, self.engine.now());
            if let Err(err) = self.force_match_book(state, &mut tx) {
                return Err(self.engine.abort(&asset_book, &tx, err));
            }
            report.absorb(&tx);
            self.engine.commit(&asset_book, tx)?;
        }
        tracing::info!(
            matches = report.matches,
            executed = report.executed_orders,
            volume = %report.volume,
            "force match complete"
        );
        Ok(report)
    }

    fn force_match_book(&self, state: &mut BookState, tx: &mut Transaction) -> Result<(), EngineError> {
        self.engine.trigger_stops(state, tx)?;

        while state.book.is_crossed() {
            let (Some(bid), Some(ask)) = (
                state.book.front_order(Side::Buy).cloned(),
                state.book.front_order(Side::Sell).cloned(),
            ) else {
                break;
            };

            // the earlier order was resting first: it is the maker
            let (maker, taker) = if bid.sequence() <= ask.sequence() {
                (bid, ask)
            } else {
                (ask, bid)
            };
            let Some(price) = maker.limit_price() else {
                break;
            };
            let quantity = maker.remaining_quantity().min(taker.remaining_quantity());
            if quantity <= Decimal::ZERO {
                break;
            }

            let maker = state.book.fill_resting(maker.id, quantity, price, tx.now)?;
            let taker = state.book.fill_resting(taker.id, quantity, price, tx.now)?;
            self.engine.record_trade(state, tx, &maker, &taker, quantity, price)?;
            tx.event(fill_event(&maker, quantity, tx.now));
            tx.event(fill_event(&taker, quantity, tx.now));
        }

        if tx.has_trades() {
            self.engine.trigger_stops(state, tx)?;
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Stored record of an order that is not terminal
    fn live_record(&self, order_id: OrderId) -> Result<Order, EngineError> {
        let stored = self
            .engine
            .store()
            .order(order_id)?
            .ok_or(EngineError::NotFound(order_id))?;
        if stored.is_terminal() {
            return Err(EngineError::AlreadyTerminal {
                order_id,
                status: stored.status(),
            });
        }
        Ok(stored)
    }

    /// Pull a live order out of the book or the stop book
    fn take_live(&self, state: &mut BookState, order_id: OrderId) -> Result<Order, EngineError> {
        if state.book.contains(order_id) {
            return Ok(state.book.remove(order_id)?);
        }
        if state.stops.contains(order_id) {
            return Ok(state.stops.remove(order_id)?);
        }
        Err(self.gone(order_id))
    }

    /// The order left the book between the store lookup and the lock
    fn gone(&self, order_id: OrderId) -> EngineError {
        match self.engine.store().order(order_id) {
            Ok(Some(order)) if order.is_terminal() => EngineError::AlreadyTerminal {
                order_id,
                status: order.status(),
            },
            _ => EngineError::NotFound(order_id),
        }
    }
}

fn live_order(state: &BookState, order_id: OrderId) -> Option<&Order> {
    state
        .book
        .get(order_id)
        .or_else(|| state.stops.get(order_id))
}

fn replacement_request(
    original: &Order,
    new_quantity: Option<Quantity>,
    new_price: Option<Price>,
) -> Result<OrderRequest, Rejection> {
    let price = match (original.order_type, new_price) {
        (OrderType::Limit { .. } | OrderType::StopLimit { .. }, Some(price)) => Some(price),
        (order_type, None) => order_type.price(),
        (order_type, Some(_)) => {
            return Err(Rejection::new(
                RejectCode::InvalidReplace,
                format!("{} orders have no limit price to replace", order_type.kind()),
            ))
        },
    };

    Ok(OrderRequest {
        portfolio_id: original.portfolio_id,
        asset_id: original.asset_id,
        order_type: original.order_type.kind(),
        side: original.side,
        quantity: new_quantity.unwrap_or_else(|| original.remaining_quantity()),
        price,
        stop_price: original.order_type.stop_price(),
        time_in_force: original.time_in_force,
    })
}
