// ============================================================================
// Book Transaction
// Everything one locked mutation produces, committed together
// ============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{AssetId, Execution, ExecutionType, Order, OrderId, OrderStatus, Trade, TradeId};
use crate::interfaces::{CommitBatch, OrderEvent, Settlement};
use crate::numeric::Quantity;

/// Order upserts, new executions, trades, ledger settlements and events
/// gathered under one book lock. Nothing leaves the engine until the
/// whole transaction is committed.
#[derive(Debug)]
pub(crate) struct Transaction {
    pub asset_id: AssetId,
    pub execution_type: ExecutionType,
    pub now: DateTime<Utc>,
    orders: Vec<Order>,
    index: HashMap<OrderId, usize>,
    pub executions: Vec<Execution>,
    pub trades: Vec<Trade>,
    pub settlements: Vec<Settlement>,
    pub events: Vec<OrderEvent>,
}

impl Transaction {
    pub fn new(asset_id: AssetId, execution_type: ExecutionType, now: DateTime<Utc>) -> Self {
        Self {
            asset_id,
            execution_type,
            now,
            orders: Vec::new(),
            index: HashMap::new(),
            executions: Vec::new(),
            trades: Vec::new(),
            settlements: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Upsert an order; the latest version wins
    pub fn record(&mut self, order: &Order) {
        match self.index.get(&order.id) {
            Some(&slot) => self.orders[slot] = order.clone(),
            None => {
                self.index.insert(order.id, self.orders.len());
                self.orders.push(order.clone());
            },
        }
    }

    /// Latest recorded version of an order
    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.index.get(&id).and_then(|&slot| self.orders.get(slot))
    }

    pub fn event(&mut self, event: OrderEvent) {
        self.events.push(event);
    }

    pub fn has_trades(&self) -> bool {
        !self.trades.is_empty()
    }

    pub fn trade_ids(&self) -> Vec<TradeId> {
        self.trades.iter().map(|trade| trade.id).collect()
    }

    pub fn executions_for(&self, order_id: OrderId) -> Vec<Execution> {
        self.executions
            .iter()
            .filter(|execution| execution.order_id == order_id)
            .cloned()
            .collect()
    }

    /// Orders that reached EXECUTED within this transaction
    pub fn executed_orders(&self) -> usize {
        self.orders
            .iter()
            .filter(|order| order.status() == OrderStatus::Executed)
            .count()
    }

    /// Matched quantity, counting each trade once
    pub fn volume(&self) -> Quantity {
        self.trades
            .iter()
            .map(|trade| trade.quantity)
            .fold(Decimal::ZERO, |acc, qty| acc + qty)
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty() && self.executions.is_empty() && self.events.is_empty()
    }

    pub fn batch(&self) -> CommitBatch {
        CommitBatch {
            orders: self.orders.clone(),
            executions: self.executions.clone(),
        }
    }
}
