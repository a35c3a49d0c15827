// ============================================================================
// Persistence Interface
// Durable record of orders (mutable) and executions (insert-only)
// ============================================================================

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use thiserror::Error;

use crate::domain::{AssetId, Execution, ExecutionId, Order, OrderId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("order {0} is terminal and cannot be modified")]
    TerminalOrder(OrderId),

    #[error("execution {0} already recorded")]
    DuplicateExecution(ExecutionId),

    #[error("execution {execution_id} references unknown order {order_id}")]
    OrphanExecution {
        execution_id: ExecutionId,
        order_id: OrderId,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Order rows to upsert and execution rows to insert, applied together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitBatch {
    pub orders: Vec<Order>,
    pub executions: Vec<Execution>,
}

impl CommitBatch {
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty() && self.executions.is_empty()
    }
}

/// Contract the engine needs from the persistence layer
pub trait OrderStore: Send + Sync {
    /// Apply a batch atomically: all rows or none.
    fn commit(&self, batch: &CommitBatch) -> Result<(), StoreError>;

    fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    fn executions_for_order(&self, id: OrderId) -> Result<Vec<Execution>, StoreError>;

    /// Executions of one asset with `from <= execution_time <= to`
    fn executions_for_asset(
        &self,
        asset: AssetId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Execution>, StoreError>;

    fn last_execution(&self, asset: AssetId) -> Result<Option<Execution>, StoreError>;

    /// Every order not yet in a terminal state
    fn open_orders(&self) -> Result<Vec<Order>, StoreError>;
}

// ============================================================================
// In-Memory Store
// ============================================================================

#[derive(Debug, Default)]
struct StoreState {
    orders: HashMap<OrderId, Order>,
    executions: Vec<Execution>,
    by_order: HashMap<OrderId, Vec<usize>>,
    execution_ids: HashSet<ExecutionId>,
    unavailable: Option<String>,
}

impl StoreState {
    fn check_available(&self) -> Result<(), StoreError> {
        match &self.unavailable {
            Some(reason) => Err(StoreError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }

    fn validate(&self, batch: &CommitBatch) -> Result<(), StoreError> {
        for order in &batch.orders {
            if let Some(stored) = self.orders.get(&order.id) {
                if stored.is_terminal() && stored != order {
                    return Err(StoreError::TerminalOrder(order.id));
                }
            }
        }

        let batch_orders: HashSet<OrderId> = batch.orders.iter().map(|o| o.id).collect();
        let mut seen = HashSet::new();
        for execution in &batch.executions {
            if self.execution_ids.contains(&execution.id) || !seen.insert(execution.id) {
                return Err(StoreError::DuplicateExecution(execution.id));
            }
            if !batch_orders.contains(&execution.order_id)
                && !self.orders.contains_key(&execution.order_id)
            {
                return Err(StoreError::OrphanExecution {
                    execution_id: execution.id,
                    order_id: execution.order_id,
                });
            }
        }
        Ok(())
    }
}

/// Reference store held in memory
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    state: RwLock<StoreState>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails until cleared with `None`
    pub fn set_unavailable(&self, reason: Option<String>) {
        self.state.write().unavailable = reason;
    }

    pub fn order_count(&self) -> usize {
        self.state.read().orders.len()
    }

    pub fn execution_count(&self) -> usize {
        self.state.read().executions.len()
    }
}

impl OrderStore for InMemoryOrderStore {
    fn commit(&self, batch: &CommitBatch) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state.check_available()?;
        state.validate(batch)?;

        for order in &batch.orders {
            state.orders.insert(order.id, order.clone());
        }
        for execution in &batch.executions {
            let index = state.executions.len();
            state.execution_ids.insert(execution.id);
            state
                .by_order
                .entry(execution.order_id)
                .or_default()
                .push(index);
            state.executions.push(execution.clone());
        }
        Ok(())
    }

    fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        let state = self.state.read();
        state.check_available()?;
        Ok(state.orders.get(&id).cloned())
    }

    fn executions_for_order(&self, id: OrderId) -> Result<Vec<Execution>, StoreError> {
        let state = self.state.read();
        state.check_available()?;
        Ok(state
            .by_order
            .get(&id)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|i| state.executions.get(*i).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn executions_for_asset(
        &self,
        asset: AssetId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Execution>, StoreError> {
        let state = self.state.read();
        state.check_available()?;
        Ok(state
            .executions
            .iter()
            .filter(|e| e.asset_id == asset && e.execution_time >= from && e.execution_time <= to)
            .cloned()
            .collect())
    }

    fn last_execution(&self, asset: AssetId) -> Result<Option<Execution>, StoreError> {
        let state = self.state.read();
        state.check_available()?;
        // insertion order breaks ties between equal timestamps
        Ok(state
            .executions
            .iter()
            .enumerate()
            .filter(|(_, e)| e.asset_id == asset)
            .max_by_key(|(i, e)| (e.execution_time, *i))
            .map(|(_, e)| e.clone()))
    }

    fn open_orders(&self) -> Result<Vec<Order>, StoreError> {
        let state = self.state.read();
        state.check_available()?;
        Ok(state
            .orders
            .values()
            .filter(|o| !o.is_terminal())
            .cloned()
            .collect())
    }
}
