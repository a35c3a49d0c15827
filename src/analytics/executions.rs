// ============================================================================
// Execution Analytics
// VWAP, last trade, fill ratio and per-order aggregation
// ============================================================================

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{AssetId, Execution, LiquiditySide, OrderId};
use crate::error::EngineError;
use crate::interfaces::OrderStore;
use crate::numeric::{Price, Quantity, VolumeWeighted};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Totals over the executions of one order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ExecutionAggregate {
    pub order_id: OrderId,
    pub total_quantity: Quantity,
    /// `None` when the order has no executions
    pub average_price: Option<Price>,
    pub total_commission: Decimal,
    pub execution_count: usize,
}

/// Read-only statistics computed from the order store on demand
#[derive(Clone)]
pub struct ExecutionAnalytics {
    store: Arc<dyn OrderStore>,
}

impl ExecutionAnalytics {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Volume-weighted average price of an asset's trades with
    /// `from <= execution_time <= to`. `None` when nothing traded.
    ///
    /// Both legs of a match are stored; only the taker leg is counted so
    /// each trade contributes its quantity once.
    pub fn vwap(
        &self,
        asset_id: AssetId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<Price>, EngineError> {
        if from > to {
            return Ok(None);
        }

        let mut weighted = VolumeWeighted::new();
        for execution in self.store.executions_for_asset(asset_id, from, to)? {
            if counts_toward_volume(&execution) {
                weighted.add(execution.execution_price, execution.executed_quantity)?;
            }
        }
        Ok(weighted.average())
    }

    /// Most recent execution on an asset
    pub fn last_trade(&self, asset_id: AssetId) -> Result<Option<Execution>, EngineError> {
        Ok(self.store.last_execution(asset_id)?)
    }

    /// Executed over ordered quantity: 0 without fills, 1 once executed
    pub fn fill_ratio(&self, order_id: OrderId) -> Result<Decimal, EngineError> {
        let order = self
            .store
            .order(order_id)?
            .ok_or(EngineError::NotFound(order_id))?;
        Ok(order.fill_ratio())
    }

    pub fn executions(&self, order_id: OrderId) -> Result<Vec<Execution>, EngineError> {
        self.require_order(order_id)?;
        Ok(self.store.executions_for_order(order_id)?)
    }

    pub fn aggregate_by_order(&self, order_id: OrderId) -> Result<ExecutionAggregate, EngineError> {
        let executions = self.executions(order_id)?;

        let mut weighted = VolumeWeighted::new();
        let mut total_commission = Decimal::ZERO;
        for execution in &executions {
            weighted.add(execution.execution_price, execution.executed_quantity)?;
            total_commission += execution.commission;
        }

        Ok(ExecutionAggregate {
            order_id,
            total_quantity: weighted.volume(),
            average_price: weighted.average(),
            total_commission,
            execution_count: executions.len(),
        })
    }

    fn require_order(&self, order_id: OrderId) -> Result<(), EngineError> {
        match self.store.order(order_id)? {
            Some(_) => Ok(()),
            None => Err(EngineError::NotFound(order_id)),
        }
    }
}

/// Matched trades count on their taker leg; unpaired executions count as is
fn counts_toward_volume(execution: &Execution) -> bool {
    execution.trade_id.is_none() || execution.liquidity == LiquiditySide::Taker
}
