// ============================================================================
// Trading Service
// One method per endpoint; engine errors mapped to codes, timeouts retried
// ============================================================================

use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::error::ApiError;
use crate::analytics::{ExecutionAggregate, ExecutionAnalytics};
use crate::domain::{
    AssetId, BestLevel, BookSummary, DepthLevel, Execution, Order, OrderId, RetryPolicy, Side,
};
use crate::engine::{
    Disposition, ForceMatchReport, MatchingEngine, OrderLifecycleManager, SubmitOutcome,
};
use crate::error::EngineError;
use crate::market_data::{MarketDataView, TopOfBook};
use crate::numeric::{Price, Quantity};
use crate::validation::OrderRequest;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Request / Response Bodies
// ============================================================================

/// Body of `PUT order/{id}/replace`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReplaceOrderRequest {
    #[cfg_attr(feature = "serde", serde(default))]
    pub quantity: Option<Quantity>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub price: Option<Price>,
}

/// Created (or replacement) order with the executions it received
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderResponse {
    pub order: Order,
    pub executions: Vec<Execution>,
    pub disposition: Disposition,
}

impl From<SubmitOutcome> for OrderResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        Self {
            order: outcome.order,
            executions: outcome.executions,
            disposition: outcome.disposition,
        }
    }
}

/// `GET orderBook`: every level as `[price, quantity, order count]`
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderBookResponse {
    pub asset_id: AssetId,
    pub bids: Vec<(Price, Quantity, usize)>,
    pub asks: Vec<(Price, Quantity, usize)>,
}

fn level_tuples(levels: &[DepthLevel]) -> Vec<(Price, Quantity, usize)> {
    levels
        .iter()
        .map(|level| (level.price, level.quantity, level.order_count))
        .collect()
}

// ============================================================================
// Service
// ============================================================================

/// Request boundary over the engine and its read models.
///
/// Every call runs on the caller's thread. A lock timeout is retried with
/// the configured backoff before it reaches the client.
pub struct TradingService {
    engine: Arc<MatchingEngine>,
    lifecycle: OrderLifecycleManager,
    market_data: MarketDataView,
    analytics: ExecutionAnalytics,
    retry: RetryPolicy,
}

impl TradingService {
    pub fn new(engine: Arc<MatchingEngine>) -> Self {
        let retry = engine.config().retry;
        Self {
            lifecycle: OrderLifecycleManager::new(Arc::clone(&engine)),
            market_data: MarketDataView::new(&engine),
            analytics: ExecutionAnalytics::new(Arc::clone(engine.store())),
            engine,
            retry,
        }
    }

    /// Builder method: Override the engine's retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn engine(&self) -> &Arc<MatchingEngine> {
        &self.engine
    }

    pub fn lifecycle(&self) -> &OrderLifecycleManager {
        &self.lifecycle
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// `POST order`
    pub fn place_order(&self, request: OrderRequest) -> Result<OrderResponse, ApiError> {
        self.call("place_order", || self.engine.submit(request.clone()))
            .map(OrderResponse::from)
    }

    /// `DELETE order/{id}`
    pub fn cancel_order(&self, order_id: OrderId) -> Result<Order, ApiError> {
        self.call("cancel_order", || self.lifecycle.cancel(order_id))
    }

    /// `PUT order/{id}/replace`
    pub fn replace_order(
        &self,
        order_id: OrderId,
        request: ReplaceOrderRequest,
    ) -> Result<OrderResponse, ApiError> {
        self.call("replace_order", || {
            self.lifecycle.replace(order_id, request.quantity, request.price)
        })
        .map(OrderResponse::from)
    }

    pub fn order(&self, order_id: OrderId) -> Result<Order, ApiError> {
        self.call("order", || self.engine.order(order_id))
    }

    // ========================================================================
    // Market Data
    // ========================================================================

    /// `GET orderBook?asset_id=`
    pub fn order_book(&self, asset_id: AssetId) -> Result<OrderBookResponse, ApiError> {
        let view = self.call("order_book", || self.market_data.order_book(asset_id))?;
        Ok(OrderBookResponse {
            asset_id,
            bids: level_tuples(&view.bids),
            asks: level_tuples(&view.asks),
        })
    }

    pub fn best_bid(&self, asset_id: AssetId) -> Result<Option<BestLevel>, ApiError> {
        self.call("best_bid", || self.market_data.best_bid(asset_id))
    }

    pub fn best_ask(&self, asset_id: AssetId) -> Result<Option<BestLevel>, ApiError> {
        self.call("best_ask", || self.market_data.best_ask(asset_id))
    }

    pub fn spread(&self, asset_id: AssetId) -> Result<Option<Price>, ApiError> {
        self.call("spread", || self.market_data.spread(asset_id))
    }

    pub fn top_of_book(&self, asset_id: AssetId) -> Result<TopOfBook, ApiError> {
        self.call("top_of_book", || self.market_data.top_of_book(asset_id))
    }

    /// `GET depth?side=&levels=`
    pub fn depth(
        &self,
        asset_id: AssetId,
        side: Side,
        levels: Option<usize>,
    ) -> Result<Vec<DepthLevel>, ApiError> {
        self.call("depth", || self.market_data.depth(asset_id, side, levels))
    }

    pub fn snapshot(&self, asset_id: AssetId) -> Result<BookSummary, ApiError> {
        self.call("snapshot", || self.market_data.snapshot(asset_id))
    }

    // ========================================================================
    // Analytics
    // ========================================================================

    /// `GET executions/{order_id}`
    pub fn executions(&self, order_id: OrderId) -> Result<Vec<Execution>, ApiError> {
        self.call("executions", || self.analytics.executions(order_id))
    }

    /// `GET vwap/{asset_id}?from=&to=`
    pub fn vwap(
        &self,
        asset_id: AssetId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<Price>, ApiError> {
        self.call("vwap", || self.analytics.vwap(asset_id, from, to))
    }

    pub fn last_trade(&self, asset_id: AssetId) -> Result<Option<Execution>, ApiError> {
        self.call("last_trade", || self.analytics.last_trade(asset_id))
    }

    pub fn fill_ratio(&self, order_id: OrderId) -> Result<Decimal, ApiError> {
        self.call("fill_ratio", || self.analytics.fill_ratio(order_id))
    }

    pub fn aggregate(&self, order_id: OrderId) -> Result<ExecutionAggregate, ApiError> {
        self.call("aggregate", || self.analytics.aggregate_by_order(order_id))
    }

    // ========================================================================
    // Administrative
    // ========================================================================

    /// `POST purgeStale {cutoffDate}`
    pub fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, ApiError> {
        self.call("purge_stale", || self.lifecycle.purge_stale(cutoff))
    }

    /// `POST cancelExpired`
    pub fn cancel_expired(&self) -> Result<usize, ApiError> {
        self.call("cancel_expired", || self.lifecycle.cancel_expired_now())
    }

    /// `POST matchNow`
    pub fn match_now(&self) -> Result<ForceMatchReport, ApiError> {
        self.call("match_now", || self.lifecycle.force_match())
    }

    // ========================================================================
    // Retry
    // ========================================================================

    /// Run `operation`, retrying retryable errors with backoff
    fn call<T, F>(&self, endpoint: &'static str, mut operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Result<T, EngineError>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(endpoint, attempt, ?delay, error = %err, "retrying");
                    thread::sleep(delay);
                },
                Err(err) => {
                    tracing::debug!(endpoint, code = err.code(), "request failed");
                    return Err(err.into());
                },
            }
        }
    }
}

/// Render any response body as JSON
#[cfg(feature = "serde")]
pub fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string(value).map_err(|err| ApiError::new("INTERNAL", err.to_string()))
}
