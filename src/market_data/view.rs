// ============================================================================
// Market Data View
// Best bid/ask, spread, top of book, depth and snapshots per asset
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::domain::{
    AssetCatalog, AssetId, BestLevel, BookSummary, DepthLevel, OrderBook, OrderBookView, Side,
    StopBook,
};
use crate::engine::{BookRegistry, BookState, MatchingEngine};
use crate::error::{EngineError, RejectCode, Rejection};
use crate::numeric::Price;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Both best levels with spread, mid and last trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TopOfBook {
    pub asset_id: AssetId,
    pub best_bid: Option<BestLevel>,
    pub best_ask: Option<BestLevel>,
    pub spread: Option<Price>,
    pub mid_price: Option<Price>,
    pub last_price: Option<Price>,
}

/// Read side of the engine.
///
/// Each call takes the asset's shared lock once, so everything it returns
/// comes from the same instant. Nothing here mutates a book.
#[derive(Clone)]
pub struct MarketDataView {
    registry: Arc<BookRegistry>,
    assets: Arc<AssetCatalog>,
    lock_timeout: Duration,
    default_depth: usize,
}

impl MarketDataView {
    pub fn new(engine: &MatchingEngine) -> Self {
        Self {
            registry: Arc::clone(engine.registry()),
            assets: Arc::clone(engine.assets()),
            lock_timeout: engine.config().lock_timeout,
            default_depth: engine.config().default_depth,
        }
    }

    pub fn default_depth(&self) -> usize {
        self.default_depth
    }

    pub fn best_bid(&self, asset_id: AssetId) -> Result<Option<BestLevel>, EngineError> {
        self.with_book(asset_id, |state| state.book.best_bid())
    }

    pub fn best_ask(&self, asset_id: AssetId) -> Result<Option<BestLevel>, EngineError> {
        self.with_book(asset_id, |state| state.book.best_ask())
    }

    /// Best ask minus best bid; `None` if either side is empty
    pub fn spread(&self, asset_id: AssetId) -> Result<Option<Price>, EngineError> {
        self.with_book(asset_id, |state| state.book.spread())
    }

    pub fn top_of_book(&self, asset_id: AssetId) -> Result<TopOfBook, EngineError> {
        self.with_book(asset_id, |state| {
            let best_bid = state.book.best_bid();
            let best_ask = state.book.best_ask();
            let (spread, mid_price) = match (&best_bid, &best_ask) {
                (Some(bid), Some(ask)) => (
                    Some(ask.price - bid.price),
                    Some((bid.price + ask.price) / Decimal::TWO),
                ),
                _ => (None, None),
            };
            TopOfBook {
                asset_id,
                best_bid,
                best_ask,
                spread,
                mid_price,
                last_price: state.last_price(),
            }
        })
    }

    /// Aggregated levels of one side, best first. `None` uses the configured
    /// default depth.
    pub fn depth(
        &self,
        asset_id: AssetId,
        side: Side,
        levels: Option<usize>,
    ) -> Result<Vec<DepthLevel>, EngineError> {
        let levels = levels.unwrap_or(self.default_depth);
        self.with_book(asset_id, |state| state.book.depth(side, levels))
    }

    pub fn snapshot(&self, asset_id: AssetId) -> Result<BookSummary, EngineError> {
        self.with_book(asset_id, |state| state.book.snapshot())
    }

    /// Every level of both sides
    pub fn order_book(&self, asset_id: AssetId) -> Result<OrderBookView, EngineError> {
        self.with_book(asset_id, |state| state.book.view(usize::MAX))
    }

    fn with_book<T>(
        &self,
        asset_id: AssetId,
        read: impl FnOnce(&BookState) -> T,
    ) -> Result<T, EngineError> {
        match self.registry.get(asset_id) {
            Some(asset_book) => {
                let state = asset_book.read(self.lock_timeout)?;
                Ok(read(&state))
            },
            None if self.assets.contains(asset_id) => {
                // known asset that has never seen an order
                let empty = BookState {
                    book: OrderBook::new(asset_id),
                    stops: StopBook::new(asset_id),
                    last_trade: None,
                };
                Ok(read(&empty))
            },
            None => Err(Rejection::new(
                RejectCode::UnknownAsset,
                format!("asset {asset_id} is not listed"),
            )
            .into()),
        }
    }
}
