// ============================================================================
// Book Registry
// Explicit asset -> book map; one lock per asset
// ============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_skiplist::SkipMap;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::domain::{AssetId, OrderBook, StopBook};
use crate::error::EngineError;
use crate::numeric::Price;

/// Price and time of the most recent trade on an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LastTrade {
    pub price: Price,
    pub timestamp: DateTime<Utc>,
}

/// Everything guarded by one asset's lock
#[derive(Debug, Clone)]
pub struct BookState {
    pub book: OrderBook,
    pub stops: StopBook,
    pub last_trade: Option<LastTrade>,
}

impl BookState {
    fn new(asset_id: AssetId) -> Self {
        Self {
            book: OrderBook::new(asset_id),
            stops: StopBook::new(asset_id),
            last_trade: None,
        }
    }

    pub fn last_price(&self) -> Option<Price> {
        self.last_trade.map(|trade| trade.price)
    }
}

/// One asset's book behind its own reader/writer lock.
///
/// The halt flag lives outside the lock so a halted asset refuses work
/// without queueing for it.
#[derive(Debug)]
pub struct AssetBook {
    asset_id: AssetId,
    state: RwLock<BookState>,
    halted: AtomicBool,
    halt_reason: Mutex<Option<String>>,
}

impl AssetBook {
    fn new(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            state: RwLock::new(BookState::new(asset_id)),
            halted: AtomicBool::new(false),
            halt_reason: Mutex::new(None),
        }
    }

    pub fn asset_id(&self) -> AssetId {
        self.asset_id
    }

    /// Exclusive access for one mutation, bounded by `timeout`
    pub fn write(&self, timeout: Duration) -> Result<RwLockWriteGuard<'_, BookState>, EngineError> {
        self.state.try_write_for(timeout).ok_or_else(|| {
            tracing::warn!(asset = %self.asset_id, ?timeout, "book write lock timed out");
            EngineError::ConcurrencyTimeout {
                asset: self.asset_id,
            }
        })
    }

    /// Shared access for a consistent read, bounded by `timeout`
    pub fn read(&self, timeout: Duration) -> Result<RwLockReadGuard<'_, BookState>, EngineError> {
        self.state.try_read_for(timeout).ok_or_else(|| {
            tracing::warn!(asset = %self.asset_id, ?timeout, "book read lock timed out");
            EngineError::ConcurrencyTimeout {
                asset: self.asset_id,
            }
        })
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    pub fn halt_reason(&self) -> Option<String> {
        self.halt_reason.lock().clone()
    }

    /// Refuse mutations while halted
    pub fn ensure_active(&self) -> Result<(), EngineError> {
        if self.is_halted() {
            return Err(EngineError::AssetHalted {
                asset: self.asset_id,
                reason: self.halt_reason().unwrap_or_default(),
            });
        }
        Ok(())
    }

    pub(crate) fn halt(&self, reason: impl Into<String>) {
        *self.halt_reason.lock() = Some(reason.into());
        self.halted.store(true, Ordering::Release);
    }

    /// Returns false if the asset was not halted
    pub(crate) fn resume(&self) -> bool {
        let was_halted = self.halted.swap(false, Ordering::AcqRel);
        *self.halt_reason.lock() = None;
        was_halted
    }
}

/// Lock-free registry of per-asset books, created on first reference
#[derive(Debug)]
pub struct BookRegistry {
    books: SkipMap<AssetId, Arc<AssetBook>>,
    lock_timeout: Duration,
}

impl BookRegistry {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            books: SkipMap::new(),
            lock_timeout,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Book for an asset, creating an empty one if needed
    pub fn book(&self, asset_id: AssetId) -> Arc<AssetBook> {
        let entry = self
            .books
            .get_or_insert_with(asset_id, || Arc::new(AssetBook::new(asset_id)));
        Arc::clone(entry.value())
    }

    /// Book for an asset, if one was ever created
    pub fn get(&self, asset_id: AssetId) -> Option<Arc<AssetBook>> {
        self.books.get(&asset_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Assets with a book, in ascending id order
    pub fn assets(&self) -> Vec<AssetId> {
        self.books.iter().map(|entry| *entry.key()).collect()
    }

    pub fn books(&self) -> Vec<Arc<AssetBook>> {
        self.books
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
