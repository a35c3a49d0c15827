// ============================================================================
// Engine Errors
// Rejections, lookups, lock timeouts and settlement faults
// ============================================================================

use std::fmt;

use thiserror::Error;

use crate::domain::{AssetId, BookError, ConfigError, Order, OrderError, OrderId, OrderStatus, TradeId};
use crate::interfaces::{LedgerError, StoreError};
use crate::numeric::NumericError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Machine-readable reason an order was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum RejectCode {
    UnknownAsset,
    AssetNotTradable,
    InvalidQuantity,
    InvalidLotSize,
    InvalidPrice,
    InvalidTickSize,
    InvalidStopPrice,
    UnexpectedPrice,
    IllegalTimeInForce,
    UnknownPortfolio,
    InsufficientFunds,
    InsufficientHoldings,
    InsufficientLiquidity,
    InvalidReplace,
}

impl RejectCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectCode::UnknownAsset => "UNKNOWN_ASSET",
            RejectCode::AssetNotTradable => "ASSET_NOT_TRADABLE",
            RejectCode::InvalidQuantity => "INVALID_QUANTITY",
            RejectCode::InvalidLotSize => "INVALID_LOT_SIZE",
            RejectCode::InvalidPrice => "INVALID_PRICE",
            RejectCode::InvalidTickSize => "INVALID_TICK_SIZE",
            RejectCode::InvalidStopPrice => "INVALID_STOP_PRICE",
            RejectCode::UnexpectedPrice => "UNEXPECTED_PRICE",
            RejectCode::IllegalTimeInForce => "ILLEGAL_TIME_IN_FORCE",
            RejectCode::UnknownPortfolio => "UNKNOWN_PORTFOLIO",
            RejectCode::InsufficientFunds => "INSUFFICIENT_FUNDS",
            RejectCode::InsufficientHoldings => "INSUFFICIENT_HOLDINGS",
            RejectCode::InsufficientLiquidity => "INSUFFICIENT_LIQUIDITY",
            RejectCode::InvalidReplace => "INVALID_REPLACE",
        }
    }
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A business rejection: reason code, message and, when the order got far
/// enough to be recorded, its REJECTED record.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{code}: {message}")]
pub struct Rejection {
    pub code: RejectCode,
    pub message: String,
    pub order: Option<Box<Order>>,
}

impl Rejection {
    pub fn new(code: RejectCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            order: None,
        }
    }

    pub fn with_order(mut self, order: Order) -> Self {
        self.order = Some(Box::new(order));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("order rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("order {order_id} already terminal ({status})")]
    AlreadyTerminal { order_id: OrderId, status: OrderStatus },

    #[error("timed out waiting for the book of asset {asset}")]
    ConcurrencyTimeout { asset: AssetId },

    #[error("settlement inconsistency on asset {asset}: {reason}")]
    SettlementInconsistency {
        asset: AssetId,
        reason: String,
        trade_ids: Vec<TradeId>,
    },

    #[error("asset {asset} is halted: {reason}")]
    AssetHalted { asset: AssetId, reason: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Machine-readable code for the request boundary
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Rejected(rejection) => rejection.code.as_str(),
            EngineError::NotFound(_) => "NOT_FOUND",
            EngineError::AlreadyTerminal { .. } => "ALREADY_TERMINAL",
            EngineError::ConcurrencyTimeout { .. } => "CONCURRENCY_TIMEOUT",
            EngineError::SettlementInconsistency { .. } => "SETTLEMENT_INCONSISTENCY",
            EngineError::AssetHalted { .. } => "ASSET_HALTED",
            EngineError::Store(_) => "STORE_ERROR",
            EngineError::Ledger(_) => "LEDGER_ERROR",
            EngineError::Config(_) => "CONFIG_ERROR",
            EngineError::Internal(_) => "INTERNAL",
        }
    }

    /// Only lock timeouts are safe to retry; nothing was mutated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ConcurrencyTimeout { .. })
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            EngineError::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

impl From<OrderError> for EngineError {
    fn from(err: OrderError) -> Self {
        EngineError::Internal(err.to_string())
    }
}

impl From<BookError> for EngineError {
    fn from(err: BookError) -> Self {
        match err {
            BookError::NotFound(id) => EngineError::NotFound(id),
            other => EngineError::Internal(other.to_string()),
        }
    }
}

impl From<NumericError> for EngineError {
    fn from(err: NumericError) -> Self {
        EngineError::Internal(err.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
