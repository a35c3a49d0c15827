// ============================================================================
// Domain Models Module
// Contains all core domain entities and value objects
// ============================================================================

pub mod asset;
pub mod config;
pub mod execution;
pub mod ids;
pub mod order;
pub mod order_book;
pub mod stop_book;

#[cfg(test)]
pub(crate) mod fixtures;

pub use asset::{Asset, AssetCatalog};
pub use config::{ConfigError, EngineConfig, RetryPolicy};
pub use execution::{Execution, ExecutionType, LiquiditySide, Trade};
pub use ids::{AssetId, ExecutionId, OrderId, PortfolioId, TradeId};
pub use order::{Order, OrderError, OrderKind, OrderType, Side, TimeInForce};
pub use order_book::{
    BestLevel, BookError, BookSide, BookSummary, DepthLevel, FillEstimate, OrderBook,
    OrderBookView, PriceLevel,
};
pub use stop_book::StopBook;

// Re-export state machine
pub use order::state::{InvalidTransition, OrderStatus, OrderStatusTransition};
