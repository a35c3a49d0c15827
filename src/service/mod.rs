// ============================================================================
// Service Module
// Transport-independent request/response facade
// ============================================================================

mod api;
mod error;

pub use api::{OrderBookResponse, OrderResponse, ReplaceOrderRequest, TradingService};
pub use error::ApiError;

#[cfg(feature = "serde")]
pub use api::to_json;
