// ============================================================================
// Market Data Module
// Read-only projections over the live books
// ============================================================================

mod view;

pub use view::{MarketDataView, TopOfBook};
