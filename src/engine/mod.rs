// ============================================================================
// Engine Module
// Contains the core matching engine business logic
// ============================================================================

mod lifecycle;
mod matching_engine;
mod price_time;
mod recovery;
mod registry;
mod transaction;

pub mod factory;

pub use factory::MatchingEngineBuilder;
pub use lifecycle::{ForceMatchReport, OrderLifecycleManager};
pub use matching_engine::{Disposition, MatchingEngine, SubmitOutcome};
pub use price_time::PriceTimePriority;
pub use recovery::RecoveryReport;
pub use registry::{AssetBook, BookRegistry, BookState, LastTrade};
