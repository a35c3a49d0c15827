// ============================================================================
// Interfaces Module
// Contains all trait definitions and contracts
// ============================================================================

mod clock;
mod event_handler;
mod ledger;
mod matching_algorithm;
mod persistence;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event_handler::{
    CancelReason, ChannelEventHandler, EventHandler, LoggingEventHandler, NoOpEventHandler,
    OrderEvent,
};
pub use ledger::{InMemoryLedger, LedgerError, PortfolioLedger, Reservation, Settlement};
pub use matching_algorithm::{Fill, Fills, MatchingAlgorithm};
pub use persistence::{CommitBatch, InMemoryOrderStore, OrderStore, StoreError};
