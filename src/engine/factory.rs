// ============================================================================
// Engine Factory
// Wires a matching engine from its collaborators
// ============================================================================

use std::sync::Arc;

use crate::domain::{Asset, AssetCatalog, ConfigError, EngineConfig};
use crate::engine::{MatchingEngine, PriceTimePriority};
use crate::error::EngineError;
use crate::interfaces::{
    Clock, EventHandler, InMemoryOrderStore, LoggingEventHandler, MatchingAlgorithm, OrderStore,
    PortfolioLedger, SystemClock,
};

// ============================================================================
// Builder Pattern for Engine Configuration
// ============================================================================

/// Builder for creating matching engines with fluent API.
///
/// Only the portfolio ledger is required. The rest defaults to price/time
/// matching, an in-memory store, a logging event handler and the system
/// clock.
///
/// # Example
/// ```
/// use order_matching_engine::prelude::*;
/// use std::sync::Arc;
///
/// let engine = MatchingEngineBuilder::new()
///     .asset(Asset::new(AssetId(1), "ACME"))
///     .ledger(Arc::new(InMemoryLedger::new()))
///     .build()
///     .unwrap();
///
/// assert_eq!(engine.algorithm_name(), "PriceTime");
/// ```
pub struct MatchingEngineBuilder {
    config: EngineConfig,
    assets: Arc<AssetCatalog>,
    algorithm: Option<Box<dyn MatchingAlgorithm>>,
    ledger: Option<Arc<dyn PortfolioLedger>>,
    store: Option<Arc<dyn OrderStore>>,
    event_handler: Option<Arc<dyn EventHandler>>,
    clock: Option<Arc<dyn Clock>>,
}

impl MatchingEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            assets: Arc::new(AssetCatalog::new()),
            algorithm: None,
            ledger: None,
            store: None,
            event_handler: None,
            clock: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    // ========================================================================
    // Assets
    // ========================================================================

    /// Register one asset in the builder's catalog
    pub fn asset(self, asset: Asset) -> Self {
        self.assets.register(asset);
        self
    }

    /// Share an existing catalog, replacing anything registered so far
    pub fn assets(mut self, catalog: Arc<AssetCatalog>) -> Self {
        self.assets = catalog;
        self
    }

    // ========================================================================
    // Collaborators
    // ========================================================================

    pub fn algorithm(mut self, algorithm: Box<dyn MatchingAlgorithm>) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn PortfolioLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn store(mut self, store: Arc<dyn OrderStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Build the matching engine
    pub fn build(self) -> Result<MatchingEngine, EngineError> {
        let ledger = self
            .ledger
            .ok_or(ConfigError::MissingCollaborator("ledger"))?;

        MatchingEngine::new(
            self.config,
            self.assets,
            self.algorithm
                .unwrap_or_else(|| Box::new(PriceTimePriority::new())),
            ledger,
            self.store
                .unwrap_or_else(|| Arc::new(InMemoryOrderStore::new())),
            self.event_handler
                .unwrap_or_else(|| Arc::new(LoggingEventHandler)),
            self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        )
    }

    /// Get the configuration without building (for inspection)
    pub fn get_config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Default for MatchingEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
