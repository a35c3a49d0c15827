// ============================================================================
// Asset Catalog
// Tradable instruments and their price/quantity increments
// ============================================================================

use super::AssetId;
use crate::numeric::{Price, Quantity};
use parking_lot::RwLock;
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A tradable asset
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Asset {
    pub id: AssetId,
    pub symbol: String,
    /// Orders for a non-tradable asset are rejected at validation
    pub tradable: bool,
    /// Minimum price increment, None means no tick size enforcement
    pub tick_size: Option<Price>,
    /// Minimum quantity increment, None means no lot size enforcement
    pub lot_size: Option<Quantity>,
}

impl Asset {
    pub fn new(id: AssetId, symbol: impl Into<String>) -> Self {
        Self {
            id,
            symbol: symbol.into(),
            tradable: true,
            tick_size: None,
            lot_size: None,
        }
    }

    /// Builder method: Set price tick size
    pub fn with_tick_size(mut self, tick: Price) -> Self {
        self.tick_size = Some(tick);
        self
    }

    /// Builder method: Set lot size
    pub fn with_lot_size(mut self, lot: Quantity) -> Self {
        self.lot_size = Some(lot);
        self
    }

    /// Builder method: Mark the asset as not tradable
    pub fn suspended(mut self) -> Self {
        self.tradable = false;
        self
    }
}

/// Registry of known assets, shared by the validator and the service layer
#[derive(Debug, Default)]
pub struct AssetCatalog {
    assets: RwLock<HashMap<AssetId, Asset>>,
}

impl AssetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assets(assets: impl IntoIterator<Item = Asset>) -> Self {
        let catalog = Self::new();
        for asset in assets {
            catalog.register(asset);
        }
        catalog
    }

    /// Register or replace an asset definition
    pub fn register(&self, asset: Asset) {
        self.assets.write().insert(asset.id, asset);
    }

    pub fn get(&self, id: AssetId) -> Option<Asset> {
        self.assets.read().get(&id).cloned()
    }

    pub fn contains(&self, id: AssetId) -> bool {
        self.assets.read().contains_key(&id)
    }

    /// Toggle tradability. Returns false if the asset is unknown.
    pub fn set_tradable(&self, id: AssetId, tradable: bool) -> bool {
        match self.assets.write().get_mut(&id) {
            Some(asset) => {
                asset.tradable = tradable;
                true
            },
            None => false,
        }
    }

    pub fn ids(&self) -> Vec<AssetId> {
        let mut ids: Vec<AssetId> = self.assets.read().keys().copied().collect();
        ids.sort();
        ids
    }
}
