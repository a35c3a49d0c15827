// ============================================================================
// Pending Stop Book
// Armed stop orders of one asset, waiting for their trigger
// ============================================================================

use std::collections::{BTreeMap, HashMap};

use super::order_book::BookError;
use super::{AssetId, Order, OrderId};
use crate::numeric::Price;

/// Armed STOP / STOP_LIMIT / TRAILING_STOP orders in acceptance order.
///
/// Armed stops are live (OPEN) but invisible to depth and top-of-book.
#[derive(Debug, Clone)]
pub struct StopBook {
    asset_id: AssetId,
    orders: BTreeMap<(u64, OrderId), Order>,
    index: HashMap<OrderId, u64>,
}

impl StopBook {
    pub fn new(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            orders: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn insert(&mut self, order: Order) -> Result<(), BookError> {
        if order.asset_id != self.asset_id {
            return Err(BookError::WrongAsset {
                order_id: order.id,
                order_asset: order.asset_id,
                book_asset: self.asset_id,
            });
        }
        if self.index.contains_key(&order.id) {
            return Err(BookError::Duplicate(order.id));
        }
        if !order.is_awaiting_trigger() || order.is_terminal() {
            return Err(BookError::NotRestable {
                id: order.id,
                reason: "only armed stop orders wait for a trigger",
            });
        }

        self.index.insert(order.id, order.sequence());
        self.orders.insert((order.sequence(), order.id), order);
        Ok(())
    }

    pub fn remove(&mut self, id: OrderId) -> Result<Order, BookError> {
        let sequence = self.index.remove(&id).ok_or(BookError::NotFound(id))?;
        self.orders
            .remove(&(sequence, id))
            .ok_or(BookError::NotFound(id))
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        let sequence = self.index.get(&id)?;
        self.orders.get(&(*sequence, id))
    }

    pub fn contains(&self, id: OrderId) -> bool {
        self.index.contains_key(&id)
    }

    /// Armed stops in acceptance order
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Move trailing stops with the last price, then pull out every stop
    /// whose trigger holds, in acceptance order.
    pub fn take_triggered(&mut self, last_price: Price) -> Vec<Order> {
        for order in self.orders.values_mut() {
            order.track_last_price(last_price);
        }

        let fired: Vec<(u64, OrderId)> = self
            .orders
            .iter()
            .filter(|(_, order)| order.stop_condition_met(last_price))
            .map(|(key, _)| *key)
            .collect();

        fired
            .into_iter()
            .filter_map(|key| {
                self.index.remove(&key.1);
                self.orders.remove(&key)
            })
            .collect()
    }
}
