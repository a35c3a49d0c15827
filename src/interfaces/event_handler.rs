// ============================================================================
// Event Handler Interface
// Defines the contract for handling order and trade events
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::domain::{AssetId, ExecutionType, OrderId, Trade, TradeId};
use crate::error::RejectCode;
use crate::numeric::{Price, Quantity};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Why a live order stopped being live without executing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum CancelReason {
    User,
    /// IOC remainder
    ImmediateOrCancel,
    /// FOK that could not fill completely
    FillOrKill,
    /// DAY order past its session close
    Expired,
    /// Bulk purge by cutoff date
    Purged,
    Replaced,
}

/// Events emitted by the matching engine, after the state they describe has
/// been committed
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrderEvent {
    /// Order accepted and validated
    OrderAccepted {
        order_id: OrderId,
        asset_id: AssetId,
        sequence: u64,
        timestamp: DateTime<Utc>,
    },

    /// Order rejected with reason
    OrderRejected {
        order_id: Option<OrderId>,
        code: RejectCode,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Order added to book
    OrderRested {
        order_id: OrderId,
        asset_id: AssetId,
        price: Price,
        quantity: Quantity,
        timestamp: DateTime<Utc>,
    },

    /// Stop order waiting for its trigger
    StopArmed {
        order_id: OrderId,
        asset_id: AssetId,
        stop_price: Price,
        timestamp: DateTime<Utc>,
    },

    StopTriggered {
        order_id: OrderId,
        asset_id: AssetId,
        last_price: Price,
        timestamp: DateTime<Utc>,
    },

    /// Order matched, trade generated
    TradeExecuted {
        trade: Trade,
        execution_type: ExecutionType,
    },

    /// Order partially filled
    OrderPartiallyFilled {
        order_id: OrderId,
        filled_quantity: Quantity,
        remaining_quantity: Quantity,
        timestamp: DateTime<Utc>,
    },

    /// Order fully filled
    OrderFilled {
        order_id: OrderId,
        total_filled: Quantity,
        average_price: Option<Price>,
        timestamp: DateTime<Utc>,
    },

    /// Order cancelled
    OrderCancelled {
        order_id: OrderId,
        reason: CancelReason,
        remaining_quantity: Quantity,
        timestamp: DateTime<Utc>,
    },

    OrderReplaced {
        original_id: OrderId,
        replacement_id: OrderId,
        timestamp: DateTime<Utc>,
    },

    /// Matching halted for an asset after a partially applied settlement
    CriticalAlert {
        asset_id: AssetId,
        reason: String,
        trade_ids: Vec<TradeId>,
        timestamp: DateTime<Utc>,
    },

    AssetResumed {
        asset_id: AssetId,
        timestamp: DateTime<Utc>,
    },
}

/// Event handler trait for processing matching engine events
/// Implementations can handle logging, metrics, notifications, etc.
pub trait EventHandler: Send + Sync {
    /// Handle an order event
    fn on_event(&self, event: OrderEvent);

    /// Batch event handler (optional optimization)
    fn on_events(&self, events: Vec<OrderEvent>) {
        for event in events {
            self.on_event(event);
        }
    }
}

/// No-op event handler for testing
pub struct NoOpEventHandler;

impl EventHandler for NoOpEventHandler {
    fn on_event(&self, _event: OrderEvent) {
        // Do nothing
    }
}

/// Logging event handler
pub struct LoggingEventHandler;

impl EventHandler for LoggingEventHandler {
    fn on_event(&self, event: OrderEvent) {
        match &event {
            OrderEvent::CriticalAlert { .. } => {
                tracing::error!("Matching engine event: {:?}", event)
            },
            _ => tracing::debug!("Matching engine event: {:?}", event),
        }
    }
}

/// Publishes events onto a bounded crossbeam channel.
///
/// Never blocks the matching thread: when the consumer falls behind the
/// event is dropped and counted.
pub struct ChannelEventHandler {
    sender: Sender<OrderEvent>,
    dropped: AtomicU64,
}

impl ChannelEventHandler {
    pub fn bounded(capacity: usize) -> (Self, Receiver<OrderEvent>) {
        let (sender, receiver) = channel::bounded(capacity);
        (
            Self {
                sender,
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// Events lost to a full or disconnected channel
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventHandler for ChannelEventHandler {
    fn on_event(&self, event: OrderEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {},
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("event channel full, dropping {:?}", event);
            },
            Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted() -> OrderEvent {
        OrderEvent::OrderAccepted {
            order_id: OrderId::new(),
            asset_id: AssetId(1),
            sequence: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_noop_handler() {
        let handler = NoOpEventHandler;
        handler.on_event(accepted());
        // Should not panic
    }

    #[test]
    fn test_channel_handler_delivers_in_order() {
        let (handler, receiver) = ChannelEventHandler::bounded(4);
        let first = accepted();
        let second = accepted();
        handler.on_events(vec![first.clone(), second.clone()]);

        assert_eq!(receiver.try_recv().unwrap(), first);
        assert_eq!(receiver.try_recv().unwrap(), second);
    }

    #[test]
    fn test_channel_handler_drops_when_full() {
        let (handler, receiver) = ChannelEventHandler::bounded(1);
        handler.on_event(accepted());
        handler.on_event(accepted());

        assert_eq!(handler.dropped(), 1);
        assert_eq!(receiver.len(), 1);
    }
}
