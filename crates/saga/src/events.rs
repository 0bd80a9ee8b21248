//! Cart events and their queue envelope.

use chrono::{DateTime, Utc};
use common::CorrelationId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events that drive a shopping cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CartEvent {
    /// The customer put an item in the cart.
    ItemAdded(ItemAddedData),

    /// The cart was turned into an order.
    OrderSubmitted(OrderSubmittedData),

    /// The cart's expiry timer fired.
    CartExpired,
}

impl CartEvent {
    pub fn item_added(user_name: impl Into<String>) -> Self {
        CartEvent::ItemAdded(ItemAddedData {
            user_name: user_name.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn order_submitted(order_id: Uuid) -> Self {
        CartEvent::OrderSubmitted(OrderSubmittedData { order_id })
    }

    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            CartEvent::ItemAdded(_) => "ItemAdded",
            CartEvent::OrderSubmitted(_) => "OrderSubmitted",
            CartEvent::CartExpired => "CartExpired",
        }
    }
}

/// Data for ItemAdded event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAddedData {
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
}

/// Data for OrderSubmitted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSubmittedData {
    pub order_id: Uuid,
}

/// A cart event addressed to one cart, as carried on the cart-state queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartEnvelope {
    pub correlation_id: CorrelationId,
    pub event: CartEvent,
}

impl CartEnvelope {
    pub fn new(correlation_id: CorrelationId, event: CartEvent) -> Self {
        Self {
            correlation_id,
            event,
        }
    }

    /// JSON bytes for the queue.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
