//! Messages pushed to observers.

use serde::{Deserialize, Serialize};

/// Kind of a hub message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    OrderUpdate,
    DeliveryUpdate,
    Notification,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderUpdate => "order_update",
            EventType::DeliveryUpdate => "delivery_update",
            EventType::Notification => "notification",
        }
    }
}

/// A message as it appears on the wire: `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: serde_json::Value,
}

impl HubEvent {
    pub fn new(event_type: EventType, payload: serde_json::Value) -> Self {
        Self {
            event_type,
            payload,
        }
    }

    /// Snapshots `entity` as the payload.
    pub fn from_entity<T: Serialize>(
        event_type: EventType,
        entity: &T,
    ) -> serde_json::Result<Self> {
        Ok(Self::new(event_type, serde_json::to_value(entity)?))
    }

    /// A free-form notification.
    pub fn notification(message: impl Into<String>) -> Self {
        Self::new(
            EventType::Notification,
            serde_json::json!({ "message": message.into() }),
        )
    }
}
