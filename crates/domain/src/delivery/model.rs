//! Delivery shipments and their requests.

use chrono::{DateTime, NaiveDate, Utc};
use common::{DeliveryId, OrderId, OrderItemId, ShipperId, UserId};
use serde::{Deserialize, Serialize};

use super::state::DeliveryStatus;
use crate::error::{DomainError, Result};

/// Formats a human readable delivery number, e.g. `DLV-20260314-000007`.
pub fn delivery_number(date: NaiveDate, sequence: i64) -> String {
    format!("DLV-{}-{sequence:06}", date.format("%Y%m%d"))
}

/// A shipment carrying some or all of an order's items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOrder {
    pub id: DeliveryId,
    pub order_id: OrderId,
    pub shipper_id: ShipperId,
    pub delivery_number: String,
    pub status: DeliveryStatus,
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    pub actual_delivery_time: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_by: UserId,
    pub updated_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<DeliveryOrderItem>,
}

impl DeliveryOrder {
    /// Moves to `next`, stamping the delivery time when it arrives.
    pub fn apply_status(&mut self, next: DeliveryStatus, at: DateTime<Utc>) -> Result<()> {
        self.status = self.status.transition_to(next)?;
        if next == DeliveryStatus::Delivered && self.actual_delivery_time.is_none() {
            self.actual_delivery_time = Some(at);
        }
        Ok(())
    }
}

/// Quantity of one order line carried by a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOrderItem {
    pub order_item_id: OrderItemId,
    pub quantity: u32,
}

/// One group of lines to ship together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentGroup {
    pub shipper_id: ShipperId,
    #[serde(default)]
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<DeliveryOrderItem>,
}

/// Create a single shipment for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDelivery {
    pub order_id: OrderId,
    #[serde(flatten)]
    pub shipment: ShipmentGroup,
}

/// Partial update of a shipment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDelivery {
    #[serde(default)]
    pub shipper_id: Option<ShipperId>,
    #[serde(default)]
    pub status: Option<DeliveryStatus>,
    #[serde(default)]
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub actual_delivery_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Move a shipment to another status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDeliveryStatus {
    pub status: DeliveryStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Hand an order to a shipper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignShipper {
    pub shipper_id: ShipperId,
    #[serde(default)]
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Create a shipment record instead of stamping the order directly.
    #[serde(default)]
    pub split: bool,
}

impl AssignShipper {
    pub fn direct(shipper_id: ShipperId) -> Self {
        Self {
            shipper_id,
            estimated_delivery_time: None,
            notes: None,
            split: false,
        }
    }
}

/// Split an order into several shipments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitOrder {
    pub deliveries: Vec<ShipmentGroup>,
}

impl SplitOrder {
    pub fn validate(&self) -> Result<()> {
        if self.deliveries.is_empty() {
            return Err(DomainError::validation(
                "deliveries",
                "at least one delivery is required",
            ));
        }
        Ok(())
    }
}
