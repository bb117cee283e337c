//! Order read model.

use chrono::{DateTime, NaiveDate, Utc};
use common::{OrderId, OrderItemId, ShipperId, UserId, VariantId};
use serde::{Deserialize, Serialize};

use super::state::{OrderStatus, PaymentStatus};
use crate::delivery::DeliveryStatus;
use crate::money::Money;
use crate::pricing::{self, Totals};

/// Formats a human readable order number, e.g. `ORD-20260314-000042`.
pub fn order_number(date: NaiveDate, sequence: i64) -> String {
    format!("ORD-{}-{sequence:06}", date.format("%Y%m%d"))
}

/// A customer order with its loaded relations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub status: OrderStatus,
    #[serde(flatten)]
    pub totals: Totals,
    pub payment_method: String,
    pub payment_status: PaymentStatus,
    pub notes: Option<String>,
    pub shipper_id: Option<ShipperId>,
    pub delivery_status: DeliveryStatus,
    pub estimated_delivery_time: Option<DateTime<Utc>>,
    pub delivery_notes: Option<String>,
    pub created_by: UserId,
    pub updated_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items_count: u32,
    /// Incremented on every header write.
    pub version: i64,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub status_history: Vec<OrderStatusHistory>,
}

impl Order {
    /// Sum of the loaded line totals.
    pub fn items_subtotal(&self) -> Money {
        pricing::subtotal(self.items.iter().map(OrderItem::line_total))
    }

    /// Returns true if the stored total matches the pricing formula.
    pub fn totals_consistent(&self) -> bool {
        let t = &self.totals;
        t.total_amount
            == (t.subtotal - (t.discount_amount + t.manual_discount_amount) + t.shipping_fee)
                .non_negative()
    }

    /// Looks up a line item by id.
    pub fn item(&self, id: OrderItemId) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.id == id)
    }
}

/// A priced line of an order.
///
/// Product and variant names and the unit price are frozen when the line is
/// created; later catalog edits do not change them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub variant_id: VariantId,
    pub product_name: String,
    pub variant_name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub total_price: Money,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// One row of the append-only status log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusHistory {
    pub status: OrderStatus,
    /// `None` only for the row written at creation.
    pub previous_status: Option<OrderStatus>,
    pub notes: Option<String>,
    pub changed_by: UserId,
    pub created_at: DateTime<Utc>,
}

/// Catalog data captured when a variant is added to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantSnapshot {
    pub variant_id: VariantId,
    pub product_name: String,
    pub variant_name: String,
    pub price: Money,
}
