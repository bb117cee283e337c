//! Quantity accounting for split shipments.
//!
//! Across every shipment that still holds its quantity, the amount shipped
//! for an order line never exceeds the amount ordered.

use std::collections::HashMap;

use common::OrderItemId;

use super::model::{DeliveryOrder, DeliveryOrderItem, ShipmentGroup};
use crate::error::{DomainError, Result};
use crate::order::{MAX_QUANTITY, Order};

/// Shipped quantity per order line.
pub type ShippedQuantities = HashMap<OrderItemId, u32>;

/// Totals the quantities held by `deliveries`.
pub fn shipped_quantities<'a>(
    deliveries: impl IntoIterator<Item = &'a DeliveryOrder>,
) -> ShippedQuantities {
    let mut shipped = ShippedQuantities::new();
    for delivery in deliveries
        .into_iter()
        .filter(|d| d.status.holds_quantity())
    {
        for item in &delivery.items {
            let held = shipped.entry(item.order_item_id).or_default();
            *held = held.saturating_add(item.quantity);
        }
    }
    shipped
}

/// Checks that `groups` fit in what is left of `order` after `shipped`.
pub fn check_shipments(
    order: &Order,
    shipped: &ShippedQuantities,
    groups: &[ShipmentGroup],
) -> Result<()> {
    let mut requested: HashMap<OrderItemId, u64> = HashMap::new();

    for group in groups {
        if group.items.is_empty() {
            return Err(DomainError::validation(
                "items",
                "a delivery must contain at least one item",
            ));
        }
        for item in &group.items {
            if item.quantity == 0 {
                return Err(DomainError::validation(
                    "quantity",
                    "delivery quantity must be greater than 0",
                ));
            }
            if item.quantity > MAX_QUANTITY {
                return Err(DomainError::validation(
                    "quantity",
                    format!("delivery quantity cannot exceed {MAX_QUANTITY}"),
                ));
            }
            if order.item(item.order_item_id).is_none() {
                return Err(DomainError::validation(
                    "order_item_id",
                    format!(
                        "item {} does not belong to order {}",
                        item.order_item_id, order.order_number
                    ),
                ));
            }
            *requested.entry(item.order_item_id).or_default() += u64::from(item.quantity);
        }
    }

    for (id, quantity) in &requested {
        let Some(line) = order.item(*id) else {
            continue;
        };
        let already = shipped.get(id).copied().unwrap_or(0);
        let remaining = line.quantity.saturating_sub(already);
        if *quantity > u64::from(remaining) {
            return Err(DomainError::validation(
                "quantity",
                format!(
                    "cannot ship {quantity} of {} {}: only {remaining} left to ship",
                    line.product_name, line.variant_name
                ),
            ));
        }
    }

    Ok(())
}

/// Every line quantity of `order` not yet held by a shipment.
pub fn unshipped_items(order: &Order, shipped: &ShippedQuantities) -> Vec<DeliveryOrderItem> {
    order
        .items
        .iter()
        .filter_map(|line| {
            let remaining = line
                .quantity
                .saturating_sub(shipped.get(&line.id).copied().unwrap_or(0));
            (remaining > 0).then_some(DeliveryOrderItem {
                order_item_id: line.id,
                quantity: remaining,
            })
        })
        .collect()
}
