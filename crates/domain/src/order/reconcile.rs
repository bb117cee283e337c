//! Line item reconciliation for order updates.
//!
//! Given the stored lines `O` and the submitted lines `N`, lines in both
//! are updated in place, lines only in `N` are inserted and lines only in
//! `O` are deleted. Updated lines keep their frozen unit price.

use std::collections::HashSet;

use common::{OrderId, OrderItemId, VariantId};

use super::commands::UpdateOrderItem;
use super::model::OrderItem;
use crate::error::{DomainError, Result};

/// A line to insert, priced later from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLine {
    pub variant_id: VariantId,
    pub quantity: u32,
    pub notes: Option<String>,
}

/// The writes needed to turn `O` into `N`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPlan {
    /// Existing lines with new quantity, notes and total.
    pub updates: Vec<OrderItem>,
    pub inserts: Vec<NewLine>,
    pub removals: Vec<OrderItemId>,
}

impl ItemPlan {
    /// Number of lines the order holds once the plan is applied.
    pub fn resulting_count(&self) -> usize {
        self.updates.len() + self.inserts.len()
    }
}

/// Plans the item writes for an update of `order`.
pub fn plan_item_changes(
    order: OrderId,
    existing: &[OrderItem],
    submitted: &[UpdateOrderItem],
) -> Result<ItemPlan> {
    let mut plan = ItemPlan::default();
    let mut kept = HashSet::new();

    for line in submitted {
        match line.id {
            Some(id) => {
                if !kept.insert(id) {
                    return Err(DomainError::validation(
                        "items",
                        format!("order item {id} submitted more than once"),
                    ));
                }
                let current = existing
                    .iter()
                    .find(|item| item.id == id)
                    .ok_or_else(|| {
                        DomainError::not_found("order item", format!("{id} in order {order}"))
                    })?;

                let mut updated = current.clone();
                updated.quantity = line.quantity;
                updated.notes = line.notes.clone();
                updated.total_price = updated.line_total();
                plan.updates.push(updated);
            }
            None => {
                let variant_id = line.variant_id.ok_or_else(|| {
                    DomainError::validation("items", "new order items must specify a variant")
                })?;
                plan.inserts.push(NewLine {
                    variant_id,
                    quantity: line.quantity,
                    notes: line.notes.clone(),
                });
            }
        }
    }

    plan.removals = existing
        .iter()
        .map(|item| item.id)
        .filter(|id| !kept.contains(id))
        .collect();

    Ok(plan)
}
