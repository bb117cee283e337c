//! Order total computation.

use serde::{Deserialize, Serialize};

use super::discount::{AppliedCode, DiscountType, ManualDiscount};
use crate::money::Money;

/// The discount that ends up on an order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Discount {
    #[default]
    None,
    Code(AppliedCode),
    Manual(ManualDiscount),
}

/// Monetary fields of an order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub discount_amount: Money,
    pub manual_discount_amount: Money,
    pub discount_type: Option<DiscountType>,
    pub discount_code: Option<String>,
    pub discount_note: Option<String>,
    pub shipping_fee: Money,
    pub total_amount: Money,
}

/// Sums line totals.
pub fn subtotal(line_totals: impl IntoIterator<Item = Money>) -> Money {
    line_totals.into_iter().sum()
}

/// Applies `discount` and `shipping_fee` to `subtotal`.
///
/// The total never goes below zero.
pub fn compute_totals(subtotal: Money, discount: &Discount, shipping_fee: Money) -> Totals {
    let mut totals = Totals {
        subtotal,
        shipping_fee,
        ..Default::default()
    };

    match discount {
        Discount::None => {}
        Discount::Code(applied) => {
            totals.discount_amount = applied.amount;
            totals.discount_type = Some(applied.discount_type);
            totals.discount_code = Some(applied.code.clone());
        }
        Discount::Manual(manual) => {
            totals.manual_discount_amount = manual.amount;
            totals.discount_type = Some(manual.discount_type);
            totals.discount_note = manual.note.clone();
        }
    }

    totals.total_amount = (subtotal - (totals.discount_amount + totals.manual_discount_amount)
        + shipping_fee)
        .non_negative();
    totals
}
