//! Pricing and discount engine.
//!
//! Pure functions: given line totals, an optional discount and a shipping
//! fee, produce the monetary fields of an order. Nothing here touches the
//! store; redeeming a code (incrementing its usage) is the caller's job.

mod discount;
mod totals;

pub use discount::{
    AppliedCode, CodeRejection, DiscountCode, DiscountIntent, DiscountRequest, DiscountType,
    DiscountValidation, ManualDiscount, evaluate_code,
};
pub use totals::{Discount, Totals, compute_totals, subtotal};
