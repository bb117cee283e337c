//! Shared identifier types for the order and delivery services.

pub mod types;

pub use types::{DeliveryId, OrderId, OrderItemId, ShipperId, UserId, VariantId};
