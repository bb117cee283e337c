//! Domain layer for the order and delivery services.
//!
//! This crate holds the pure business rules:
//! - Pricing and discount engine
//! - Order status and delivery status state machines
//! - Line item reconciliation for order updates
//! - Quantity accounting for split shipments
//! - Listing queries and statistics
//!
//! Nothing here performs I/O; the `store` and `services` crates drive these
//! rules inside transactions.

pub mod delivery;
pub mod error;
pub mod money;
pub mod order;
pub mod pricing;
pub mod query;
pub mod shipper;
pub mod user;

pub use delivery::{DeliveryOrder, DeliveryOrderItem, DeliveryStatus};
pub use error::DomainError;
pub use money::Money;
pub use order::{Order, OrderItem, OrderStatus, OrderStatusHistory, PaymentStatus};
pub use pricing::{DiscountCode, DiscountType, Totals};
pub use query::{DeliveryQuery, OrderQuery, Page, Pagination};
pub use shipper::Shipper;
pub use user::{GuestContact, UserIdentity};
