//! Orders: read model, requests, status machine and item reconciliation.

mod commands;
mod model;
mod reconcile;
mod state;

pub use commands::{
    ChangeOrderStatus, CreateOrder, MAX_QUANTITY, OrderItemInput, UpdateOrder, UpdateOrderItem,
};
pub use model::{Order, OrderItem, OrderStatusHistory, VariantSnapshot, order_number};
pub use reconcile::{ItemPlan, NewLine, plan_item_changes};
pub use state::{OrderStatus, PAYMENT_METHODS, PaymentStatus};
