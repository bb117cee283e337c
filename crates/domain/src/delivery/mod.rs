//! Deliveries: shipments, their status machine and split accounting.

mod model;
mod split;
mod state;

pub use model::{
    AssignShipper, ChangeDeliveryStatus, CreateDelivery, DeliveryOrder, DeliveryOrderItem,
    ShipmentGroup, SplitOrder, UpdateDelivery, delivery_number,
};
pub use split::{ShippedQuantities, check_shipments, shipped_quantities, unshipped_items};
pub use state::DeliveryStatus;
