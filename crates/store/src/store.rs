use async_trait::async_trait;
use common::{DeliveryId, OrderId, OrderItemId, ShipperId, UserId, VariantId};
use domain::order::VariantSnapshot;
use domain::query::{DateRange, OrderStatistics};
use domain::{
    DeliveryOrder, DeliveryQuery, DiscountCode, GuestContact, Order, OrderItem, OrderQuery,
    OrderStatusHistory, Page, Shipper, UserIdentity,
};

use crate::Result;

/// Entry point to persistence.
///
/// Reads that need no consistency with a write are served directly; every
/// mutation goes through a [`StoreTx`] obtained from [`Store::begin`].
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    /// Opens a transaction.
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    /// Loads an order with its items and status history.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Lists order headers matching `query`. Relations are not loaded.
    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>>;

    /// Computes statistics over `range`, leaving `recent_orders` empty.
    async fn order_statistics(&self, range: &DateRange) -> Result<OrderStatistics>;

    /// The latest `limit` order headers created within `range`.
    async fn recent_orders(&self, range: &DateRange, limit: u32) -> Result<Vec<Order>>;

    async fn find_discount_code(&self, code: &str) -> Result<Option<DiscountCode>>;

    async fn get_delivery(&self, id: DeliveryId) -> Result<Option<DeliveryOrder>>;

    async fn list_deliveries(&self, query: &DeliveryQuery) -> Result<Page<DeliveryOrder>>;

    async fn deliveries_for_order(&self, id: OrderId) -> Result<Vec<DeliveryOrder>>;

    /// Active shippers ordered by name.
    async fn active_shippers(&self) -> Result<Vec<Shipper>>;
}

/// A single unit of work.
///
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait StoreTx: Send {
    // Collaborators

    /// Looks up a variant with its product name and current price.
    async fn resolve_variant(&mut self, id: VariantId) -> Result<Option<VariantSnapshot>>;

    /// Finds a user by phone or email, filling in missing contact fields, or
    /// creates a guest.
    async fn resolve_or_create_guest(&mut self, contact: &GuestContact) -> Result<UserIdentity>;

    async fn resolve_user(&mut self, id: UserId) -> Result<Option<UserIdentity>>;

    async fn find_shipper(&mut self, id: ShipperId) -> Result<Option<Shipper>>;

    // Discount codes

    /// Reads a code and locks it until the transaction ends.
    async fn lock_discount_code(&mut self, code: &str) -> Result<Option<DiscountCode>>;

    async fn increment_discount_usage(&mut self, code: &str) -> Result<()>;

    // Orders

    /// Next value of the order number sequence.
    async fn next_order_number(&mut self) -> Result<i64>;

    /// Inserts the order header. Items and history are written separately.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Loads an order with items and history, locking its header row.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    /// Writes every header field of `order`.
    async fn update_order(&mut self, order: &Order) -> Result<()>;

    async fn insert_item(&mut self, order: OrderId, item: &OrderItem) -> Result<()>;

    /// Writes quantity, notes and total of an existing line.
    async fn update_item(&mut self, order: OrderId, item: &OrderItem) -> Result<()>;

    async fn delete_item(&mut self, order: OrderId, item: OrderItemId) -> Result<()>;

    /// Live row count of the order's items.
    async fn count_items(&mut self, order: OrderId) -> Result<u32>;

    async fn append_status_history(
        &mut self,
        order: OrderId,
        entry: &OrderStatusHistory,
    ) -> Result<()>;

    // Deliveries

    async fn next_delivery_number(&mut self) -> Result<i64>;

    /// Every shipment of `order`, with items.
    async fn order_deliveries(&mut self, order: OrderId) -> Result<Vec<DeliveryOrder>>;

    /// Inserts a shipment together with its items.
    async fn insert_delivery(&mut self, delivery: &DeliveryOrder) -> Result<()>;

    async fn lock_delivery(&mut self, id: DeliveryId) -> Result<Option<DeliveryOrder>>;

    /// Writes every header field of `delivery`.
    async fn update_delivery(&mut self, delivery: &DeliveryOrder) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
