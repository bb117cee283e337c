use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{DeliveryId, OrderId, OrderItemId, ShipperId, UserId, VariantId};
use domain::order::VariantSnapshot;
use domain::query::{DateRange, DeliverySortField, OrderSortField, OrderStatistics, SortOrder};
use domain::{
    DeliveryOrder, DeliveryQuery, DiscountCode, GuestContact, Order, OrderItem, OrderQuery,
    OrderStatusHistory, Page, Shipper, UserIdentity,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    Result, StoreError,
    store::{Store, StoreTx},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: Vec<UserIdentity>,
    variants: HashMap<VariantId, VariantSnapshot>,
    shippers: HashMap<ShipperId, Shipper>,
    discount_codes: HashMap<String, DiscountCode>,
    orders: Vec<Order>,
    deliveries: Vec<DeliveryOrder>,
    order_sequence: i64,
    delivery_sequence: i64,
}

impl MemoryState {
    fn order(&self, id: OrderId) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == id)
    }

    fn order_mut(&mut self, id: OrderId) -> Result<&mut Order> {
        self.orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| StoreError::not_found("order", id))
    }
}

/// Header-only copy of an order, as listings return it.
fn header(order: &Order) -> Order {
    Order {
        items: Vec::new(),
        status_history: Vec::new(),
        ..order.clone()
    }
}

fn compare_orders(a: &Order, b: &Order, field: OrderSortField) -> Ordering {
    match field {
        OrderSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        OrderSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        OrderSortField::OrderNumber => a.order_number.cmp(&b.order_number),
        OrderSortField::CustomerName => a.customer_name.cmp(&b.customer_name),
        OrderSortField::TotalAmount => a.totals.total_amount.cmp(&b.totals.total_amount),
        OrderSortField::Status => a.status.as_str().cmp(b.status.as_str()),
    }
}

fn compare_deliveries(a: &DeliveryOrder, b: &DeliveryOrder, field: DeliverySortField) -> Ordering {
    match field {
        DeliverySortField::CreatedAt => a.created_at.cmp(&b.created_at),
        DeliverySortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        DeliverySortField::EstimatedDeliveryTime => {
            a.estimated_delivery_time.cmp(&b.estimated_delivery_time)
        }
        DeliverySortField::Status => a.status.as_str().cmp(b.status.as_str()),
    }
}

fn paginate<T>(mut rows: Vec<T>, pagination: domain::Pagination) -> Page<T> {
    let total = rows.len() as u64;
    let start = (pagination.offset() as usize).min(rows.len());
    let end = (start + pagination.limit as usize).min(rows.len());
    let items = rows.drain(start..end).collect();
    Page::new(items, total, pagination)
}

/// In-memory store for tests and local runs.
///
/// Transactions take an owned lock on the whole state and work on a copy
/// that replaces the shared state on commit, so they are serializable and
/// an uncommitted transaction leaves no trace.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a purchasable variant to the catalog.
    pub async fn add_variant(&self, variant: VariantSnapshot) {
        self.state
            .lock()
            .await
            .variants
            .insert(variant.variant_id, variant);
    }

    /// Removes a variant from the catalog.
    pub async fn remove_variant(&self, id: VariantId) {
        self.state.lock().await.variants.remove(&id);
    }

    pub async fn add_shipper(&self, shipper: Shipper) {
        self.state.lock().await.shippers.insert(shipper.id, shipper);
    }

    pub async fn add_discount_code(&self, code: DiscountCode) {
        self.state
            .lock()
            .await
            .discount_codes
            .insert(code.code.clone(), code);
    }

    pub async fn add_user(&self, user: UserIdentity) {
        self.state.lock().await.users.push(user);
    }

    /// Returns every known user.
    pub async fn users(&self) -> Vec<UserIdentity> {
        self.state.lock().await.users.clone()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTx { guard, working }))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.lock().await.order(id).cloned())
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| query.matches(o))
            .map(header)
            .collect();
        rows.sort_by(|a, b| {
            let ordering = compare_orders(a, b, query.sort_by);
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        Ok(paginate(rows, query.pagination))
    }

    async fn order_statistics(&self, range: &DateRange) -> Result<OrderStatistics> {
        let state = self.state.lock().await;
        Ok(OrderStatistics::from_orders(
            state.orders.iter().filter(|o| range.contains(o.created_at)),
        ))
    }

    async fn recent_orders(&self, range: &DateRange, limit: u32) -> Result<Vec<Order>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| range.contains(o.created_at))
            .map(header)
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn find_discount_code(&self, code: &str) -> Result<Option<DiscountCode>> {
        Ok(self.state.lock().await.discount_codes.get(code).cloned())
    }

    async fn get_delivery(&self, id: DeliveryId) -> Result<Option<DeliveryOrder>> {
        let state = self.state.lock().await;
        Ok(state.deliveries.iter().find(|d| d.id == id).cloned())
    }

    async fn list_deliveries(&self, query: &DeliveryQuery) -> Result<Page<DeliveryOrder>> {
        let state = self.state.lock().await;
        let mut rows: Vec<DeliveryOrder> = state
            .deliveries
            .iter()
            .filter(|d| query.matches(d))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            let ordering = compare_deliveries(a, b, query.sort_by);
            match query.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        Ok(paginate(rows, query.pagination))
    }

    async fn deliveries_for_order(&self, id: OrderId) -> Result<Vec<DeliveryOrder>> {
        let state = self.state.lock().await;
        Ok(state
            .deliveries
            .iter()
            .filter(|d| d.order_id == id)
            .cloned()
            .collect())
    }

    async fn active_shippers(&self) -> Result<Vec<Shipper>> {
        let state = self.state.lock().await;
        let mut shippers: Vec<Shipper> = state
            .shippers
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        shippers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(shippers)
    }
}

/// Transaction over [`InMemoryStore`].
pub struct InMemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn resolve_variant(&mut self, id: VariantId) -> Result<Option<VariantSnapshot>> {
        Ok(self.working.variants.get(&id).cloned())
    }

    async fn resolve_or_create_guest(&mut self, contact: &GuestContact) -> Result<UserIdentity> {
        if let Some(user) = self.working.users.iter_mut().find(|u| contact.matches(u)) {
            if user.phone.is_none() {
                user.phone = Some(contact.phone.clone());
            }
            if user.email.is_none() {
                user.email = contact.email.clone();
            }
            return Ok(user.clone());
        }

        let guest = UserIdentity {
            id: UserId::new(),
            full_name: contact.name.clone(),
            phone: Some(contact.phone.clone()),
            email: contact.email.clone(),
            is_guest: true,
        };
        self.working.users.push(guest.clone());
        Ok(guest)
    }

    async fn resolve_user(&mut self, id: UserId) -> Result<Option<UserIdentity>> {
        Ok(self.working.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_shipper(&mut self, id: ShipperId) -> Result<Option<Shipper>> {
        Ok(self.working.shippers.get(&id).cloned())
    }

    async fn lock_discount_code(&mut self, code: &str) -> Result<Option<DiscountCode>> {
        Ok(self.working.discount_codes.get(code).cloned())
    }

    async fn increment_discount_usage(&mut self, code: &str) -> Result<()> {
        let entry = self
            .working
            .discount_codes
            .get_mut(code)
            .ok_or_else(|| StoreError::not_found("discount code", code))?;
        entry.used_count += 1;
        Ok(())
    }

    async fn next_order_number(&mut self) -> Result<i64> {
        self.working.order_sequence += 1;
        Ok(self.working.order_sequence)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.working.orders.push(header(order));
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.working.order(id).cloned())
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let stored = self.working.order_mut(order.id)?;
        let items = std::mem::take(&mut stored.items);
        let history = std::mem::take(&mut stored.status_history);
        *stored = Order {
            items,
            status_history: history,
            ..order.clone()
        };
        Ok(())
    }

    async fn insert_item(&mut self, order: OrderId, item: &OrderItem) -> Result<()> {
        self.working.order_mut(order)?.items.push(item.clone());
        Ok(())
    }

    async fn update_item(&mut self, order: OrderId, item: &OrderItem) -> Result<()> {
        let stored = self
            .working
            .order_mut(order)?
            .items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or_else(|| StoreError::not_found("order item", item.id))?;
        stored.quantity = item.quantity;
        stored.notes = item.notes.clone();
        stored.total_price = item.total_price;
        stored.updated_at = item.updated_at;
        Ok(())
    }

    async fn delete_item(&mut self, order: OrderId, item: OrderItemId) -> Result<()> {
        self.working
            .order_mut(order)?
            .items
            .retain(|i| i.id != item);
        Ok(())
    }

    async fn count_items(&mut self, order: OrderId) -> Result<u32> {
        Ok(self.working.order_mut(order)?.items.len() as u32)
    }

    async fn append_status_history(
        &mut self,
        order: OrderId,
        entry: &OrderStatusHistory,
    ) -> Result<()> {
        self.working
            .order_mut(order)?
            .status_history
            .push(entry.clone());
        Ok(())
    }

    async fn next_delivery_number(&mut self) -> Result<i64> {
        self.working.delivery_sequence += 1;
        Ok(self.working.delivery_sequence)
    }

    async fn order_deliveries(&mut self, order: OrderId) -> Result<Vec<DeliveryOrder>> {
        Ok(self
            .working
            .deliveries
            .iter()
            .filter(|d| d.order_id == order)
            .cloned()
            .collect())
    }

    async fn insert_delivery(&mut self, delivery: &DeliveryOrder) -> Result<()> {
        self.working.deliveries.push(delivery.clone());
        Ok(())
    }

    async fn lock_delivery(&mut self, id: DeliveryId) -> Result<Option<DeliveryOrder>> {
        Ok(self.working.deliveries.iter().find(|d| d.id == id).cloned())
    }

    async fn update_delivery(&mut self, delivery: &DeliveryOrder) -> Result<()> {
        let stored = self
            .working
            .deliveries
            .iter_mut()
            .find(|d| d.id == delivery.id)
            .ok_or_else(|| StoreError::not_found("delivery", delivery.id))?;
        let items = std::mem::take(&mut stored.items);
        *stored = DeliveryOrder {
            items,
            ..delivery.clone()
        };
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let InMemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
