//! Order aggregate manager.

use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{OrderId, OrderItemId, UserId, VariantId};
use domain::delivery::shipped_quantities;
use domain::order::{
    ChangeOrderStatus, CreateOrder, PAYMENT_METHODS, UpdateOrder, VariantSnapshot,
    order_number, plan_item_changes,
};
use domain::pricing::{
    self, AppliedCode, CodeRejection, Discount, DiscountIntent, DiscountValidation, Totals,
    compute_totals, evaluate_code,
};
use domain::query::{DateRange, OrderStatistics};
use domain::{
    DeliveryStatus, DomainError, Money, Order, OrderItem, OrderQuery, OrderStatus,
    OrderStatusHistory, Page, PaymentStatus,
};
use hub::{EventHub, EventType};
use store::{Store, StoreTx};

use crate::Choice;
use crate::error::{Result, ServiceError};
use crate::transaction::{finish, record_duration, require_actor};

/// How many orders the statistics view lists as recent.
pub const RECENT_ORDERS_LIMIT: u32 = 10;

/// Prices a new line from the catalog.
pub(crate) fn new_item(
    variant: &VariantSnapshot,
    quantity: u32,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> OrderItem {
    OrderItem {
        id: OrderItemId::new(),
        variant_id: variant.variant_id,
        product_name: variant.product_name.clone(),
        variant_name: variant.variant_name.clone(),
        unit_price: variant.price,
        quantity,
        total_price: variant.price.multiply(quantity),
        notes,
        created_at: now,
        updated_at: now,
    }
}

async fn resolve_variant(
    tx: &mut dyn StoreTx,
    variant_id: VariantId,
) -> Result<VariantSnapshot> {
    tx.resolve_variant(variant_id)
        .await?
        .ok_or_else(|| ServiceError::not_found("product variant", variant_id))
}

/// Validates and redeems the discount of a request.
///
/// A code is checked against the locked row and its usage incremented.
async fn redeem_discount(
    tx: &mut dyn StoreTx,
    intent: DiscountIntent,
    subtotal: Money,
    now: DateTime<Utc>,
) -> Result<Discount> {
    match intent {
        DiscountIntent::None => Ok(Discount::None),
        DiscountIntent::Manual(manual) => Ok(Discount::Manual(manual)),
        DiscountIntent::Code(code) => {
            let found = tx.lock_discount_code(&code).await?;
            let applied = evaluate_code(found.as_ref(), subtotal, now)?;
            tx.increment_discount_usage(&applied.code).await?;
            Ok(Discount::Code(applied))
        }
    }
}

/// Reprices the discount of an edited order.
///
/// Keeping the code the order already carries recomputes its amount from the
/// code definition without redeeming it again. Its validity window and usage
/// limit are not checked again, but the new subtotal must still reach the
/// code's minimum order amount.
async fn reprice_discount(
    tx: &mut dyn StoreTx,
    previous: &Totals,
    intent: DiscountIntent,
    subtotal: Money,
    now: DateTime<Utc>,
) -> Result<Discount> {
    match intent {
        DiscountIntent::Code(code) if previous.discount_code.as_deref() == Some(code.as_str()) => {
            let found = tx
                .lock_discount_code(&code)
                .await?
                .ok_or(CodeRejection::NotFound)?;
            if subtotal < found.min_order_amount {
                return Err(CodeRejection::BelowMinimum {
                    minimum: found.min_order_amount,
                }
                .into());
            }
            Ok(Discount::Code(AppliedCode {
                amount: found.amount_for(subtotal),
                code: found.code,
                discount_type: found.discount_type,
                value: found.value,
            }))
        }
        other => redeem_discount(tx, other, subtotal, now).await,
    }
}

/// Creates, edits and moves orders through their lifecycle.
///
/// Every mutation runs in one store transaction; the resulting order is
/// published to the hub only after the transaction committed.
#[derive(Clone)]
pub struct OrderManager<S: Store> {
    store: S,
    hub: EventHub,
}

impl<S: Store> OrderManager<S> {
    pub fn new(store: S, hub: EventHub) -> Self {
        Self { store, hub }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Creates an order. Without an actor the customer becomes a guest user.
    #[tracing::instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_order(&self, request: CreateOrder, actor: Option<UserId>) -> Result<Order> {
        let intent = request.validate()?;
        let started = Instant::now();

        let mut tx = self.store.begin().await?;
        let result = Self::create_in(&mut *tx, &request, intent, actor).await;
        let result = finish(tx, result).await;
        record_duration("create_order", started);
        let order = result?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.totals.total_amount,
            "order created"
        );
        self.hub.publish_entity(EventType::OrderUpdate, &order);
        Ok(order)
    }

    async fn create_in(
        tx: &mut dyn StoreTx,
        request: &CreateOrder,
        intent: DiscountIntent,
        actor: Option<UserId>,
    ) -> Result<Order> {
        let now = Utc::now();
        let contact = request.guest_contact();
        let creator = match actor {
            Some(actor) => require_actor(tx, actor).await?.id,
            None => tx.resolve_or_create_guest(&contact).await?.id,
        };

        let mut items = Vec::with_capacity(request.items.len());
        for line in &request.items {
            let variant = resolve_variant(tx, line.variant_id).await?;
            items.push(new_item(&variant, line.quantity, line.notes.clone(), now));
        }

        let subtotal =
            pricing::subtotal(items.iter().map(OrderItem::line_total)).within_limit("subtotal")?;
        let discount = redeem_discount(tx, intent, subtotal, now).await?;
        let sequence = tx.next_order_number().await?;

        let mut order = Order {
            id: OrderId::new(),
            order_number: order_number(now.date_naive(), sequence),
            customer_name: contact.name,
            customer_phone: contact.phone,
            customer_email: contact.email,
            status: OrderStatus::Pending,
            totals: compute_totals(subtotal, &discount, request.shipping_fee),
            payment_method: request.payment_method.clone(),
            payment_status: PaymentStatus::Pending,
            notes: request.notes.clone(),
            shipper_id: None,
            delivery_status: DeliveryStatus::Pending,
            estimated_delivery_time: None,
            delivery_notes: None,
            created_by: creator,
            updated_by: creator,
            created_at: now,
            updated_at: now,
            items_count: items.len() as u32,
            version: 1,
            items: Vec::new(),
            status_history: Vec::new(),
        };
        tx.insert_order(&order).await?;

        for item in &items {
            tx.insert_item(order.id, item).await?;
        }

        let entry = OrderStatusHistory {
            status: OrderStatus::Pending,
            previous_status: None,
            notes: Some("order created".to_string()),
            changed_by: creator,
            created_at: now,
        };
        tx.append_status_history(order.id, &entry).await?;

        order.items = items;
        order.status_history.push(entry);
        Ok(order)
    }

    /// Replaces the editable fields and item set of an order.
    #[tracing::instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn update_order(
        &self,
        id: OrderId,
        request: UpdateOrder,
        actor: UserId,
    ) -> Result<Order> {
        let intent = request.validate()?;
        let started = Instant::now();

        let mut tx = self.store.begin().await?;
        let result = Self::update_in(&mut *tx, id, &request, intent, actor).await;
        let result = finish(tx, result).await;
        record_duration("update_order", started);
        let order = result?;

        tracing::info!(
            order_id = %order.id,
            version = order.version,
            total = %order.totals.total_amount,
            "order updated"
        );
        self.hub.publish_entity(EventType::OrderUpdate, &order);
        Ok(order)
    }

    async fn update_in(
        tx: &mut dyn StoreTx,
        id: OrderId,
        request: &UpdateOrder,
        intent: DiscountIntent,
        actor: UserId,
    ) -> Result<Order> {
        let actor = require_actor(tx, actor).await?;
        let mut order = tx
            .lock_order(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order", id))?;

        if let Some(expected) = request.expected_version
            && expected != order.version
        {
            return Err(ServiceError::Conflict(format!(
                "order {} is at version {}, expected {expected}",
                order.order_number, order.version
            )));
        }
        if !order.status.can_edit_items() {
            return Err(ServiceError::validation(
                "status",
                format!("{} orders cannot be edited", order.status),
            ));
        }

        let plan = plan_item_changes(id, &order.items, &request.items)?;

        let deliveries = tx.order_deliveries(id).await?;
        let shipped = shipped_quantities(&deliveries);
        for removed in &plan.removals {
            if shipped.get(removed).copied().unwrap_or(0) > 0 {
                return Err(ServiceError::validation(
                    "items",
                    format!("order item {removed} is held by a delivery and cannot be removed"),
                ));
            }
        }
        for updated in &plan.updates {
            let held = shipped.get(&updated.id).copied().unwrap_or(0);
            if updated.quantity < held {
                return Err(ServiceError::validation(
                    "quantity",
                    format!(
                        "{} {} has {held} in deliveries; quantity cannot drop below that",
                        updated.product_name, updated.variant_name
                    ),
                ));
            }
        }

        let now = Utc::now();
        for removed in &plan.removals {
            tx.delete_item(id, *removed).await?;
        }

        let mut items = Vec::with_capacity(plan.resulting_count());
        for updated in plan.updates {
            let updated = OrderItem {
                updated_at: now,
                ..updated
            };
            tx.update_item(id, &updated).await?;
            items.push(updated);
        }
        for line in plan.inserts {
            let variant = resolve_variant(tx, line.variant_id).await?;
            let item = new_item(&variant, line.quantity, line.notes, now);
            tx.insert_item(id, &item).await?;
            items.push(item);
        }

        let subtotal =
            pricing::subtotal(items.iter().map(OrderItem::line_total)).within_limit("subtotal")?;
        let discount = reprice_discount(tx, &order.totals, intent, subtotal, now).await?;

        order.customer_name = request.customer_name.trim().to_string();
        order.customer_phone = request.customer_phone.trim().to_string();
        order.customer_email = request
            .customer_email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);
        order.totals = compute_totals(subtotal, &discount, request.shipping_fee);
        order.payment_method = request.payment_method.clone();
        if let Some(payment_status) = request.payment_status {
            order.payment_status = payment_status;
        }
        order.notes = request.notes.clone();
        order.items_count = tx.count_items(id).await?;
        order.version += 1;
        order.updated_by = actor.id;
        order.updated_at = now;
        tx.update_order(&order).await?;

        tx.lock_order(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order", id))
    }

    /// Moves an order to another status, recording one history row.
    #[tracing::instrument(skip(self, request), fields(to = %request.status))]
    pub async fn change_status(
        &self,
        id: OrderId,
        request: ChangeOrderStatus,
        actor: UserId,
    ) -> Result<Order> {
        let started = Instant::now();

        let mut tx = self.store.begin().await?;
        let result = Self::change_status_in(&mut *tx, id, &request, actor).await;
        let result = finish(tx, result).await;
        record_duration("change_status", started);
        let (order, previous) = result?;

        metrics::counter!(
            "order_status_changes_total",
            "from" => previous.as_str(),
            "to" => order.status.as_str()
        )
        .increment(1);
        tracing::info!(order_id = %order.id, from = %previous, to = %order.status, "order status changed");
        self.hub.publish_entity(EventType::OrderUpdate, &order);
        Ok(order)
    }

    async fn change_status_in(
        tx: &mut dyn StoreTx,
        id: OrderId,
        request: &ChangeOrderStatus,
        actor: UserId,
    ) -> Result<(Order, OrderStatus)> {
        let actor = require_actor(tx, actor).await?;
        let mut order = tx
            .lock_order(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order", id))?;

        let previous = order.status;
        let now = Utc::now();
        order.status = previous.transition_to(request.status)?;
        order.version += 1;
        order.updated_by = actor.id;
        order.updated_at = now;
        tx.update_order(&order).await?;

        let entry = OrderStatusHistory {
            status: order.status,
            previous_status: Some(previous),
            notes: request.notes.clone(),
            changed_by: actor.id,
            created_at: now,
        };
        tx.append_status_history(id, &entry).await?;
        order.status_history.push(entry);

        Ok((order, previous))
    }

    /// Loads an order with its items and history.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, id: OrderId) -> Result<Order> {
        self.store
            .get_order(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("order", id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>> {
        Ok(self.store.list_orders(query).await?)
    }

    /// Checks a code against an order amount without redeeming it.
    #[tracing::instrument(skip(self))]
    pub async fn validate_discount_code(
        &self,
        code: &str,
        order_amount: Money,
    ) -> Result<DiscountValidation> {
        let code = code.trim();
        if code.is_empty() {
            return Err(DomainError::validation("code", "discount code is required").into());
        }
        let found = self.store.find_discount_code(code).await?;
        Ok(DiscountValidation::check(
            found.as_ref(),
            order_amount,
            Utc::now(),
        ))
    }

    /// Aggregate figures over `range`.
    ///
    /// Recent orders are best effort: a failure to load them leaves the list
    /// empty instead of failing the whole request.
    #[tracing::instrument(skip(self))]
    pub async fn statistics(&self, range: DateRange) -> Result<OrderStatistics> {
        let mut stats = self.store.order_statistics(&range).await?;
        match self.store.recent_orders(&range, RECENT_ORDERS_LIMIT).await {
            Ok(recent) => stats.recent_orders = recent,
            Err(e) => tracing::warn!(error = %e, "failed to load recent orders"),
        }
        Ok(stats)
    }

    /// Every order status with its label.
    pub fn order_statuses(&self) -> Vec<Choice> {
        OrderStatus::ALL
            .iter()
            .map(|s| Choice::new(s.as_str(), s.label()))
            .collect()
    }

    pub fn payment_methods(&self) -> Vec<Choice> {
        PAYMENT_METHODS
            .iter()
            .map(|&(value, label)| Choice::new(value, label))
            .collect()
    }
}
