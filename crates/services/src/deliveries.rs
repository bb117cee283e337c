//! Delivery orchestrator.

use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{DeliveryId, OrderId, ShipperId, UserId};
use domain::delivery::{
    AssignShipper, ChangeDeliveryStatus, CreateDelivery, ShipmentGroup, SplitOrder,
    UpdateDelivery, check_shipments, delivery_number, shipped_quantities, unshipped_items,
};
use domain::{DeliveryOrder, DeliveryQuery, DeliveryStatus, Order, Page, Shipper};
use hub::{EventHub, EventType};
use serde::Serialize;
use store::{Store, StoreTx};

use crate::Choice;
use crate::error::{Result, ServiceError};
use crate::transaction::{finish, record_duration, require_actor};

/// Outcome of assigning a shipper to an order.
///
/// Serializes as `{"mode": "direct", "result": <order>}` or
/// `{"mode": "split", "result": [<delivery>, ...]}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "mode", content = "result", rename_all = "snake_case")]
pub enum Assignment {
    /// The shipper was stamped on the order itself.
    Direct(Order),
    /// A shipment carrying the unshipped quantities was created.
    Split(Vec<DeliveryOrder>),
}

async fn lock_eligible_order(tx: &mut dyn StoreTx, id: OrderId) -> Result<Order> {
    let order = tx
        .lock_order(id)
        .await?
        .ok_or_else(|| ServiceError::not_found("order", id))?;

    if !order.status.is_delivery_eligible() {
        return Err(ServiceError::validation(
            "status",
            format!(
                "order {} is {}; it must be ready for delivery or completed",
                order.order_number, order.status
            ),
        ));
    }
    Ok(order)
}

async fn active_shipper(tx: &mut dyn StoreTx, id: ShipperId) -> Result<Shipper> {
    let shipper = tx
        .find_shipper(id)
        .await?
        .ok_or_else(|| ServiceError::not_found("shipper", id))?;

    if !shipper.is_active {
        return Err(ServiceError::validation(
            "shipper_id",
            format!("shipper {} is not active", shipper.name),
        ));
    }
    Ok(shipper)
}

/// Writes one shipment for `order` in `pending`, optionally moving it on to
/// `assigned`.
async fn create_shipment(
    tx: &mut dyn StoreTx,
    order: &Order,
    group: &ShipmentGroup,
    actor: UserId,
    assign: bool,
    now: DateTime<Utc>,
) -> Result<DeliveryOrder> {
    let shipper = active_shipper(tx, group.shipper_id).await?;
    let sequence = tx.next_delivery_number().await?;

    let mut delivery = DeliveryOrder {
        id: DeliveryId::new(),
        order_id: order.id,
        shipper_id: shipper.id,
        delivery_number: delivery_number(now.date_naive(), sequence),
        status: DeliveryStatus::Pending,
        estimated_delivery_time: group.estimated_delivery_time,
        actual_delivery_time: None,
        notes: group.notes.clone(),
        created_by: actor,
        updated_by: actor,
        created_at: now,
        updated_at: now,
        items: group.items.clone(),
    };
    tx.insert_delivery(&delivery).await?;

    if assign {
        delivery.apply_status(DeliveryStatus::Assigned, now)?;
        tx.update_delivery(&delivery).await?;
    }

    tracing::debug!(
        delivery_id = %delivery.id,
        delivery_number = %delivery.delivery_number,
        shipper = %shipper.name,
        items = delivery.items.len(),
        "shipment created"
    );
    Ok(delivery)
}

/// Assigns shippers to orders and tracks their shipments.
///
/// Across every shipment of an order that has not failed or been cancelled,
/// the shipped quantity of a line never exceeds its ordered quantity.
#[derive(Clone)]
pub struct DeliveryOrchestrator<S: Store> {
    store: S,
    hub: EventHub,
}

impl<S: Store> DeliveryOrchestrator<S> {
    pub fn new(store: S, hub: EventHub) -> Self {
        Self { store, hub }
    }

    /// Hands an order to a shipper.
    ///
    /// Without `split` the shipper is recorded on the order; with it, one
    /// shipment carrying every unshipped quantity is created.
    #[tracing::instrument(skip(self, request), fields(shipper_id = %request.shipper_id, split = request.split))]
    pub async fn assign_shipper(
        &self,
        order_id: OrderId,
        request: AssignShipper,
        actor: UserId,
    ) -> Result<Assignment> {
        let started = Instant::now();

        let mut tx = self.store.begin().await?;
        let result = Self::assign_in(&mut *tx, order_id, &request, actor).await;
        let result = finish(tx, result).await;
        record_duration("assign_shipper", started);
        let assignment = result?;

        match &assignment {
            Assignment::Direct(order) => {
                tracing::info!(order_id = %order.id, "shipper assigned to order");
                self.hub.publish_entity(EventType::OrderUpdate, order);
            }
            Assignment::Split(deliveries) => self.announce(deliveries, "split assignment"),
        }
        Ok(assignment)
    }

    async fn assign_in(
        tx: &mut dyn StoreTx,
        order_id: OrderId,
        request: &AssignShipper,
        actor: UserId,
    ) -> Result<Assignment> {
        let actor = require_actor(tx, actor).await?;
        let mut order = lock_eligible_order(tx, order_id).await?;
        let now = Utc::now();

        if !request.split {
            let shipper = active_shipper(tx, request.shipper_id).await?;
            order.shipper_id = Some(shipper.id);
            order.delivery_status = DeliveryStatus::Assigned;
            order.estimated_delivery_time = request.estimated_delivery_time;
            order.delivery_notes = request.notes.clone();
            order.version += 1;
            order.updated_by = actor.id;
            order.updated_at = now;
            tx.update_order(&order).await?;
            return Ok(Assignment::Direct(order));
        }

        let existing = tx.order_deliveries(order_id).await?;
        let shipped = shipped_quantities(&existing);
        let items = unshipped_items(&order, &shipped);
        if items.is_empty() {
            return Err(ServiceError::validation(
                "items",
                format!(
                    "every item of order {} is already in a delivery",
                    order.order_number
                ),
            ));
        }

        let group = ShipmentGroup {
            shipper_id: request.shipper_id,
            estimated_delivery_time: request.estimated_delivery_time,
            notes: request.notes.clone(),
            items,
        };
        let delivery = create_shipment(tx, &order, &group, actor.id, true, now).await?;
        Ok(Assignment::Split(vec![delivery]))
    }

    /// Splits an order into one shipment per group, all or nothing.
    #[tracing::instrument(skip(self, request), fields(groups = request.deliveries.len()))]
    pub async fn split_order(
        &self,
        order_id: OrderId,
        request: SplitOrder,
        actor: UserId,
    ) -> Result<Vec<DeliveryOrder>> {
        request.validate()?;
        let started = Instant::now();

        let mut tx = self.store.begin().await?;
        let result = Self::ship_in(&mut *tx, order_id, &request.deliveries, actor, true).await;
        let result = finish(tx, result).await;
        record_duration("split_order", started);
        let deliveries = result?;

        self.announce(&deliveries, "order split");
        Ok(deliveries)
    }

    /// Creates a single shipment for an order, left in `pending`.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn create_delivery(
        &self,
        request: CreateDelivery,
        actor: UserId,
    ) -> Result<DeliveryOrder> {
        let started = Instant::now();
        let groups = [request.shipment];

        let mut tx = self.store.begin().await?;
        let result = Self::ship_in(&mut *tx, request.order_id, &groups, actor, false).await;
        let result = finish(tx, result).await;
        record_duration("create_delivery", started);
        let mut deliveries = result?;

        self.announce(&deliveries, "delivery created");
        deliveries
            .pop()
            .ok_or_else(|| ServiceError::validation("items", "no delivery was created"))
    }

    async fn ship_in(
        tx: &mut dyn StoreTx,
        order_id: OrderId,
        groups: &[ShipmentGroup],
        actor: UserId,
        assign: bool,
    ) -> Result<Vec<DeliveryOrder>> {
        let actor = require_actor(tx, actor).await?;
        let order = lock_eligible_order(tx, order_id).await?;

        let existing = tx.order_deliveries(order_id).await?;
        let shipped = shipped_quantities(&existing);
        check_shipments(&order, &shipped, groups)?;

        let now = Utc::now();
        let mut created = Vec::with_capacity(groups.len());
        for group in groups {
            created.push(create_shipment(tx, &order, group, actor.id, assign, now).await?);
        }
        Ok(created)
    }

    /// Applies a partial update to a shipment.
    #[tracing::instrument(skip(self, request))]
    pub async fn update_delivery(
        &self,
        id: DeliveryId,
        request: UpdateDelivery,
        actor: UserId,
    ) -> Result<DeliveryOrder> {
        let started = Instant::now();

        let mut tx = self.store.begin().await?;
        let result = Self::update_in(&mut *tx, id, &request, actor).await;
        let result = finish(tx, result).await;
        record_duration("update_delivery", started);
        let delivery = result?;

        tracing::info!(delivery_id = %delivery.id, status = %delivery.status, "delivery updated");
        self.hub
            .publish_entity(EventType::DeliveryUpdate, &delivery);
        Ok(delivery)
    }

    async fn update_in(
        tx: &mut dyn StoreTx,
        id: DeliveryId,
        request: &UpdateDelivery,
        actor: UserId,
    ) -> Result<DeliveryOrder> {
        let actor = require_actor(tx, actor).await?;
        let mut delivery = tx
            .lock_delivery(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("delivery", id))?;
        let now = Utc::now();

        if delivery.status.is_terminal()
            && (request.shipper_id.is_some()
                || request.status.is_some()
                || request.estimated_delivery_time.is_some()
                || request.actual_delivery_time.is_some())
        {
            return Err(ServiceError::validation(
                "status",
                format!(
                    "delivery {} is {}; only notes can change",
                    delivery.delivery_number, delivery.status
                ),
            ));
        }

        if let Some(shipper_id) = request.shipper_id {
            delivery.shipper_id = active_shipper(tx, shipper_id).await?.id;
        }
        if let Some(estimated) = request.estimated_delivery_time {
            delivery.estimated_delivery_time = Some(estimated);
        }
        if let Some(actual) = request.actual_delivery_time {
            delivery.actual_delivery_time = Some(actual);
        }
        if let Some(notes) = &request.notes {
            delivery.notes = Some(notes.clone());
        }
        if let Some(status) = request.status {
            delivery.apply_status(status, now)?;
        }

        delivery.updated_by = actor.id;
        delivery.updated_at = now;
        tx.update_delivery(&delivery).await?;
        Ok(delivery)
    }

    /// Moves a shipment to another status.
    #[tracing::instrument(skip(self, request), fields(to = %request.status))]
    pub async fn update_delivery_status(
        &self,
        id: DeliveryId,
        request: ChangeDeliveryStatus,
        actor: UserId,
    ) -> Result<DeliveryOrder> {
        let update = UpdateDelivery {
            status: Some(request.status),
            notes: request.notes,
            ..Default::default()
        };
        self.update_delivery(id, update, actor).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_delivery(&self, id: DeliveryId) -> Result<DeliveryOrder> {
        self.store
            .get_delivery(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("delivery", id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_deliveries(&self, query: &DeliveryQuery) -> Result<Page<DeliveryOrder>> {
        Ok(self.store.list_deliveries(query).await?)
    }

    /// Every shipment of an order, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn deliveries_for_order(&self, order_id: OrderId) -> Result<Vec<DeliveryOrder>> {
        if self.store.get_order(order_id).await?.is_none() {
            return Err(ServiceError::not_found("order", order_id));
        }
        Ok(self.store.deliveries_for_order(order_id).await?)
    }

    /// Active shippers, by name.
    pub async fn available_shippers(&self) -> Result<Vec<Shipper>> {
        Ok(self.store.active_shippers().await?)
    }

    /// Every delivery status with its label.
    pub fn delivery_statuses(&self) -> Vec<Choice> {
        DeliveryStatus::ALL
            .iter()
            .map(|s| Choice::new(s.as_str(), s.label()))
            .collect()
    }

    fn announce(&self, deliveries: &[DeliveryOrder], context: &'static str) {
        metrics::counter!("deliveries_created_total").increment(deliveries.len() as u64);
        for delivery in deliveries {
            tracing::info!(
                delivery_id = %delivery.id,
                delivery_number = %delivery.delivery_number,
                order_id = %delivery.order_id,
                context,
                "delivery created"
            );
            self.hub
                .publish_entity(EventType::DeliveryUpdate, delivery);
        }
    }
}
