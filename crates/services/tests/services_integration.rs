//! Use-case tests against the in-memory store.

use chrono::{Duration, Utc};
use common::{OrderId, ShipperId, UserId, VariantId};
use domain::delivery::{
    AssignShipper, ChangeDeliveryStatus, CreateDelivery, DeliveryOrderItem, ShipmentGroup,
    SplitOrder, UpdateDelivery,
};
use domain::order::{
    ChangeOrderStatus, CreateOrder, MAX_QUANTITY, UpdateOrder, UpdateOrderItem, VariantSnapshot,
};
use domain::pricing::DiscountRequest;
use domain::query::DateRange;
use domain::{
    DeliveryStatus, DiscountCode, DiscountType, Money, Order, OrderQuery, OrderStatus, Shipper,
    UserIdentity,
};
use hub::{ADMIN_GROUP, EventHub, Message};
use services::{Assignment, DeliveryOrchestrator, OrderManager, ServiceError};
use store::{InMemoryStore, Store};
use tokio::sync::mpsc::Receiver;

struct Harness {
    store: InMemoryStore,
    orders: OrderManager<InMemoryStore>,
    deliveries: DeliveryOrchestrator<InMemoryStore>,
    events: Receiver<Message>,
    staff: UserId,
    bread: VariantId,
    milk: VariantId,
    shipper: ShipperId,
}

impl Harness {
    async fn new() -> Self {
        let store = InMemoryStore::new();
        let hub = EventHub::new(64);
        let (_, events) = hub.subscribe(Some(ADMIN_GROUP.to_string()));

        let staff = UserId::new();
        store
            .add_user(UserIdentity {
                id: staff,
                full_name: "Staff".to_string(),
                phone: Some("0911111111".to_string()),
                email: None,
                is_guest: false,
            })
            .await;

        let bread = VariantId::new();
        store
            .add_variant(VariantSnapshot {
                variant_id: bread,
                product_name: "Bread".to_string(),
                variant_name: "Large".to_string(),
                price: Money::new(10000),
            })
            .await;

        let milk = VariantId::new();
        store
            .add_variant(VariantSnapshot {
                variant_id: milk,
                product_name: "Milk".to_string(),
                variant_name: "1L".to_string(),
                price: Money::new(5000),
            })
            .await;

        let shipper = Shipper::new("Minh", "0922222222");
        let shipper_id = shipper.id;
        store.add_shipper(shipper).await;

        Self {
            orders: OrderManager::new(store.clone(), hub.clone()),
            deliveries: DeliveryOrchestrator::new(store.clone(), hub),
            store,
            events,
            staff,
            bread,
            milk,
            shipper: shipper_id,
        }
    }

    /// Two bread and one milk: subtotal 25000.
    fn basket(&self) -> CreateOrder {
        CreateOrder::new("Lan", "0900000000")
            .item(self.bread, 2)
            .item(self.milk, 1)
    }

    async fn add_code(&self, code: &str, value: i64, cap: Option<i64>, usage_limit: Option<u32>) {
        let now = Utc::now();
        self.store
            .add_discount_code(DiscountCode {
                code: code.to_string(),
                name: code.to_string(),
                description: None,
                discount_type: DiscountType::Percentage,
                value,
                min_order_amount: Money::zero(),
                max_discount_amount: cap.map(Money::new),
                usage_limit,
                used_count: 0,
                is_active: true,
                valid_from: now - Duration::days(1),
                valid_until: now + Duration::days(1),
            })
            .await;
    }

    async fn used_count(&self, code: &str) -> u32 {
        self.store
            .find_discount_code(code)
            .await
            .unwrap()
            .unwrap()
            .used_count
    }

    /// Creates the basket order and walks it to `ready_for_delivery`.
    async fn ready_order(&mut self) -> Order {
        let order = self
            .orders
            .create_order(self.basket(), Some(self.staff))
            .await
            .unwrap();
        for status in [OrderStatus::Processing, OrderStatus::ReadyForDelivery] {
            self.orders
                .change_status(order.id, ChangeOrderStatus::to(status), self.staff)
                .await
                .unwrap();
        }
        self.drain_events();
        self.orders.get_order(order.id).await.unwrap()
    }

    fn drain_events(&mut self) -> Vec<serde_json::Value> {
        let mut events = Vec::new();
        while let Ok(message) = self.events.try_recv() {
            events.push(serde_json::from_str(&message).unwrap());
        }
        events
    }
}

mod create {
    use super::*;

    #[tokio::test]
    async fn prices_two_lines_without_discount() {
        let mut h = Harness::new().await;

        let order = h
            .orders
            .create_order(h.basket(), Some(h.staff))
            .await
            .unwrap();

        assert_eq!(order.totals.subtotal, Money::new(25000));
        assert_eq!(order.totals.total_amount, Money::new(25000));
        assert_eq!(order.items_count, 2);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.status_history.len(), 1);
        assert!(order.order_number.starts_with("ORD-"));
        assert!(order.totals_consistent());

        let events = h.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "order_update");
        assert_eq!(events[0]["payload"]["id"], order.id.to_string());
    }

    #[tokio::test]
    async fn capped_percentage_code_is_applied_and_redeemed() {
        let h = Harness::new().await;
        h.add_code("SAVE10", 10, Some(2000), Some(5)).await;

        let order = h
            .orders
            .create_order(
                h.basket().discount(DiscountRequest::with_code("SAVE10")),
                Some(h.staff),
            )
            .await
            .unwrap();

        assert_eq!(order.totals.discount_amount, Money::new(2000));
        assert_eq!(order.totals.total_amount, Money::new(23000));
        assert_eq!(order.totals.discount_code.as_deref(), Some("SAVE10"));
        assert_eq!(h.used_count("SAVE10").await, 1);
    }

    #[tokio::test]
    async fn exhausted_code_rejects_order() {
        let h = Harness::new().await;
        h.add_code("ONCE", 10, None, Some(1)).await;

        h.orders
            .create_order(
                h.basket().discount(DiscountRequest::with_code("ONCE")),
                Some(h.staff),
            )
            .await
            .unwrap();
        let second = h
            .orders
            .create_order(
                h.basket().discount(DiscountRequest::with_code("ONCE")),
                Some(h.staff),
            )
            .await;

        assert!(matches!(
            second,
            Err(ServiceError::Validation {
                field: "discount_code",
                ..
            })
        ));
        assert_eq!(h.used_count("ONCE").await, 1);
        assert_eq!(h.store.order_count().await, 1);
    }

    #[tokio::test]
    async fn code_and_manual_discount_are_exclusive() {
        let h = Harness::new().await;
        h.add_code("SAVE10", 10, None, None).await;

        let discount = DiscountRequest {
            manual_discount_amount: Some(Money::new(1000)),
            discount_type: Some(DiscountType::FixedAmount),
            ..DiscountRequest::with_code("SAVE10")
        };
        let result = h
            .orders
            .create_order(h.basket().discount(discount), Some(h.staff))
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::Validation {
                field: "discount",
                ..
            })
        ));
        assert_eq!(h.used_count("SAVE10").await, 0);
    }

    #[tokio::test]
    async fn manual_discount_never_drives_total_negative() {
        let h = Harness::new().await;

        let order = h
            .orders
            .create_order(
                h.basket()
                    .discount(DiscountRequest::manual(
                        DiscountType::FixedAmount,
                        Money::new(90000),
                    ))
                    .shipping_fee(Money::new(3000)),
                Some(h.staff),
            )
            .await
            .unwrap();

        assert_eq!(order.totals.manual_discount_amount, Money::new(90000));
        assert_eq!(order.totals.total_amount, Money::zero());
    }

    #[tokio::test]
    async fn oversized_amounts_are_validation_errors() {
        let h = Harness::new().await;

        let fee = h
            .orders
            .create_order(h.basket().shipping_fee(Money::new(i64::MAX)), Some(h.staff))
            .await;
        assert!(matches!(
            fee,
            Err(ServiceError::Validation {
                field: "shipping_fee",
                ..
            })
        ));

        let manual = h
            .orders
            .create_order(
                h.basket().discount(DiscountRequest::manual(
                    DiscountType::FixedAmount,
                    Money::new(i64::MAX),
                )),
                Some(h.staff),
            )
            .await;
        assert!(matches!(
            manual,
            Err(ServiceError::Validation {
                field: "manual_discount_amount",
                ..
            })
        ));

        let quantity = h
            .orders
            .create_order(
                CreateOrder::new("Lan", "0900000000").item(h.bread, MAX_QUANTITY + 1),
                Some(h.staff),
            )
            .await;
        assert!(matches!(
            quantity,
            Err(ServiceError::Validation { field: "quantity", .. })
        ));

        let gold = VariantId::new();
        h.store
            .add_variant(VariantSnapshot {
                variant_id: gold,
                product_name: "Gold".to_string(),
                variant_name: "Bar".to_string(),
                price: Money::new(i64::MAX / 2),
            })
            .await;
        let subtotal = h
            .orders
            .create_order(
                CreateOrder::new("Lan", "0900000000").item(gold, 3),
                Some(h.staff),
            )
            .await;
        assert!(matches!(
            subtotal,
            Err(ServiceError::Validation {
                field: "subtotal",
                ..
            })
        ));

        assert_eq!(h.store.order_count().await, 0);
    }

    #[tokio::test]
    async fn missing_variant_rolls_everything_back() {
        let mut h = Harness::new().await;
        h.add_code("SAVE10", 10, None, None).await;

        let request = h
            .basket()
            .item(VariantId::new(), 1)
            .discount(DiscountRequest::with_code("SAVE10"));
        let result = h.orders.create_order(request, None).await;

        assert!(matches!(
            result,
            Err(ServiceError::NotFound {
                entity: "product variant",
                ..
            })
        ));
        assert_eq!(h.store.order_count().await, 0);
        assert_eq!(h.used_count("SAVE10").await, 0);
        // The guest created inside the transaction is gone too.
        assert_eq!(h.store.users().await.len(), 1);
        assert!(h.drain_events().is_empty());
    }

    #[tokio::test]
    async fn anonymous_order_creates_then_reuses_guest() {
        let h = Harness::new().await;

        let first = h.orders.create_order(h.basket(), None).await.unwrap();
        let second = h.orders.create_order(h.basket(), None).await.unwrap();

        assert_ne!(first.created_by, h.staff);
        assert_eq!(first.created_by, second.created_by);
        let users = h.store.users().await;
        assert_eq!(users.len(), 2);
        assert!(users.iter().any(|u| u.is_guest && u.id == first.created_by));
    }

    #[tokio::test]
    async fn unknown_actor_is_unauthorized() {
        let h = Harness::new().await;
        let result = h.orders.create_order(h.basket(), Some(UserId::new())).await;
        assert!(matches!(result, Err(ServiceError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn empty_order_is_rejected_before_the_store() {
        let h = Harness::new().await;
        let result = h
            .orders
            .create_order(CreateOrder::new("Lan", "0900000000"), Some(h.staff))
            .await;
        assert!(matches!(
            result,
            Err(ServiceError::Validation { field: "items", .. })
        ));
    }
}

mod update {
    use super::*;

    #[tokio::test]
    async fn reconciles_items_and_keeps_frozen_price() {
        let mut h = Harness::new().await;
        let order = h
            .orders
            .create_order(h.basket(), Some(h.staff))
            .await
            .unwrap();
        let bread_line = order.items.iter().find(|i| i.variant_id == h.bread).unwrap().id;

        // Catalog price changes after the order was placed.
        h.store
            .add_variant(VariantSnapshot {
                variant_id: h.bread,
                product_name: "Bread".to_string(),
                variant_name: "Large".to_string(),
                price: Money::new(99999),
            })
            .await;

        let request = UpdateOrder::new("Lan", "0900000000")
            .item(UpdateOrderItem::existing(bread_line, 3))
            .item(UpdateOrderItem::new_line(h.milk, 4));
        let updated = h
            .orders
            .update_order(order.id, request, h.staff)
            .await
            .unwrap();

        assert_eq!(updated.items_count, 2);
        assert_eq!(updated.items.len(), 2);
        let bread = updated.item(bread_line).unwrap();
        assert_eq!(bread.unit_price, Money::new(10000));
        assert_eq!(bread.total_price, Money::new(30000));
        assert_eq!(updated.totals.subtotal, Money::new(50000));
        assert_eq!(updated.version, order.version + 1);
        assert!(updated.totals_consistent());

        let events = h.drain_events();
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn foreign_item_id_is_not_found() {
        let h = Harness::new().await;
        let first = h.orders.create_order(h.basket(), Some(h.staff)).await.unwrap();
        let second = h.orders.create_order(h.basket(), Some(h.staff)).await.unwrap();

        let request = UpdateOrder::new("Lan", "0900000000")
            .item(UpdateOrderItem::existing(second.items[0].id, 1));
        let result = h.orders.update_order(first.id, request, h.staff).await;

        assert!(matches!(
            result,
            Err(ServiceError::NotFound {
                entity: "order item",
                ..
            })
        ));
        let unchanged = h.orders.get_order(first.id).await.unwrap();
        assert_eq!(unchanged.items.len(), 2);
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let h = Harness::new().await;
        let order = h.orders.create_order(h.basket(), Some(h.staff)).await.unwrap();

        let mut request = UpdateOrder::new("Lan", "0900000000")
            .item(UpdateOrderItem::existing(order.items[0].id, 1));
        request.expected_version = Some(order.version + 5);
        let result = h.orders.update_order(order.id, request, h.staff).await;

        assert!(matches!(result, Err(ServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn keeping_the_same_code_does_not_redeem_again() {
        let h = Harness::new().await;
        h.add_code("SAVE10", 10, None, Some(1)).await;
        let order = h
            .orders
            .create_order(
                h.basket().discount(DiscountRequest::with_code("SAVE10")),
                Some(h.staff),
            )
            .await
            .unwrap();
        assert_eq!(order.totals.discount_amount, Money::new(2500));

        let request = UpdateOrder::new("Lan", "0900000000")
            .item(UpdateOrderItem::existing(order.items[0].id, 1))
            .discount(DiscountRequest::with_code("SAVE10"));
        let updated = h
            .orders
            .update_order(order.id, request, h.staff)
            .await
            .unwrap();

        // Only one 10000 bread line remains.
        assert_eq!(updated.totals.subtotal, Money::new(10000));
        assert_eq!(updated.totals.discount_amount, Money::new(1000));
        assert_eq!(h.used_count("SAVE10").await, 1);
    }

    #[tokio::test]
    async fn kept_code_still_needs_its_minimum_order_amount() {
        let h = Harness::new().await;
        let now = Utc::now();
        h.store
            .add_discount_code(DiscountCode {
                code: "BIG20".to_string(),
                name: "Big basket".to_string(),
                description: None,
                discount_type: DiscountType::FixedAmount,
                value: 2000,
                min_order_amount: Money::new(20000),
                max_discount_amount: None,
                usage_limit: None,
                used_count: 0,
                is_active: true,
                valid_from: now - Duration::days(1),
                valid_until: now + Duration::days(1),
            })
            .await;
        let order = h
            .orders
            .create_order(
                h.basket().discount(DiscountRequest::with_code("BIG20")),
                Some(h.staff),
            )
            .await
            .unwrap();
        assert_eq!(order.totals.discount_amount, Money::new(2000));

        // One bread alone is 10000, below the 20000 minimum.
        let request = UpdateOrder::new("Lan", "0900000000")
            .item(UpdateOrderItem::existing(order.items[0].id, 1))
            .discount(DiscountRequest::with_code("BIG20"));
        let result = h.orders.update_order(order.id, request, h.staff).await;

        assert!(matches!(
            result,
            Err(ServiceError::Validation {
                field: "discount_code",
                ..
            })
        ));
        let unchanged = h.orders.get_order(order.id).await.unwrap();
        assert_eq!(unchanged.totals, order.totals);
        assert_eq!(unchanged.items.len(), 2);
        assert_eq!(h.used_count("BIG20").await, 1);
    }

    #[tokio::test]
    async fn cancelled_order_cannot_be_edited() {
        let h = Harness::new().await;
        let order = h.orders.create_order(h.basket(), Some(h.staff)).await.unwrap();
        h.orders
            .change_status(order.id, ChangeOrderStatus::to(OrderStatus::Cancelled), h.staff)
            .await
            .unwrap();

        let request = UpdateOrder::new("Lan", "0900000000")
            .item(UpdateOrderItem::existing(order.items[0].id, 1));
        let result = h.orders.update_order(order.id, request, h.staff).await;
        assert!(matches!(
            result,
            Err(ServiceError::Validation { field: "status", .. })
        ));
    }
}

mod status {
    use super::*;

    #[tokio::test]
    async fn pending_cannot_jump_to_completed() {
        let mut h = Harness::new().await;
        let order = h.orders.create_order(h.basket(), Some(h.staff)).await.unwrap();
        h.drain_events();

        let rejected = h
            .orders
            .change_status(order.id, ChangeOrderStatus::to(OrderStatus::Completed), h.staff)
            .await;
        assert!(matches!(
            rejected,
            Err(ServiceError::Validation { field: "status", .. })
        ));
        assert!(h.drain_events().is_empty());

        let accepted = h
            .orders
            .change_status(order.id, ChangeOrderStatus::to(OrderStatus::Processing), h.staff)
            .await
            .unwrap();
        assert_eq!(accepted.status, OrderStatus::Processing);
        assert_eq!(accepted.status_history.len(), 2);
        assert_eq!(
            accepted.status_history[1].previous_status,
            Some(OrderStatus::Pending)
        );
        assert_eq!(h.drain_events().len(), 1);
    }

    #[tokio::test]
    async fn each_transition_adds_one_history_row() {
        let h = Harness::new().await;
        let order = h.orders.create_order(h.basket(), Some(h.staff)).await.unwrap();

        for status in [
            OrderStatus::Processing,
            OrderStatus::Completed,
            OrderStatus::ReadyForDelivery,
            OrderStatus::Cancelled,
        ] {
            h.orders
                .change_status(order.id, ChangeOrderStatus::to(status), h.staff)
                .await
                .unwrap();
        }

        let loaded = h.orders.get_order(order.id).await.unwrap();
        assert_eq!(loaded.status, OrderStatus::Cancelled);
        assert_eq!(loaded.status_history.len(), 5);
    }

    #[tokio::test]
    async fn missing_order_is_not_found() {
        let h = Harness::new().await;
        let result = h
            .orders
            .change_status(
                OrderId::new(),
                ChangeOrderStatus::to(OrderStatus::Processing),
                h.staff,
            )
            .await;
        assert!(matches!(result, Err(ServiceError::NotFound { .. })));
    }
}

mod queries {
    use super::*;

    #[tokio::test]
    async fn lists_and_counts_orders() {
        let h = Harness::new().await;
        for _ in 0..3 {
            h.orders.create_order(h.basket(), Some(h.staff)).await.unwrap();
        }
        let cancelled = h.orders.create_order(h.basket(), Some(h.staff)).await.unwrap();
        h.orders
            .change_status(cancelled.id, ChangeOrderStatus::to(OrderStatus::Cancelled), h.staff)
            .await
            .unwrap();

        let page = h
            .orders
            .list_orders(&OrderQuery::new().status(OrderStatus::Pending).page(1, 2))
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);

        let stats = h.orders.statistics(DateRange::default()).await.unwrap();
        assert_eq!(stats.total_orders, 4);
        assert_eq!(stats.total_revenue, Money::new(75000));
        assert_eq!(stats.average_order_value, Money::new(25000));
        assert_eq!(stats.recent_orders.len(), 4);
    }

    #[tokio::test]
    async fn validating_a_code_does_not_redeem_it() {
        let h = Harness::new().await;
        h.add_code("SAVE10", 10, Some(2000), None).await;

        let result = h
            .orders
            .validate_discount_code("SAVE10", Money::new(25000))
            .await
            .unwrap();
        assert!(result.is_valid);
        assert_eq!(result.discount_amount, Money::new(2000));
        assert_eq!(h.used_count("SAVE10").await, 0);

        let unknown = h
            .orders
            .validate_discount_code("NOPE", Money::new(25000))
            .await
            .unwrap();
        assert!(!unknown.is_valid);
    }

    #[tokio::test]
    async fn reference_lists_are_complete() {
        let h = Harness::new().await;
        assert_eq!(h.orders.order_statuses().len(), 5);
        assert_eq!(h.orders.payment_methods().len(), 5);
        assert_eq!(h.deliveries.delivery_statuses().len(), 7);
        assert_eq!(h.deliveries.available_shippers().await.unwrap().len(), 1);
    }
}

mod delivery {
    use super::*;

    #[tokio::test]
    async fn processing_order_cannot_get_a_shipper() {
        let h = Harness::new().await;
        let order = h.orders.create_order(h.basket(), Some(h.staff)).await.unwrap();
        h.orders
            .change_status(order.id, ChangeOrderStatus::to(OrderStatus::Processing), h.staff)
            .await
            .unwrap();

        let result = h
            .deliveries
            .assign_shipper(order.id, AssignShipper::direct(h.shipper), h.staff)
            .await;
        assert!(matches!(
            result,
            Err(ServiceError::Validation { field: "status", .. })
        ));
    }

    #[tokio::test]
    async fn direct_assignment_stamps_the_order() {
        let mut h = Harness::new().await;
        let order = h.ready_order().await;

        let assignment = h
            .deliveries
            .assign_shipper(order.id, AssignShipper::direct(h.shipper), h.staff)
            .await
            .unwrap();

        let Assignment::Direct(assigned) = assignment else {
            panic!("expected a direct assignment");
        };
        assert_eq!(assigned.shipper_id, Some(h.shipper));
        assert_eq!(assigned.delivery_status, DeliveryStatus::Assigned);
        assert!(h.deliveries.deliveries_for_order(order.id).await.unwrap().is_empty());

        let events = h.drain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "order_update");
    }

    #[tokio::test]
    async fn split_assignment_ships_everything_once() {
        let mut h = Harness::new().await;
        let order = h.ready_order().await;
        let request = AssignShipper {
            split: true,
            ..AssignShipper::direct(h.shipper)
        };

        let assignment = h
            .deliveries
            .assign_shipper(order.id, request.clone(), h.staff)
            .await
            .unwrap();
        let Assignment::Split(deliveries) = assignment else {
            panic!("expected a split assignment");
        };
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].status, DeliveryStatus::Assigned);
        assert_eq!(deliveries[0].items.len(), 2);
        assert_eq!(h.drain_events()[0]["type"], "delivery_update");

        let again = h.deliveries.assign_shipper(order.id, request, h.staff).await;
        assert!(matches!(
            again,
            Err(ServiceError::Validation { field: "items", .. })
        ));
    }

    #[tokio::test]
    async fn split_cannot_exceed_ordered_quantity() {
        let mut h = Harness::new().await;
        let order = h.ready_order().await;
        let bread = order.items.iter().find(|i| i.variant_id == h.bread).unwrap().id;

        let group = |quantity| ShipmentGroup {
            shipper_id: h.shipper,
            estimated_delivery_time: None,
            notes: None,
            items: vec![DeliveryOrderItem {
                order_item_id: bread,
                quantity,
            }],
        };

        // Two groups of 1 + 2 exceed the 2 ordered.
        let over = h
            .deliveries
            .split_order(
                order.id,
                SplitOrder {
                    deliveries: vec![group(1), group(2)],
                },
                h.staff,
            )
            .await;
        assert!(matches!(
            over,
            Err(ServiceError::Validation { field: "quantity", .. })
        ));
        assert!(h.deliveries.deliveries_for_order(order.id).await.unwrap().is_empty());

        let created = h
            .deliveries
            .split_order(
                order.id,
                SplitOrder {
                    deliveries: vec![group(1), group(1)],
                },
                h.staff,
            )
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
        assert!(created.iter().all(|d| d.status == DeliveryStatus::Assigned));

        let more = h
            .deliveries
            .split_order(order.id, SplitOrder { deliveries: vec![group(1)] }, h.staff)
            .await;
        assert!(more.is_err());
    }

    #[tokio::test]
    async fn huge_split_quantities_do_not_wrap_past_the_check() {
        let mut h = Harness::new().await;
        let order = h.ready_order().await;
        let bread = order.items.iter().find(|i| i.variant_id == h.bread).unwrap().id;

        let group = |quantity| ShipmentGroup {
            shipper_id: h.shipper,
            estimated_delivery_time: None,
            notes: None,
            items: vec![DeliveryOrderItem {
                order_item_id: bread,
                quantity,
            }],
        };

        for quantities in [[u32::MAX, 2], [MAX_QUANTITY, 2]] {
            let result = h
                .deliveries
                .split_order(
                    order.id,
                    SplitOrder {
                        deliveries: quantities.into_iter().map(group).collect(),
                    },
                    h.staff,
                )
                .await;
            assert!(matches!(
                result,
                Err(ServiceError::Validation { field: "quantity", .. })
            ));
        }
        assert!(h.deliveries.deliveries_for_order(order.id).await.unwrap().is_empty());
        assert!(h.drain_events().is_empty());
    }

    #[tokio::test]
    async fn cancelled_delivery_releases_its_quantity() {
        let mut h = Harness::new().await;
        let order = h.ready_order().await;
        let milk = order.items.iter().find(|i| i.variant_id == h.milk).unwrap().id;

        let shipment = ShipmentGroup {
            shipper_id: h.shipper,
            estimated_delivery_time: None,
            notes: None,
            items: vec![DeliveryOrderItem {
                order_item_id: milk,
                quantity: 1,
            }],
        };
        let delivery = h
            .deliveries
            .create_delivery(
                CreateDelivery {
                    order_id: order.id,
                    shipment: shipment.clone(),
                },
                h.staff,
            )
            .await
            .unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Pending);

        let cancelled = h
            .deliveries
            .update_delivery_status(
                delivery.id,
                ChangeDeliveryStatus {
                    status: DeliveryStatus::Cancelled,
                    notes: Some("customer away".to_string()),
                },
                h.staff,
            )
            .await
            .unwrap();
        assert_eq!(cancelled.status, DeliveryStatus::Cancelled);

        h.deliveries
            .create_delivery(
                CreateDelivery {
                    order_id: order.id,
                    shipment,
                },
                h.staff,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delivery_walks_to_delivered() {
        let mut h = Harness::new().await;
        let order = h.ready_order().await;
        let request = AssignShipper {
            split: true,
            ..AssignShipper::direct(h.shipper)
        };
        let Assignment::Split(mut deliveries) = h
            .deliveries
            .assign_shipper(order.id, request, h.staff)
            .await
            .unwrap()
        else {
            panic!("expected a split assignment");
        };
        let delivery = deliveries.remove(0);

        let skipped = h
            .deliveries
            .update_delivery_status(
                delivery.id,
                ChangeDeliveryStatus {
                    status: DeliveryStatus::Delivered,
                    notes: None,
                },
                h.staff,
            )
            .await;
        assert!(matches!(skipped, Err(ServiceError::Validation { .. })));

        let mut current = delivery;
        for status in [
            DeliveryStatus::PickedUp,
            DeliveryStatus::InTransit,
            DeliveryStatus::Delivered,
        ] {
            current = h
                .deliveries
                .update_delivery_status(
                    current.id,
                    ChangeDeliveryStatus {
                        status,
                        notes: None,
                    },
                    h.staff,
                )
                .await
                .unwrap();
        }
        assert_eq!(current.status, DeliveryStatus::Delivered);
        assert!(current.actual_delivery_time.is_some());

        let locked = h
            .deliveries
            .update_delivery(
                current.id,
                UpdateDelivery {
                    shipper_id: Some(h.shipper),
                    ..Default::default()
                },
                h.staff,
            )
            .await;
        assert!(locked.is_err());

        let noted = h
            .deliveries
            .update_delivery(
                current.id,
                UpdateDelivery {
                    notes: Some("left at door".to_string()),
                    ..Default::default()
                },
                h.staff,
            )
            .await
            .unwrap();
        assert_eq!(noted.notes.as_deref(), Some("left at door"));
    }

    #[tokio::test]
    async fn inactive_shipper_is_rejected() {
        let mut h = Harness::new().await;
        let order = h.ready_order().await;
        let mut retired = Shipper::new("Retired", "0933333333");
        retired.is_active = false;
        let retired_id = retired.id;
        h.store.add_shipper(retired).await;

        let result = h
            .deliveries
            .assign_shipper(order.id, AssignShipper::direct(retired_id), h.staff)
            .await;
        assert!(matches!(
            result,
            Err(ServiceError::Validation {
                field: "shipper_id",
                ..
            })
        ));
        assert_eq!(h.deliveries.available_shippers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn shipped_item_cannot_be_removed_from_order() {
        let mut h = Harness::new().await;
        let order = h.ready_order().await;
        let request = AssignShipper {
            split: true,
            ..AssignShipper::direct(h.shipper)
        };
        h.deliveries
            .assign_shipper(order.id, request, h.staff)
            .await
            .unwrap();

        let bread = order.items.iter().find(|i| i.variant_id == h.bread).unwrap().id;
        let update = UpdateOrder::new("Lan", "0900000000").item(UpdateOrderItem::existing(bread, 2));
        let result = h.orders.update_order(order.id, update, h.staff).await;
        assert!(matches!(
            result,
            Err(ServiceError::Validation { field: "items", .. })
        ));
    }
}
