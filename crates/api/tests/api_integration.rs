//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{ShipperId, UserId, VariantId};
use domain::order::VariantSnapshot;
use domain::{Money, Shipper, UserIdentity};
use hub::EventHub;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct Fixture {
    app: axum::Router,
    staff: UserId,
    bread: VariantId,
    milk: VariantId,
    shipper: ShipperId,
}

async fn setup() -> Fixture {
    let store = InMemoryStore::new();

    let staff = UserId::new();
    store
        .add_user(UserIdentity {
            id: staff,
            full_name: "Staff".to_string(),
            phone: None,
            email: None,
            is_guest: false,
        })
        .await;

    let bread = VariantId::new();
    let milk = VariantId::new();
    for (variant_id, product, price) in [(bread, "Bread", 10000), (milk, "Milk", 5000)] {
        store
            .add_variant(VariantSnapshot {
                variant_id,
                product_name: product.to_string(),
                variant_name: "Regular".to_string(),
                price: Money::new(price),
            })
            .await;
    }

    let shipper = Shipper::new("Minh", "0922222222");
    let shipper_id = shipper.id;
    store.add_shipper(shipper).await;

    let state = Arc::new(api::AppState::new(store, EventHub::new(16)));
    Fixture {
        app: api::create_app(state, get_metrics_handle()),
        staff,
        bread,
        milk,
        shipper: shipper_id,
    }
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    actor: Option<UserId>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header("x-user-id", actor.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, json)
}

impl Fixture {
    fn basket(&self) -> Value {
        json!({
            "customer_name": "Lan",
            "customer_phone": "0900000000",
            "items": [
                { "variant_id": self.bread, "quantity": 2 },
                { "variant_id": self.milk, "quantity": 1 }
            ]
        })
    }

    async fn create_order(&self) -> Value {
        let (status, order) = send(
            &self.app,
            "POST",
            "/orders",
            Some(self.staff),
            Some(self.basket()),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        order
    }

    async fn move_to(&self, order_id: &str, status: &str) -> (StatusCode, Value) {
        send(
            &self.app,
            "PUT",
            &format!("/orders/{order_id}/status"),
            Some(self.staff),
            Some(json!({ "status": status })),
        )
        .await
    }
}

#[tokio::test]
async fn test_health_check() {
    let f = setup().await;

    let (status, json) = send(&f.app, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["observers"], 0);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let f = setup().await;
    f.create_order().await;

    let response = f
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_anonymous_order_is_priced() {
    let f = setup().await;

    let (status, order) = send(&f.app, "POST", "/orders", None, Some(f.basket())).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["subtotal"], 25000);
    assert_eq!(order["total_amount"], 25000);
    assert_eq!(order["items_count"], 2);
    assert_eq!(order["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_create_order_validation_reports_field() {
    let f = setup().await;
    let body = json!({
        "customer_name": "Lan",
        "customer_phone": "0900000000",
        "items": []
    });

    let (status, json) = send(&f.app, "POST", "/orders", Some(f.staff), Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["field"], "items");
    assert!(json["error"].as_str().is_some());
}

#[tokio::test]
async fn test_out_of_range_quantity_and_fee_are_bad_requests() {
    let f = setup().await;

    let mut body = f.basket();
    body["items"][0]["quantity"] = json!(2_147_483_648_u64);
    let (status, json) = send(&f.app, "POST", "/orders", Some(f.staff), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["field"], "quantity");

    let mut body = f.basket();
    body["shipping_fee"] = json!(i64::MAX);
    let (status, json) = send(&f.app, "POST", "/orders", Some(f.staff), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["field"], "shipping_fee");
}

#[tokio::test]
async fn test_unknown_or_malformed_actor_is_unauthorized() {
    let f = setup().await;

    let (status, _) = send(
        &f.app,
        "POST",
        "/orders",
        Some(UserId::new()),
        Some(f.basket()),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let response = f
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/orders")
                .header("x-user-id", "not-a-uuid")
                .header("content-type", "application/json")
                .body(Body::from(f.basket().to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_mutations_require_actor() {
    let f = setup().await;
    let order = f.create_order().await;
    let id = order["id"].as_str().unwrap();

    let (status, json) = send(
        &f.app,
        "PUT",
        &format!("/orders/{id}/status"),
        None,
        Some(json!({ "status": "processing" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(json["error"].as_str().unwrap().contains("x-user-id"));
}

#[tokio::test]
async fn test_get_order_and_not_found() {
    let f = setup().await;
    let order = f.create_order().await;
    let id = order["id"].as_str().unwrap();

    let (status, loaded) = send(&f.app, "GET", &format!("/orders/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loaded["order_number"], order["order_number"]);
    assert_eq!(loaded["status_history"].as_array().unwrap().len(), 1);

    let missing = UserId::new();
    let (status, _) = send(&f.app, "GET", &format!("/orders/{missing}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&f.app, "GET", "/orders/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_status_transitions() {
    let f = setup().await;
    let order = f.create_order().await;
    let id = order["id"].as_str().unwrap();

    let (status, json) = f.move_to(id, "completed").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["field"], "status");

    let (status, json) = f.move_to(id, "processing").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "processing");
    assert_eq!(json["status_history"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_update_with_stale_version_conflicts() {
    let f = setup().await;
    let order = f.create_order().await;
    let id = order["id"].as_str().unwrap();
    let line = order["items"][0]["id"].clone();

    let body = json!({
        "customer_name": "Lan",
        "customer_phone": "0900000000",
        "items": [{ "id": line, "quantity": 5 }],
        "expected_version": 99
    });
    let (status, _) = send(
        &f.app,
        "PUT",
        &format!("/orders/{id}"),
        Some(f.staff),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let body = json!({
        "customer_name": "Lan",
        "customer_phone": "0900000000",
        "items": [{ "id": line, "quantity": 5 }],
        "expected_version": order["version"]
    });
    let (status, updated) = send(
        &f.app,
        "PUT",
        &format!("/orders/{id}"),
        Some(f.staff),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["items_count"], 1);
    assert_eq!(updated["subtotal"], 50000);
}

#[tokio::test]
async fn test_list_orders_filters_and_paginates() {
    let f = setup().await;
    for _ in 0..3 {
        f.create_order().await;
    }
    let order = f.create_order().await;
    f.move_to(order["id"].as_str().unwrap(), "processing").await;

    let (status, page) = send(
        &f.app,
        "GET",
        "/orders?status=pending&page=1&limit=2",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 3);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    assert_eq!(page["pages"], 2);

    let (status, _) = send(&f.app, "GET", "/orders?status=bogus", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_statistics_and_reference_lists() {
    let f = setup().await;
    f.create_order().await;

    let (status, stats) = send(&f.app, "GET", "/orders/statistics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_orders"], 1);
    assert_eq!(stats["total_revenue"], 25000);

    let (_, statuses) = send(&f.app, "GET", "/orders/statuses", None, None).await;
    assert_eq!(statuses.as_array().unwrap().len(), 5);
    assert_eq!(statuses[0]["value"], "pending");

    let (_, methods) = send(&f.app, "GET", "/orders/payment-methods", None, None).await;
    assert_eq!(methods.as_array().unwrap().len(), 5);

    let (_, statuses) = send(&f.app, "GET", "/deliveries/statuses", None, None).await;
    assert_eq!(statuses.as_array().unwrap().len(), 7);

    let (_, shippers) = send(&f.app, "GET", "/deliveries/shippers", None, None).await;
    assert_eq!(shippers.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_validate_unknown_discount_code() {
    let f = setup().await;

    let (status, result) = send(
        &f.app,
        "POST",
        "/orders/validate-discount",
        None,
        Some(json!({ "code": "NOPE", "order_amount": 25000 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["is_valid"], false);
}

#[tokio::test]
async fn test_assign_requires_eligible_order() {
    let f = setup().await;
    let order = f.create_order().await;
    let id = order["id"].as_str().unwrap();
    f.move_to(id, "processing").await;

    let body = json!({ "shipper_id": f.shipper, "split": false });
    let (status, json) = send(
        &f.app,
        "POST",
        &format!("/orders/{id}/assign-shipper"),
        Some(f.staff),
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["field"], "status");

    f.move_to(id, "ready_for_delivery").await;
    let (status, json) = send(
        &f.app,
        "POST",
        &format!("/orders/{id}/assign-shipper"),
        Some(f.staff),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["mode"], "direct");
    assert_eq!(json["result"]["delivery_status"], "assigned");
}

#[tokio::test]
async fn test_split_and_track_delivery() {
    let f = setup().await;
    let order = f.create_order().await;
    let id = order["id"].as_str().unwrap();
    f.move_to(id, "processing").await;
    f.move_to(id, "ready_for_delivery").await;

    let lines: Vec<Value> = order["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|item| json!({ "order_item_id": item["id"], "quantity": item["quantity"] }))
        .collect();
    let body = json!({
        "deliveries": [
            { "shipper_id": f.shipper, "items": [lines[0].clone()] },
            { "shipper_id": f.shipper, "items": [lines[1].clone()] }
        ]
    });
    let (status, created) = send(
        &f.app,
        "POST",
        &format!("/orders/{id}/split"),
        Some(f.staff),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created.as_array().unwrap().len(), 2);

    let (status, deliveries) = send(
        &f.app,
        "GET",
        &format!("/orders/{id}/deliveries"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deliveries.as_array().unwrap().len(), 2);

    let delivery_id = created[0]["id"].as_str().unwrap();
    let (status, picked) = send(
        &f.app,
        "PUT",
        &format!("/deliveries/{delivery_id}/status"),
        Some(f.staff),
        Some(json!({ "status": "picked_up" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(picked["status"], "picked_up");

    let (status, page) = send(
        &f.app,
        "GET",
        &format!("/deliveries?order_id={id}&status=picked_up"),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);

    // Everything is already shipped.
    let (status, _) = send(
        &f.app,
        "POST",
        "/deliveries",
        Some(f.staff),
        Some(json!({
            "order_id": id,
            "shipper_id": f.shipper,
            "items": [lines[0].clone()]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
