//! HTTP and WebSocket server for the order and delivery services.
//!
//! Exposes the order manager and delivery orchestrator as JSON endpoints,
//! streams committed updates to WebSocket observers, and carries structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use hub::EventHub;
use metrics_exporter_prometheus::PrometheusHandle;
use services::{DeliveryOrchestrator, OrderManager};
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::metrics::MetricsState;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub orders: OrderManager<S>,
    pub deliveries: DeliveryOrchestrator<S>,
    pub hub: EventHub,
}

impl<S: Store + Clone> AppState<S> {
    /// Wires both use-case services to one store and one hub.
    pub fn new(store: S, hub: EventHub) -> Self {
        Self {
            orders: OrderManager::new(store.clone(), hub.clone()),
            deliveries: DeliveryOrchestrator::new(store, hub.clone()),
            hub,
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(MetricsState {
            handle: metrics_handle,
            hub: state.hub.clone(),
        });

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/ws", get(routes::ws::handle::<S>))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/statistics", get(routes::orders::statistics::<S>))
        .route("/orders/statuses", get(routes::orders::statuses::<S>))
        .route(
            "/orders/payment-methods",
            get(routes::orders::payment_methods::<S>),
        )
        .route(
            "/orders/validate-discount",
            post(routes::orders::validate_discount::<S>),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get::<S>).put(routes::orders::update::<S>),
        )
        .route(
            "/orders/{id}/status",
            put(routes::orders::change_status::<S>),
        )
        .route(
            "/orders/{id}/assign-shipper",
            post(routes::orders::assign_shipper::<S>),
        )
        .route("/orders/{id}/split", post(routes::orders::split::<S>))
        .route(
            "/orders/{id}/deliveries",
            get(routes::orders::deliveries::<S>),
        )
        .route(
            "/deliveries",
            post(routes::deliveries::create::<S>).get(routes::deliveries::list::<S>),
        )
        .route(
            "/deliveries/statuses",
            get(routes::deliveries::statuses::<S>),
        )
        .route(
            "/deliveries/shippers",
            get(routes::deliveries::shippers::<S>),
        )
        .route(
            "/deliveries/{id}",
            get(routes::deliveries::get::<S>).put(routes::deliveries::update::<S>),
        )
        .route(
            "/deliveries/{id}/status",
            put(routes::deliveries::update_status::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
