//! Prometheus metrics endpoint.

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use hub::EventHub;
use metrics_exporter_prometheus::PrometheusHandle;

/// State of the metrics router.
#[derive(Clone)]
pub struct MetricsState {
    pub handle: PrometheusHandle,
    pub hub: EventHub,
}

/// GET /metrics: Prometheus text exposition, with a fresh observer gauge.
pub async fn get(State(state): State<MetricsState>) -> impl IntoResponse {
    metrics::gauge!("hub_observers").set(state.hub.observer_count() as f64);
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.handle.render(),
    )
}
