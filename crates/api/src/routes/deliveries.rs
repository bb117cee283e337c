//! Delivery endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{DeliveryId, OrderId, ShipperId};
use domain::delivery::{ChangeDeliveryStatus, CreateDelivery, UpdateDelivery};
use domain::query::{DeliverySortField, SortOrder};
use domain::{DeliveryOrder, DeliveryQuery, DeliveryStatus, Page, Pagination, Shipper};
use serde::Deserialize;
use services::Choice;
use store::Store;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;
use crate::extract::Actor;

/// Query string of `GET /deliveries`.
#[derive(Debug, Default, Deserialize)]
pub struct DeliveryListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub order_id: Option<OrderId>,
    pub shipper_id: Option<ShipperId>,
    pub status: Option<DeliveryStatus>,
    pub sort_by: Option<DeliverySortField>,
    pub sort_order: Option<SortOrder>,
}

impl From<DeliveryListParams> for DeliveryQuery {
    fn from(params: DeliveryListParams) -> Self {
        DeliveryQuery {
            pagination: Pagination::new(params.page, params.limit),
            order_id: params.order_id,
            shipper_id: params.shipper_id,
            status: params.status,
            sort_by: params.sort_by.unwrap_or_default(),
            sort_order: params.sort_order.unwrap_or_default(),
        }
    }
}

/// POST /deliveries: a single pending shipment.
#[tracing::instrument(skip(state, req), fields(order_id = %req.order_id))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Actor(actor): Actor,
    Json(req): Json<CreateDelivery>,
) -> Result<(StatusCode, Json<DeliveryOrder>), ApiError> {
    let delivery = state.deliveries.create_delivery(req, actor).await?;
    Ok((StatusCode::CREATED, Json(delivery)))
}

/// GET /deliveries
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<DeliveryListParams>,
) -> Result<Json<Page<DeliveryOrder>>, ApiError> {
    let query = DeliveryQuery::from(params);
    Ok(Json(state.deliveries.list_deliveries(&query).await?))
}

/// GET /deliveries/statuses
pub async fn statuses<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<Vec<Choice>> {
    Json(state.deliveries.delivery_statuses())
}

/// GET /deliveries/shippers: active shippers only.
#[tracing::instrument(skip(state))]
pub async fn shippers<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Shipper>>, ApiError> {
    Ok(Json(state.deliveries.available_shippers().await?))
}

/// GET /deliveries/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<DeliveryOrder>, ApiError> {
    let id: DeliveryId = parse_id(&id)?;
    Ok(Json(state.deliveries.get_delivery(id).await?))
}

/// PUT /deliveries/{id}
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Actor(actor): Actor,
    Json(req): Json<UpdateDelivery>,
) -> Result<Json<DeliveryOrder>, ApiError> {
    let id: DeliveryId = parse_id(&id)?;
    Ok(Json(state.deliveries.update_delivery(id, req, actor).await?))
}

/// PUT /deliveries/{id}/status
#[tracing::instrument(skip(state, req), fields(to = %req.status))]
pub async fn update_status<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Actor(actor): Actor,
    Json(req): Json<ChangeDeliveryStatus>,
) -> Result<Json<DeliveryOrder>, ApiError> {
    let id: DeliveryId = parse_id(&id)?;
    Ok(Json(
        state.deliveries.update_delivery_status(id, req, actor).await?,
    ))
}
