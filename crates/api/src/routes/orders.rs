//! Order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::delivery::{AssignShipper, SplitOrder};
use domain::order::{ChangeOrderStatus, CreateOrder, UpdateOrder};
use domain::pricing::DiscountValidation;
use domain::query::{DateRange, OrderSortField, OrderStatistics, SortOrder};
use domain::{DeliveryOrder, Money, Order, OrderQuery, OrderStatus, Page, Pagination};
use serde::Deserialize;
use services::{Assignment, Choice};
use store::Store;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;
use crate::extract::{Actor, MaybeActor};

// -- Request types --

/// Query string of `GET /orders`.
#[derive(Debug, Default, Deserialize)]
pub struct OrderListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<OrderStatus>,
    pub search: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub sort_by: Option<OrderSortField>,
    pub sort_order: Option<SortOrder>,
}

impl From<OrderListParams> for OrderQuery {
    fn from(params: OrderListParams) -> Self {
        OrderQuery {
            pagination: Pagination::new(params.page, params.limit),
            status: params.status,
            search: params
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            date_from: params.date_from,
            date_to: params.date_to,
            sort_by: params.sort_by.unwrap_or_default(),
            sort_order: params.sort_order.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatisticsParams {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct ValidateDiscountRequest {
    pub code: String,
    pub order_amount: Money,
}

// -- Handlers --

/// POST /orders: anonymous callers order as a guest.
#[tracing::instrument(skip(state, req))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    MaybeActor(actor): MaybeActor,
    Json(req): Json<CreateOrder>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.orders.create_order(req, actor).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders: filtered, paginated order headers.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<OrderListParams>,
) -> Result<Json<Page<Order>>, ApiError> {
    let query = OrderQuery::from(params);
    Ok(Json(state.orders.list_orders(&query).await?))
}

/// GET /orders/statistics
#[tracing::instrument(skip(state))]
pub async fn statistics<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Query(params): Query<StatisticsParams>,
) -> Result<Json<OrderStatistics>, ApiError> {
    let range = DateRange {
        from: params.date_from,
        to: params.date_to,
    };
    Ok(Json(state.orders.statistics(range).await?))
}

/// GET /orders/statuses
pub async fn statuses<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<Vec<Choice>> {
    Json(state.orders.order_statuses())
}

/// GET /orders/payment-methods
pub async fn payment_methods<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<Vec<Choice>> {
    Json(state.orders.payment_methods())
}

/// POST /orders/validate-discount: checks a code without redeeming it.
#[tracing::instrument(skip(state, req), fields(code = %req.code))]
pub async fn validate_discount<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<ValidateDiscountRequest>,
) -> Result<Json<DiscountValidation>, ApiError> {
    let result = state
        .orders
        .validate_discount_code(&req.code, req.order_amount)
        .await?;
    Ok(Json(result))
}

/// GET /orders/{id}: the order with items and status history.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    Ok(Json(state.orders.get_order(id).await?))
}

/// PUT /orders/{id}: replaces customer fields, items and discount.
#[tracing::instrument(skip(state, req))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Actor(actor): Actor,
    Json(req): Json<UpdateOrder>,
) -> Result<Json<Order>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    Ok(Json(state.orders.update_order(id, req, actor).await?))
}

/// PUT /orders/{id}/status
#[tracing::instrument(skip(state, req))]
pub async fn change_status<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Actor(actor): Actor,
    Json(req): Json<ChangeOrderStatus>,
) -> Result<Json<Order>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    Ok(Json(state.orders.change_status(id, req, actor).await?))
}

/// POST /orders/{id}/assign-shipper
#[tracing::instrument(skip(state, req))]
pub async fn assign_shipper<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Actor(actor): Actor,
    Json(req): Json<AssignShipper>,
) -> Result<Json<Assignment>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    Ok(Json(state.deliveries.assign_shipper(id, req, actor).await?))
}

/// POST /orders/{id}/split: one shipment per group.
#[tracing::instrument(skip(state, req), fields(groups = req.deliveries.len()))]
pub async fn split<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Actor(actor): Actor,
    Json(req): Json<SplitOrder>,
) -> Result<(StatusCode, Json<Vec<DeliveryOrder>>), ApiError> {
    let id: OrderId = parse_id(&id)?;
    let deliveries = state.deliveries.split_order(id, req, actor).await?;
    Ok((StatusCode::CREATED, Json(deliveries)))
}

/// GET /orders/{id}/deliveries
#[tracing::instrument(skip(state))]
pub async fn deliveries<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<DeliveryOrder>>, ApiError> {
    let id: OrderId = parse_id(&id)?;
    Ok(Json(state.deliveries.deliveries_for_order(id).await?))
}
