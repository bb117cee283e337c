//! Listing queries, pagination and statistics.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use common::{OrderId, ShipperId};
use serde::{Deserialize, Serialize};

use crate::delivery::{DeliveryOrder, DeliveryStatus};
use crate::money::Money;
use crate::order::{Order, OrderStatus};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Columns orders can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    OrderNumber,
    CustomerName,
    TotalAmount,
    Status,
}

impl OrderSortField {
    pub fn column(&self) -> &'static str {
        match self {
            OrderSortField::CreatedAt => "created_at",
            OrderSortField::UpdatedAt => "updated_at",
            OrderSortField::OrderNumber => "order_number",
            OrderSortField::CustomerName => "customer_name",
            OrderSortField::TotalAmount => "total_amount",
            OrderSortField::Status => "status",
        }
    }
}

/// Columns deliveries can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliverySortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    EstimatedDeliveryTime,
    Status,
}

impl DeliverySortField {
    pub fn column(&self) -> &'static str {
        match self {
            DeliverySortField::CreatedAt => "created_at",
            DeliverySortField::UpdatedAt => "updated_at",
            DeliverySortField::EstimatedDeliveryTime => "estimated_delivery_time",
            DeliverySortField::Status => "status",
        }
    }
}

/// Page selection shared by every listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    /// Clamps page to at least 1 and limit to `1..=MAX_PAGE_SIZE`.
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit
                .filter(|l| *l > 0)
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .min(MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

/// Filter for listing orders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    pub pagination: Pagination,
    pub status: Option<OrderStatus>,
    /// Case-insensitive match on order number, customer name or phone.
    pub search: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub sort_by: OrderSortField,
    pub sort_order: SortOrder,
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32, limit: u32) -> Self {
        self.pagination = Pagination::new(Some(page), Some(limit));
        self
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        let term = term.into();
        self.search = (!term.trim().is_empty()).then(|| term.trim().to_string());
        self
    }

    pub fn date_from(mut self, from: DateTime<Utc>) -> Self {
        self.date_from = Some(from);
        self
    }

    pub fn date_to(mut self, to: DateTime<Utc>) -> Self {
        self.date_to = Some(to);
        self
    }

    pub fn sort(mut self, field: OrderSortField, order: SortOrder) -> Self {
        self.sort_by = field;
        self.sort_order = order;
        self
    }

    /// Returns true if `order` passes every filter.
    pub fn matches(&self, order: &Order) -> bool {
        if self.status.is_some_and(|s| s != order.status) {
            return false;
        }
        if self.date_from.is_some_and(|from| order.created_at < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| order.created_at > to) {
            return false;
        }
        if let Some(term) = &self.search {
            let term = term.to_lowercase();
            let hit = [
                &order.order_number,
                &order.customer_name,
                &order.customer_phone,
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Filter for listing deliveries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryQuery {
    pub pagination: Pagination,
    pub order_id: Option<OrderId>,
    pub shipper_id: Option<ShipperId>,
    pub status: Option<DeliveryStatus>,
    pub sort_by: DeliverySortField,
    pub sort_order: SortOrder,
}

impl DeliveryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32, limit: u32) -> Self {
        self.pagination = Pagination::new(Some(page), Some(limit));
        self
    }

    pub fn order(mut self, id: OrderId) -> Self {
        self.order_id = Some(id);
        self
    }

    pub fn shipper(mut self, id: ShipperId) -> Self {
        self.shipper_id = Some(id);
        self
    }

    pub fn status(mut self, status: DeliveryStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, delivery: &DeliveryOrder) -> bool {
        self.order_id.is_none_or(|id| id == delivery.order_id)
            && self.shipper_id.is_none_or(|id| id == delivery.shipper_id)
            && self.status.is_none_or(|s| s == delivery.status)
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            page: pagination.page,
            limit: pagination.limit,
            pages: total.div_ceil(u64::from(pagination.limit.max(1))),
        }
    }
}

/// Inclusive time window for statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| at >= from) && self.to.is_none_or(|to| at <= to)
    }
}

/// Orders and revenue for one calendar day (UTC).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub order_count: u64,
    pub revenue: Money,
}

/// Aggregate figures over a date range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatistics {
    pub total_orders: u64,
    /// Sum of `total_amount` over non-cancelled orders.
    pub total_revenue: Money,
    pub average_order_value: Money,
    pub status_counts: BTreeMap<String, u64>,
    pub daily_stats: Vec<DailyStats>,
    pub recent_orders: Vec<Order>,
}

impl OrderStatistics {
    /// Folds a set of orders into statistics, without recent orders.
    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Self {
        let mut stats = OrderStatistics::default();
        let mut revenue_orders = 0i64;
        let mut daily: BTreeMap<NaiveDate, (u64, Money)> = BTreeMap::new();

        for order in orders {
            stats.total_orders += 1;
            *stats
                .status_counts
                .entry(order.status.as_str().to_string())
                .or_default() += 1;

            let day = daily.entry(order.created_at.date_naive()).or_default();
            day.0 += 1;
            if order.status != OrderStatus::Cancelled {
                stats.total_revenue += order.totals.total_amount;
                revenue_orders += 1;
                day.1 += order.totals.total_amount;
            }
        }

        stats.average_order_value = if revenue_orders > 0 {
            Money::new(stats.total_revenue.amount() / revenue_orders)
        } else {
            Money::zero()
        };
        stats.daily_stats = daily
            .into_iter()
            .map(|(date, (order_count, revenue))| DailyStats {
                date,
                order_count,
                revenue,
            })
            .collect();
        stats
    }
}
