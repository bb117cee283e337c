use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{DeliveryId, OrderId, OrderItemId, ShipperId, UserId, VariantId};
use domain::order::VariantSnapshot;
use domain::query::{DailyStats, DateRange, OrderStatistics};
use domain::{
    DeliveryOrder, DeliveryOrderItem, DeliveryQuery, DiscountCode, DomainError, GuestContact,
    Money, Order, OrderItem, OrderQuery, OrderStatusHistory, Page, Shipper, Totals, UserIdentity,
};
use sqlx::{PgExecutor, PgPool, Postgres, Row, Transaction, postgres::PgPoolOptions, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{Store, StoreTx},
};

const ORDER_SELECT: &str = r#"
    SELECT o.id AS row_id, o.public_id, o.order_number, o.customer_name, o.customer_phone,
           o.customer_email, o.status, o.subtotal, o.discount_amount, o.manual_discount_amount,
           o.discount_type, o.discount_code, o.discount_note, o.shipping_fee, o.total_amount,
           o.payment_method, o.payment_status, o.notes, s.public_id AS shipper_public_id,
           o.delivery_status, o.estimated_delivery_time, o.delivery_notes,
           cu.public_id AS created_by_public_id, uu.public_id AS updated_by_public_id,
           o.created_at, o.updated_at, o.items_count, o.version
    FROM orders o
    JOIN users cu ON cu.id = o.created_by
    JOIN users uu ON uu.id = o.updated_by
    LEFT JOIN shippers s ON s.id = o.shipper_id
"#;

const ORDER_FILTER: &str = r#"
    WHERE ($1::text IS NULL OR o.status = $1)
      AND ($2::text IS NULL
           OR o.order_number ILIKE $2
           OR o.customer_name ILIKE $2
           OR o.customer_phone ILIKE $2)
      AND ($3::timestamptz IS NULL OR o.created_at >= $3)
      AND ($4::timestamptz IS NULL OR o.created_at <= $4)
"#;

const DELIVERY_SELECT: &str = r#"
    SELECT d.id AS row_id, d.public_id, o.public_id AS order_public_id,
           s.public_id AS shipper_public_id, d.delivery_number, d.status,
           d.estimated_delivery_time, d.actual_delivery_time, d.notes,
           cu.public_id AS created_by_public_id, uu.public_id AS updated_by_public_id,
           d.created_at, d.updated_at
    FROM delivery_orders d
    JOIN orders o ON o.id = d.order_id
    JOIN shippers s ON s.id = d.shipper_id
    JOIN users cu ON cu.id = d.created_by
    JOIN users uu ON uu.id = d.updated_by
"#;

const DELIVERY_FILTER: &str = r#"
    WHERE ($1::uuid IS NULL OR o.public_id = $1)
      AND ($2::uuid IS NULL OR s.public_id = $2)
      AND ($3::text IS NULL OR d.status = $3)
"#;

const SHIPPER_SELECT: &str = r#"
    SELECT s.public_id, s.name, s.phone, s.email, s.is_active,
           u.public_id AS created_by_public_id, s.created_at, s.updated_at
    FROM shippers s
    LEFT JOIN users u ON u.id = s.created_by
"#;

const DISCOUNT_SELECT: &str = r#"
    SELECT code, name, description, discount_type, value, min_order_amount,
           max_discount_amount, usage_limit, used_count, is_active, valid_from, valid_until
    FROM discount_codes
    WHERE code = $1
"#;

const USER_COLUMNS: &str = "public_id, full_name, phone, email, is_guest";

fn parse<T: FromStr<Err = DomainError>>(value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|e: DomainError| StoreError::Decode(e.to_string()))
}

fn parse_opt<T: FromStr<Err = DomainError>>(value: Option<String>) -> Result<Option<T>> {
    value.as_deref().map(parse).transpose()
}

fn count(value: i32) -> u32 {
    value.max(0) as u32
}

/// Converts a count or quantity to the `INTEGER` column type.
fn int_column(column: &'static str, value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| StoreError::OutOfRange {
        column,
        value: value.to_string(),
    })
}

/// Escapes LIKE metacharacters and wraps the term for a substring match.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn row_to_order(row: &PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    let payment_status: String = row.try_get("payment_status")?;
    let delivery_status: String = row.try_get("delivery_status")?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("public_id")?),
        order_number: row.try_get("order_number")?,
        customer_name: row.try_get("customer_name")?,
        customer_phone: row.try_get("customer_phone")?,
        customer_email: row.try_get("customer_email")?,
        status: parse(&status)?,
        totals: Totals {
            subtotal: Money::new(row.try_get("subtotal")?),
            discount_amount: Money::new(row.try_get("discount_amount")?),
            manual_discount_amount: Money::new(row.try_get("manual_discount_amount")?),
            discount_type: parse_opt(row.try_get("discount_type")?)?,
            discount_code: row.try_get("discount_code")?,
            discount_note: row.try_get("discount_note")?,
            shipping_fee: Money::new(row.try_get("shipping_fee")?),
            total_amount: Money::new(row.try_get("total_amount")?),
        },
        payment_method: row.try_get("payment_method")?,
        payment_status: parse(&payment_status)?,
        notes: row.try_get("notes")?,
        shipper_id: row
            .try_get::<Option<Uuid>, _>("shipper_public_id")?
            .map(ShipperId::from_uuid),
        delivery_status: parse(&delivery_status)?,
        estimated_delivery_time: row.try_get("estimated_delivery_time")?,
        delivery_notes: row.try_get("delivery_notes")?,
        created_by: UserId::from_uuid(row.try_get("created_by_public_id")?),
        updated_by: UserId::from_uuid(row.try_get("updated_by_public_id")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        items_count: count(row.try_get("items_count")?),
        version: row.try_get("version")?,
        items: Vec::new(),
        status_history: Vec::new(),
    })
}

fn row_to_item(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: OrderItemId::from_uuid(row.try_get("public_id")?),
        variant_id: VariantId::from_uuid(row.try_get("variant_public_id")?),
        product_name: row.try_get("product_name")?,
        variant_name: row.try_get("variant_name")?,
        unit_price: Money::new(row.try_get("unit_price")?),
        quantity: count(row.try_get("quantity")?),
        total_price: Money::new(row.try_get("total_price")?),
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_history(row: &PgRow) -> Result<OrderStatusHistory> {
    let status: String = row.try_get("status")?;
    Ok(OrderStatusHistory {
        status: parse(&status)?,
        previous_status: parse_opt(row.try_get("previous_status")?)?,
        notes: row.try_get("notes")?,
        changed_by: UserId::from_uuid(row.try_get("changed_by_public_id")?),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_delivery(row: &PgRow) -> Result<DeliveryOrder> {
    let status: String = row.try_get("status")?;
    Ok(DeliveryOrder {
        id: DeliveryId::from_uuid(row.try_get("public_id")?),
        order_id: OrderId::from_uuid(row.try_get("order_public_id")?),
        shipper_id: ShipperId::from_uuid(row.try_get("shipper_public_id")?),
        delivery_number: row.try_get("delivery_number")?,
        status: parse(&status)?,
        estimated_delivery_time: row.try_get("estimated_delivery_time")?,
        actual_delivery_time: row.try_get("actual_delivery_time")?,
        notes: row.try_get("notes")?,
        created_by: UserId::from_uuid(row.try_get("created_by_public_id")?),
        updated_by: UserId::from_uuid(row.try_get("updated_by_public_id")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        items: Vec::new(),
    })
}

fn row_to_shipper(row: &PgRow) -> Result<Shipper> {
    Ok(Shipper {
        id: ShipperId::from_uuid(row.try_get("public_id")?),
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        is_active: row.try_get("is_active")?,
        created_by: row
            .try_get::<Option<Uuid>, _>("created_by_public_id")?
            .map(UserId::from_uuid),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_discount(row: &PgRow) -> Result<DiscountCode> {
    let discount_type: String = row.try_get("discount_type")?;
    Ok(DiscountCode {
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        discount_type: parse(&discount_type)?,
        value: row.try_get("value")?,
        min_order_amount: Money::new(row.try_get("min_order_amount")?),
        max_discount_amount: row
            .try_get::<Option<i64>, _>("max_discount_amount")?
            .map(Money::new),
        usage_limit: row.try_get::<Option<i32>, _>("usage_limit")?.map(count),
        used_count: count(row.try_get("used_count")?),
        is_active: row.try_get("is_active")?,
        valid_from: row.try_get("valid_from")?,
        valid_until: row.try_get("valid_until")?,
    })
}

fn row_to_user(row: &PgRow) -> Result<UserIdentity> {
    Ok(UserIdentity {
        id: UserId::from_uuid(row.try_get("public_id")?),
        full_name: row.try_get("full_name")?,
        phone: row.try_get("phone")?,
        email: row.try_get("email")?,
        is_guest: row.try_get("is_guest")?,
    })
}

async fn fetch_order<'e, E: PgExecutor<'e>>(
    exec: E,
    id: OrderId,
    lock: bool,
) -> Result<Option<(i64, Order)>> {
    let sql = format!(
        "{ORDER_SELECT} WHERE o.public_id = $1{}",
        if lock { " FOR UPDATE OF o" } else { "" }
    );
    let row = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(exec)
        .await?;

    match row {
        Some(row) => Ok(Some((row.try_get("row_id")?, row_to_order(&row)?))),
        None => Ok(None),
    }
}

async fn fetch_items<'e, E: PgExecutor<'e>>(exec: E, order_row: i64) -> Result<Vec<OrderItem>> {
    let rows = sqlx::query(
        r#"
        SELECT oi.public_id, v.public_id AS variant_public_id, oi.product_name, oi.variant_name,
               oi.unit_price, oi.quantity, oi.total_price, oi.notes, oi.created_at, oi.updated_at
        FROM order_items oi
        JOIN product_variants v ON v.id = oi.variant_id
        WHERE oi.order_id = $1
        ORDER BY oi.id ASC
        "#,
    )
    .bind(order_row)
    .fetch_all(exec)
    .await?;

    rows.iter().map(row_to_item).collect()
}

async fn fetch_history<'e, E: PgExecutor<'e>>(
    exec: E,
    order_row: i64,
) -> Result<Vec<OrderStatusHistory>> {
    let rows = sqlx::query(
        r#"
        SELECT h.status, h.previous_status, h.notes, u.public_id AS changed_by_public_id,
               h.created_at
        FROM order_status_history h
        JOIN users u ON u.id = h.changed_by
        WHERE h.order_id = $1
        ORDER BY h.id ASC
        "#,
    )
    .bind(order_row)
    .fetch_all(exec)
    .await?;

    rows.iter().map(row_to_history).collect()
}

/// Loads the items of the given delivery rows, keyed by row id.
async fn fetch_delivery_items<'e, E: PgExecutor<'e>>(
    exec: E,
    delivery_rows: Vec<i64>,
) -> Result<HashMap<i64, Vec<DeliveryOrderItem>>> {
    let rows = sqlx::query(
        r#"
        SELECT doi.delivery_order_id, oi.public_id AS order_item_public_id, doi.quantity
        FROM delivery_order_items doi
        JOIN order_items oi ON oi.id = doi.order_item_id
        WHERE doi.delivery_order_id = ANY($1)
        ORDER BY doi.id ASC
        "#,
    )
    .bind(delivery_rows)
    .fetch_all(exec)
    .await?;

    let mut items: HashMap<i64, Vec<DeliveryOrderItem>> = HashMap::new();
    for row in rows {
        items
            .entry(row.try_get("delivery_order_id")?)
            .or_default()
            .push(DeliveryOrderItem {
                order_item_id: OrderItemId::from_uuid(row.try_get("order_item_public_id")?),
                quantity: count(row.try_get("quantity")?),
            });
    }
    Ok(items)
}

/// Maps delivery rows, returning them with their row ids for item loading.
fn deliveries_from_rows(rows: &[PgRow]) -> Result<(Vec<i64>, Vec<DeliveryOrder>)> {
    let mut ids = Vec::with_capacity(rows.len());
    let mut deliveries = Vec::with_capacity(rows.len());
    for row in rows {
        ids.push(row.try_get("row_id")?);
        deliveries.push(row_to_delivery(row)?);
    }
    Ok((ids, deliveries))
}

fn attach_delivery_items(
    ids: &[i64],
    deliveries: &mut [DeliveryOrder],
    mut items: HashMap<i64, Vec<DeliveryOrderItem>>,
) {
    for (id, delivery) in ids.iter().zip(deliveries.iter_mut()) {
        delivery.items = items.remove(id).unwrap_or_default();
    }
}

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a pool to `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTx { tx }))
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let Some((row_id, mut order)) = fetch_order(&self.pool, id, false).await? else {
            return Ok(None);
        };
        order.items = fetch_items(&self.pool, row_id).await?;
        order.status_history = fetch_history(&self.pool, row_id).await?;
        Ok(Some(order))
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<Page<Order>> {
        let status = query.status.map(|s| s.as_str());
        let search = query.search.as_deref().map(like_pattern);

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM orders o {ORDER_FILTER}"
        ))
        .bind(status)
        .bind(search.clone())
        .bind(query.date_from)
        .bind(query.date_to)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            "{ORDER_SELECT} {ORDER_FILTER} ORDER BY o.{column} {dir}, o.id {dir} LIMIT $5 OFFSET $6",
            column = query.sort_by.column(),
            dir = query.sort_order.as_sql(),
        );
        let rows = sqlx::query(&sql)
            .bind(status)
            .bind(search)
            .bind(query.date_from)
            .bind(query.date_to)
            .bind(i64::from(query.pagination.limit))
            .bind(query.pagination.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let orders = rows.iter().map(row_to_order).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(orders, total.max(0) as u64, query.pagination))
    }

    async fn order_statistics(&self, range: &DateRange) -> Result<OrderStatistics> {
        const RANGE: &str = "($1::timestamptz IS NULL OR created_at >= $1) \
                             AND ($2::timestamptz IS NULL OR created_at <= $2)";

        let totals = sqlx::query(&format!(
            r#"
            SELECT COUNT(*) AS total_orders,
                   COUNT(*) FILTER (WHERE status <> 'cancelled') AS revenue_orders,
                   COALESCE(SUM(total_amount) FILTER (WHERE status <> 'cancelled'), 0)::BIGINT AS revenue
            FROM orders
            WHERE {RANGE}
            "#
        ))
        .bind(range.from)
        .bind(range.to)
        .fetch_one(&self.pool)
        .await?;

        let total_orders: i64 = totals.try_get("total_orders")?;
        let revenue_orders: i64 = totals.try_get("revenue_orders")?;
        let revenue: i64 = totals.try_get("revenue")?;

        let status_rows = sqlx::query(&format!(
            "SELECT status, COUNT(*) AS order_count FROM orders WHERE {RANGE} GROUP BY status"
        ))
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        let mut status_counts = BTreeMap::new();
        for row in &status_rows {
            let n: i64 = row.try_get("order_count")?;
            status_counts.insert(row.try_get::<String, _>("status")?, n.max(0) as u64);
        }

        let daily_rows = sqlx::query(&format!(
            r#"
            SELECT (created_at AT TIME ZONE 'UTC')::date AS day,
                   COUNT(*) AS order_count,
                   COALESCE(SUM(total_amount) FILTER (WHERE status <> 'cancelled'), 0)::BIGINT AS revenue
            FROM orders
            WHERE {RANGE}
            GROUP BY day
            ORDER BY day ASC
            "#
        ))
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await?;

        let daily_stats = daily_rows
            .iter()
            .map(|row| {
                let order_count: i64 = row.try_get("order_count")?;
                Ok(DailyStats {
                    date: row.try_get::<NaiveDate, _>("day")?,
                    order_count: order_count.max(0) as u64,
                    revenue: Money::new(row.try_get("revenue")?),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(OrderStatistics {
            total_orders: total_orders.max(0) as u64,
            total_revenue: Money::new(revenue),
            average_order_value: if revenue_orders > 0 {
                Money::new(revenue / revenue_orders)
            } else {
                Money::zero()
            },
            status_counts,
            daily_stats,
            recent_orders: Vec::new(),
        })
    }

    async fn recent_orders(&self, range: &DateRange, limit: u32) -> Result<Vec<Order>> {
        let sql = format!(
            "{ORDER_SELECT} WHERE ($1::timestamptz IS NULL OR o.created_at >= $1) \
             AND ($2::timestamptz IS NULL OR o.created_at <= $2) \
             ORDER BY o.created_at DESC, o.id DESC LIMIT $3"
        );
        let rows = sqlx::query(&sql)
            .bind(range.from)
            .bind(range.to)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_order).collect()
    }

    async fn find_discount_code(&self, code: &str) -> Result<Option<DiscountCode>> {
        let row = sqlx::query(DISCOUNT_SELECT)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_discount).transpose()
    }

    async fn get_delivery(&self, id: DeliveryId) -> Result<Option<DeliveryOrder>> {
        let rows = sqlx::query(&format!("{DELIVERY_SELECT} WHERE d.public_id = $1"))
            .bind(id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        let (ids, mut deliveries) = deliveries_from_rows(&rows)?;
        let items = fetch_delivery_items(&self.pool, ids.clone()).await?;
        attach_delivery_items(&ids, &mut deliveries, items);
        Ok(deliveries.pop())
    }

    async fn list_deliveries(&self, query: &DeliveryQuery) -> Result<Page<DeliveryOrder>> {
        let order_id = query.order_id.map(|id| id.as_uuid());
        let shipper_id = query.shipper_id.map(|id| id.as_uuid());
        let status = query.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(&format!(
            r#"
            SELECT COUNT(*)
            FROM delivery_orders d
            JOIN orders o ON o.id = d.order_id
            JOIN shippers s ON s.id = d.shipper_id
            {DELIVERY_FILTER}
            "#
        ))
        .bind(order_id)
        .bind(shipper_id)
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            "{DELIVERY_SELECT} {DELIVERY_FILTER} ORDER BY d.{column} {dir}, d.id {dir} LIMIT $4 OFFSET $5",
            column = query.sort_by.column(),
            dir = query.sort_order.as_sql(),
        );
        let rows = sqlx::query(&sql)
            .bind(order_id)
            .bind(shipper_id)
            .bind(status)
            .bind(i64::from(query.pagination.limit))
            .bind(query.pagination.offset() as i64)
            .fetch_all(&self.pool)
            .await?;

        let (ids, mut deliveries) = deliveries_from_rows(&rows)?;
        let items = fetch_delivery_items(&self.pool, ids.clone()).await?;
        attach_delivery_items(&ids, &mut deliveries, items);
        Ok(Page::new(deliveries, total.max(0) as u64, query.pagination))
    }

    async fn deliveries_for_order(&self, id: OrderId) -> Result<Vec<DeliveryOrder>> {
        let rows = sqlx::query(&format!(
            "{DELIVERY_SELECT} WHERE o.public_id = $1 ORDER BY d.id ASC"
        ))
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        let (ids, mut deliveries) = deliveries_from_rows(&rows)?;
        let items = fetch_delivery_items(&self.pool, ids.clone()).await?;
        attach_delivery_items(&ids, &mut deliveries, items);
        Ok(deliveries)
    }

    async fn active_shippers(&self) -> Result<Vec<Shipper>> {
        let rows = sqlx::query(&format!(
            "{SHIPPER_SELECT} WHERE s.is_active ORDER BY s.name ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_shipper).collect()
    }
}

/// Transaction over [`PostgresStore`].
pub struct PostgresTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PostgresTx {
    async fn resolve_variant(&mut self, id: VariantId) -> Result<Option<VariantSnapshot>> {
        let row = sqlx::query(
            r#"
            SELECT v.public_id, p.name AS product_name, v.name AS variant_name, v.price
            FROM product_variants v
            JOIN products p ON p.id = v.product_id
            WHERE v.public_id = $1 AND v.is_active AND p.is_active
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(|row| -> Result<VariantSnapshot> {
            Ok(VariantSnapshot {
                variant_id: VariantId::from_uuid(row.try_get("public_id")?),
                product_name: row.try_get("product_name")?,
                variant_name: row.try_get("variant_name")?,
                price: Money::new(row.try_get("price")?),
            })
        })
        .transpose()
    }

    async fn resolve_or_create_guest(&mut self, contact: &GuestContact) -> Result<UserIdentity> {
        let existing: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT public_id FROM users
            WHERE phone = $1 OR ($2::text IS NOT NULL AND email = $2)
            ORDER BY id ASC
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(&contact.phone)
        .bind(&contact.email)
        .fetch_optional(&mut *self.tx)
        .await?;

        let row = match existing {
            Some(public_id) => {
                sqlx::query(&format!(
                    r#"
                    UPDATE users
                    SET phone = COALESCE(phone, $2), email = COALESCE(email, $3), updated_at = NOW()
                    WHERE public_id = $1
                    RETURNING {USER_COLUMNS}
                    "#
                ))
                .bind(public_id)
                .bind(&contact.phone)
                .bind(&contact.email)
                .fetch_one(&mut *self.tx)
                .await?
            }
            None => {
                tracing::debug!(phone = %contact.phone, "creating guest user");
                sqlx::query(&format!(
                    r#"
                    INSERT INTO users (public_id, full_name, phone, email, is_guest)
                    VALUES ($1, $2, $3, $4, TRUE)
                    RETURNING {USER_COLUMNS}
                    "#
                ))
                .bind(Uuid::new_v4())
                .bind(&contact.name)
                .bind(&contact.phone)
                .bind(&contact.email)
                .fetch_one(&mut *self.tx)
                .await?
            }
        };

        row_to_user(&row)
    }

    async fn resolve_user(&mut self, id: UserId) -> Result<Option<UserIdentity>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE public_id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(row_to_user).transpose()
    }

    async fn find_shipper(&mut self, id: ShipperId) -> Result<Option<Shipper>> {
        let row = sqlx::query(&format!("{SHIPPER_SELECT} WHERE s.public_id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_shipper).transpose()
    }

    async fn lock_discount_code(&mut self, code: &str) -> Result<Option<DiscountCode>> {
        let row = sqlx::query(&format!("{DISCOUNT_SELECT} FOR UPDATE"))
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_discount).transpose()
    }

    async fn increment_discount_usage(&mut self, code: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE discount_codes SET used_count = used_count + 1 WHERE code = $1")
                .bind(code)
                .execute(&mut *self.tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("discount code", code));
        }
        Ok(())
    }

    async fn next_order_number(&mut self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT nextval('order_number_seq')")
            .fetch_one(&mut *self.tx)
            .await?)
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        let t = &order.totals;
        sqlx::query(
            r#"
            INSERT INTO orders (
                public_id, order_number, customer_name, customer_phone, customer_email, status,
                subtotal, discount_amount, manual_discount_amount, discount_type, discount_code,
                discount_note, shipping_fee, total_amount, payment_method, payment_status, notes,
                shipper_id, delivery_status, estimated_delivery_time, delivery_notes,
                created_by, updated_by, created_at, updated_at, items_count, version
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                (SELECT id FROM shippers WHERE public_id = $18), $19, $20, $21,
                (SELECT id FROM users WHERE public_id = $22),
                (SELECT id FROM users WHERE public_id = $23),
                $24, $25, $26, $27
            )
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(&order.customer_name)
        .bind(&order.customer_phone)
        .bind(&order.customer_email)
        .bind(order.status.as_str())
        .bind(t.subtotal.amount())
        .bind(t.discount_amount.amount())
        .bind(t.manual_discount_amount.amount())
        .bind(t.discount_type.map(|d| d.as_str()))
        .bind(&t.discount_code)
        .bind(&t.discount_note)
        .bind(t.shipping_fee.amount())
        .bind(t.total_amount.amount())
        .bind(&order.payment_method)
        .bind(order.payment_status.as_str())
        .bind(&order.notes)
        .bind(order.shipper_id.map(|id| id.as_uuid()))
        .bind(order.delivery_status.as_str())
        .bind(order.estimated_delivery_time)
        .bind(&order.delivery_notes)
        .bind(order.created_by.as_uuid())
        .bind(order.updated_by.as_uuid())
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(int_column("items_count", order.items_count)?)
        .bind(order.version)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        let Some((row_id, mut order)) = fetch_order(&mut *self.tx, id, true).await? else {
            return Ok(None);
        };
        order.items = fetch_items(&mut *self.tx, row_id).await?;
        order.status_history = fetch_history(&mut *self.tx, row_id).await?;
        Ok(Some(order))
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let t = &order.totals;
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                customer_name = $2, customer_phone = $3, customer_email = $4, status = $5,
                subtotal = $6, discount_amount = $7, manual_discount_amount = $8,
                discount_type = $9, discount_code = $10, discount_note = $11,
                shipping_fee = $12, total_amount = $13, payment_method = $14,
                payment_status = $15, notes = $16,
                shipper_id = (SELECT id FROM shippers WHERE public_id = $17),
                delivery_status = $18, estimated_delivery_time = $19, delivery_notes = $20,
                updated_by = (SELECT id FROM users WHERE public_id = $21),
                updated_at = $22, items_count = $23, version = $24
            WHERE public_id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(&order.customer_name)
        .bind(&order.customer_phone)
        .bind(&order.customer_email)
        .bind(order.status.as_str())
        .bind(t.subtotal.amount())
        .bind(t.discount_amount.amount())
        .bind(t.manual_discount_amount.amount())
        .bind(t.discount_type.map(|d| d.as_str()))
        .bind(&t.discount_code)
        .bind(&t.discount_note)
        .bind(t.shipping_fee.amount())
        .bind(t.total_amount.amount())
        .bind(&order.payment_method)
        .bind(order.payment_status.as_str())
        .bind(&order.notes)
        .bind(order.shipper_id.map(|id| id.as_uuid()))
        .bind(order.delivery_status.as_str())
        .bind(order.estimated_delivery_time)
        .bind(&order.delivery_notes)
        .bind(order.updated_by.as_uuid())
        .bind(order.updated_at)
        .bind(int_column("items_count", order.items_count)?)
        .bind(order.version)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("order", order.id));
        }
        Ok(())
    }

    async fn insert_item(&mut self, order: OrderId, item: &OrderItem) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO order_items (
                public_id, order_id, variant_id, product_name, variant_name, unit_price,
                quantity, total_price, notes, created_at, updated_at
            )
            SELECT $1, o.id, v.id, $4, $5, $6, $7, $8, $9, $10, $11
            FROM orders o, product_variants v
            WHERE o.public_id = $2 AND v.public_id = $3
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(order.as_uuid())
        .bind(item.variant_id.as_uuid())
        .bind(&item.product_name)
        .bind(&item.variant_name)
        .bind(item.unit_price.amount())
        .bind(int_column("quantity", item.quantity)?)
        .bind(item.total_price.amount())
        .bind(&item.notes)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("order", order));
        }
        Ok(())
    }

    async fn update_item(&mut self, order: OrderId, item: &OrderItem) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE order_items oi
            SET quantity = $3, notes = $4, total_price = $5, updated_at = $6
            FROM orders o
            WHERE oi.order_id = o.id AND o.public_id = $1 AND oi.public_id = $2
            "#,
        )
        .bind(order.as_uuid())
        .bind(item.id.as_uuid())
        .bind(int_column("quantity", item.quantity)?)
        .bind(&item.notes)
        .bind(item.total_price.amount())
        .bind(item.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("order item", item.id));
        }
        Ok(())
    }

    async fn delete_item(&mut self, order: OrderId, item: OrderItemId) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM order_items oi
            USING orders o
            WHERE oi.order_id = o.id AND o.public_id = $1 AND oi.public_id = $2
            "#,
        )
        .bind(order.as_uuid())
        .bind(item.as_uuid())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn count_items(&mut self, order: OrderId) -> Result<u32> {
        let n: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM order_items oi
            JOIN orders o ON o.id = oi.order_id
            WHERE o.public_id = $1
            "#,
        )
        .bind(order.as_uuid())
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(n.max(0) as u32)
    }

    async fn append_status_history(
        &mut self,
        order: OrderId,
        entry: &OrderStatusHistory,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO order_status_history (order_id, status, previous_status, notes, changed_by, created_at)
            SELECT o.id, $2, $3, $4, u.id, $6
            FROM orders o, users u
            WHERE o.public_id = $1 AND u.public_id = $5
            "#,
        )
        .bind(order.as_uuid())
        .bind(entry.status.as_str())
        .bind(entry.previous_status.map(|s| s.as_str()))
        .bind(&entry.notes)
        .bind(entry.changed_by.as_uuid())
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("order", order));
        }
        Ok(())
    }

    async fn next_delivery_number(&mut self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT nextval('delivery_number_seq')")
            .fetch_one(&mut *self.tx)
            .await?)
    }

    async fn order_deliveries(&mut self, order: OrderId) -> Result<Vec<DeliveryOrder>> {
        let rows = sqlx::query(&format!(
            "{DELIVERY_SELECT} WHERE o.public_id = $1 ORDER BY d.id ASC FOR UPDATE OF d"
        ))
        .bind(order.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;
        let (ids, mut deliveries) = deliveries_from_rows(&rows)?;
        let items = fetch_delivery_items(&mut *self.tx, ids.clone()).await?;
        attach_delivery_items(&ids, &mut deliveries, items);
        Ok(deliveries)
    }

    async fn insert_delivery(&mut self, delivery: &DeliveryOrder) -> Result<()> {
        let row_id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO delivery_orders (
                public_id, order_id, shipper_id, delivery_number, status,
                estimated_delivery_time, actual_delivery_time, notes,
                created_by, updated_by, created_at, updated_at
            )
            SELECT $1, o.id, s.id, $4, $5, $6, $7, $8, cu.id, uu.id, $11, $12
            FROM orders o, shippers s, users cu, users uu
            WHERE o.public_id = $2 AND s.public_id = $3
              AND cu.public_id = $9 AND uu.public_id = $10
            RETURNING id
            "#,
        )
        .bind(delivery.id.as_uuid())
        .bind(delivery.order_id.as_uuid())
        .bind(delivery.shipper_id.as_uuid())
        .bind(&delivery.delivery_number)
        .bind(delivery.status.as_str())
        .bind(delivery.estimated_delivery_time)
        .bind(delivery.actual_delivery_time)
        .bind(&delivery.notes)
        .bind(delivery.created_by.as_uuid())
        .bind(delivery.updated_by.as_uuid())
        .bind(delivery.created_at)
        .bind(delivery.updated_at)
        .fetch_optional(&mut *self.tx)
        .await?;

        let row_id = row_id.ok_or_else(|| StoreError::not_found("order", delivery.order_id))?;

        for item in &delivery.items {
            let result = sqlx::query(
                r#"
                INSERT INTO delivery_order_items (delivery_order_id, order_item_id, quantity)
                SELECT $1, oi.id, $3 FROM order_items oi WHERE oi.public_id = $2
                "#,
            )
            .bind(row_id)
            .bind(item.order_item_id.as_uuid())
            .bind(int_column("quantity", item.quantity)?)
            .execute(&mut *self.tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::not_found("order item", item.order_item_id));
            }
        }
        Ok(())
    }

    async fn lock_delivery(&mut self, id: DeliveryId) -> Result<Option<DeliveryOrder>> {
        let rows = sqlx::query(&format!(
            "{DELIVERY_SELECT} WHERE d.public_id = $1 FOR UPDATE OF d"
        ))
        .bind(id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;
        let (ids, mut deliveries) = deliveries_from_rows(&rows)?;
        let items = fetch_delivery_items(&mut *self.tx, ids.clone()).await?;
        attach_delivery_items(&ids, &mut deliveries, items);
        Ok(deliveries.pop())
    }

    async fn update_delivery(&mut self, delivery: &DeliveryOrder) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE delivery_orders SET
                shipper_id = (SELECT id FROM shippers WHERE public_id = $2),
                status = $3, estimated_delivery_time = $4, actual_delivery_time = $5,
                notes = $6,
                updated_by = (SELECT id FROM users WHERE public_id = $7),
                updated_at = $8
            WHERE public_id = $1
            "#,
        )
        .bind(delivery.id.as_uuid())
        .bind(delivery.shipper_id.as_uuid())
        .bind(delivery.status.as_str())
        .bind(delivery.estimated_delivery_time)
        .bind(delivery.actual_delivery_time)
        .bind(&delivery.notes)
        .bind(delivery.updated_by.as_uuid())
        .bind(delivery.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("delivery", delivery.id));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
