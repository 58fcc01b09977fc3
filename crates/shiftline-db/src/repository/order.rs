//! # Order Repository
//!
//! Orders and their line items.
//!
//! ## Conditional Transitions
//! Every state change that can race is a single UPDATE conditioned on the
//! state the caller observed. The return value says whether *this* caller
//! won; a loser sees `false` and re-derives its result instead of applying
//! the change twice.
//!
//! ```text
//! mark_dispatched   WHERE id = ? AND status = <observed assignable status>
//! mark_returned     WHERE id = ? AND status = 'DELIVERING'
//! mark_collected    WHERE id = ? AND status = <observed> AND payment_status = <observed>
//! update            WHERE id = ? AND version = <observed>   (0 rows → VersionConflict)
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

use super::push_id_list;
use crate::error::{DbError, DbResult};
use shiftline_core::{
    Order, OrderItem, OrderSource, OrderStatus, OrderType, PaymentMethod, PaymentStatus,
};

const ORDER_COLUMNS: &str = r#"
    id, tenant_id, branch_id, shift_id, order_number, order_type, status,
    payment_status, payment_method, source, total_price_cents, delivery_fee_cents,
    grand_total_cents, cashier_id, courier_id, customer_id, zone_id, collected_by,
    created_at, updated_at, assigned_at, collected_at, version
"#;

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct OrderRow {
    id: String,
    tenant_id: String,
    branch_id: String,
    shift_id: String,
    order_number: i64,
    order_type: OrderType,
    status: OrderStatus,
    payment_status: PaymentStatus,
    payment_method: PaymentMethod,
    source: OrderSource,
    total_price_cents: i64,
    delivery_fee_cents: i64,
    grand_total_cents: i64,
    cashier_id: String,
    courier_id: Option<String>,
    customer_id: Option<String>,
    zone_id: Option<String>,
    collected_by: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    assigned_at: Option<DateTime<Utc>>,
    collected_at: Option<DateTime<Utc>>,
    version: i64,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Order {
        Order {
            id: self.id,
            tenant_id: self.tenant_id,
            branch_id: self.branch_id,
            shift_id: self.shift_id,
            order_number: self.order_number,
            order_type: self.order_type,
            status: self.status,
            payment_status: self.payment_status,
            payment_method: self.payment_method,
            source: self.source,
            items,
            total_price_cents: self.total_price_cents,
            delivery_fee_cents: self.delivery_fee_cents,
            grand_total_cents: self.grand_total_cents,
            cashier_id: self.cashier_id,
            courier_id: self.courier_id,
            customer_id: self.customer_id,
            zone_id: self.zone_id,
            collected_by: self.collected_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
            assigned_at: self.assigned_at,
            collected_at: self.collected_at,
            version: self.version,
        }
    }
}

#[derive(Debug, FromRow)]
struct ItemRow {
    order_id: String,
    product_id: String,
    name: String,
    quantity: i64,
    unit_price_cents: i64,
    line_total_cents: i64,
}

/// Shift-scoped filter for listing orders.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub order_type: Option<OrderType>,
    pub statuses: Vec<OrderStatus>,
    pub courier_id: Option<String>,
    pub unassigned_only: bool,
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Pool reads
    // -------------------------------------------------------------------------

    pub async fn get(&self, tenant_id: &str, order_id: &str) -> DbResult<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, tenant_id, order_id).await
    }

    /// Orders of one shift, newest first.
    pub async fn list_for_shift(
        &self,
        shift_id: &str,
        filter: &OrderFilter,
    ) -> DbResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        Self::list_for_shift_in(&mut conn, shift_id, filter).await
    }

    /// DELIVERY orders with no courier in an assignable status, across the
    /// branch's (or with `branch_id = None`, the tenant's) open shifts.
    pub async fn unassigned_deliveries(
        &self,
        tenant_id: &str,
        branch_id: Option<&str>,
    ) -> DbResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(ORDER_COLUMNS);
        qb.push(
            " FROM orders WHERE order_type = 'DELIVERY' AND courier_id IS NULL
              AND status IN ('NEW', 'PREPARING', 'READY')
              AND shift_id IN (SELECT id FROM shifts WHERE status = 'OPEN')
              AND tenant_id = ",
        );
        qb.push_bind(tenant_id.to_string());
        if let Some(branch_id) = branch_id {
            qb.push(" AND branch_id = ");
            qb.push_bind(branch_id.to_string());
        }
        qb.push(" ORDER BY created_at DESC");

        let rows: Vec<OrderRow> = qb.build_query_as().fetch_all(&mut *conn).await?;
        Self::with_items(&mut conn, rows).await
    }

    // -------------------------------------------------------------------------
    // Connection-level operations
    // -------------------------------------------------------------------------

    pub async fn get_in(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        order_id: &str,
    ) -> DbResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE tenant_id = ?1 AND id = ?2");
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(order_id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => Ok(Self::with_items(conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Orders by id within a tenant; unknown ids are silently absent.
    pub async fn get_many(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        order_ids: &[String],
    ) -> DbResult<Vec<Order>> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(ORDER_COLUMNS);
        qb.push(" FROM orders WHERE tenant_id = ");
        qb.push_bind(tenant_id.to_string());
        qb.push(" AND id IN ");
        push_id_list(&mut qb, order_ids);
        qb.push(" ORDER BY order_number");

        let rows: Vec<OrderRow> = qb.build_query_as().fetch_all(&mut *conn).await?;
        Self::with_items(conn, rows).await
    }

    pub async fn list_for_shift_in(
        conn: &mut SqliteConnection,
        shift_id: &str,
        filter: &OrderFilter,
    ) -> DbResult<Vec<Order>> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(ORDER_COLUMNS);
        qb.push(" FROM orders WHERE shift_id = ");
        qb.push_bind(shift_id.to_string());

        if let Some(order_type) = filter.order_type {
            qb.push(" AND order_type = ");
            qb.push_bind(order_type);
        }
        if let Some(courier_id) = &filter.courier_id {
            qb.push(" AND courier_id = ");
            qb.push_bind(courier_id.clone());
        }
        if filter.unassigned_only {
            qb.push(" AND courier_id IS NULL");
        }
        if !filter.statuses.is_empty() {
            qb.push(" AND status IN (");
            let mut separated = qb.separated(", ");
            for status in &filter.statuses {
                separated.push_bind(*status);
            }
            separated.push_unseparated(")");
        }
        qb.push(" ORDER BY order_number DESC");

        let rows: Vec<OrderRow> = qb.build_query_as().fetch_all(&mut *conn).await?;
        Self::with_items(conn, rows).await
    }

    /// First DELIVERY order of the shift still UNPAID, by order number.
    pub async fn first_unpaid_delivery(
        conn: &mut SqliteConnection,
        shift_id: &str,
    ) -> DbResult<Option<(String, i64)>> {
        let row: Option<(String, i64)> = sqlx::query_as(
            r#"
            SELECT id, order_number FROM orders
            WHERE shift_id = ?1 AND order_type = 'DELIVERY' AND payment_status = 'UNPAID'
            ORDER BY order_number
            LIMIT 1
            "#,
        )
        .bind(shift_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row)
    }

    /// Inserts an order with its items.
    pub async fn insert(conn: &mut SqliteConnection, order: &Order) -> DbResult<()> {
        debug!(id = %order.id, order_number = order.order_number, "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, tenant_id, branch_id, shift_id, order_number, order_type, status,
                payment_status, payment_method, source, total_price_cents, delivery_fee_cents,
                grand_total_cents, cashier_id, courier_id, customer_id, zone_id, collected_by,
                created_at, updated_at, assigned_at, collected_at, version
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7,
                ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17, ?18,
                ?19, ?20, ?21, ?22, ?23
            )
            "#,
        )
        .bind(&order.id)
        .bind(&order.tenant_id)
        .bind(&order.branch_id)
        .bind(&order.shift_id)
        .bind(order.order_number)
        .bind(order.order_type)
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.payment_method)
        .bind(order.source)
        .bind(order.total_price_cents)
        .bind(order.delivery_fee_cents)
        .bind(order.grand_total_cents)
        .bind(&order.cashier_id)
        .bind(&order.courier_id)
        .bind(&order.customer_id)
        .bind(&order.zone_id)
        .bind(&order.collected_by)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.assigned_at)
        .bind(order.collected_at)
        .bind(order.version)
        .execute(&mut *conn)
        .await?;

        Self::insert_items(conn, &order.id, &order.items).await
    }

    /// Writes every mutable field of `order`, conditioned on `expected_version`.
    /// Items are replaced wholesale.
    pub async fn update(
        conn: &mut SqliteConnection,
        order: &Order,
        expected_version: i64,
    ) -> DbResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE orders SET
                status = ?1,
                payment_status = ?2,
                total_price_cents = ?3,
                delivery_fee_cents = ?4,
                grand_total_cents = ?5,
                courier_id = ?6,
                customer_id = ?7,
                zone_id = ?8,
                collected_by = ?9,
                updated_at = ?10,
                assigned_at = ?11,
                collected_at = ?12,
                version = version + 1
            WHERE id = ?13 AND version = ?14
            "#,
        )
        .bind(order.status)
        .bind(order.payment_status)
        .bind(order.total_price_cents)
        .bind(order.delivery_fee_cents)
        .bind(order.grand_total_cents)
        .bind(&order.courier_id)
        .bind(&order.customer_id)
        .bind(&order.zone_id)
        .bind(&order.collected_by)
        .bind(order.updated_at)
        .bind(order.assigned_at)
        .bind(order.collected_at)
        .bind(&order.id)
        .bind(expected_version)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(DbError::version_conflict("Order", &order.id));
        }

        sqlx::query("DELETE FROM order_items WHERE order_id = ?1")
            .bind(&order.id)
            .execute(&mut *conn)
            .await?;
        Self::insert_items(conn, &order.id, &order.items).await
    }

    /// Puts an order on the road. `false` if it was no longer in `expected`.
    pub async fn mark_dispatched(
        conn: &mut SqliteConnection,
        order_id: &str,
        courier_id: &str,
        expected: OrderStatus,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE orders SET
                status = 'DELIVERING', courier_id = ?1, assigned_at = ?2,
                updated_at = ?2, version = version + 1
            WHERE id = ?3 AND status = ?4 AND order_type = 'DELIVERY'
            "#,
        )
        .bind(courier_id)
        .bind(at)
        .bind(order_id)
        .bind(expected)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    /// Takes an order off the road back to NEW.
    pub async fn mark_returned(
        conn: &mut SqliteConnection,
        order_id: &str,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE orders SET
                status = 'NEW', courier_id = NULL, assigned_at = NULL,
                updated_at = ?1, version = version + 1
            WHERE id = ?2 AND status = 'DELIVERING'
            "#,
        )
        .bind(at)
        .bind(order_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    /// Marks a delivery PAID/PAID. `false` if another caller got there first.
    pub async fn mark_collected(
        conn: &mut SqliteConnection,
        order: &Order,
        collected_by: &str,
        at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE orders SET
                status = 'PAID', payment_status = 'PAID',
                collected_by = ?1, collected_at = ?2,
                updated_at = ?2, version = version + 1
            WHERE id = ?3 AND status = ?4 AND payment_status = ?5
            "#,
        )
        .bind(collected_by)
        .bind(at)
        .bind(&order.id)
        .bind(order.status)
        .bind(order.payment_status)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        Ok(updated > 0)
    }

    async fn insert_items(
        conn: &mut SqliteConnection,
        order_id: &str,
        items: &[OrderItem],
    ) -> DbResult<()> {
        for (position, item) in items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    order_id, position, product_id, name, quantity,
                    unit_price_cents, line_total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(order_id)
            .bind(position as i64)
            .bind(&item.product_id)
            .bind(&item.name)
            .bind(item.quantity)
            .bind(item.unit_price_cents)
            .bind(item.line_total_cents)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn with_items(conn: &mut SqliteConnection, rows: Vec<OrderRow>) -> DbResult<Vec<Order>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT order_id, product_id, name, quantity, unit_price_cents, line_total_cents
             FROM order_items WHERE order_id IN ",
        );
        push_id_list(&mut qb, &ids);
        qb.push(" ORDER BY order_id, position");

        let item_rows: Vec<ItemRow> = qb.build_query_as().fetch_all(&mut *conn).await?;

        let mut by_order: HashMap<String, Vec<OrderItem>> = HashMap::new();
        for row in item_rows {
            by_order.entry(row.order_id).or_default().push(OrderItem {
                product_id: row.product_id,
                name: row.name,
                quantity: row.quantity,
                unit_price_cents: row.unit_price_cents,
                line_total_cents: row.line_total_cents,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let items = by_order.remove(&row.id).unwrap_or_default();
                row.into_order(items)
            })
            .collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
