//! # Catalog Repository
//!
//! Read access to products, zones and customers for pricing and
//! validation, plus inserts used by seeding and tests.

use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use super::push_id_list;
use crate::error::DbResult;
use shiftline_core::{Customer, Product, Zone};

#[derive(Debug, FromRow)]
struct ProductRow {
    id: String,
    tenant_id: String,
    branch_id: String,
    name: String,
    category: Option<String>,
    price_cents: i64,
    is_active: bool,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            tenant_id: row.tenant_id,
            branch_id: row.branch_id,
            name: row.name,
            category: row.category,
            price_cents: row.price_cents,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, FromRow)]
struct ZoneRow {
    id: String,
    tenant_id: String,
    branch_id: String,
    name: String,
    delivery_fee_cents: i64,
}

impl From<ZoneRow> for Zone {
    fn from(row: ZoneRow) -> Self {
        Zone {
            id: row.id,
            tenant_id: row.tenant_id,
            branch_id: row.branch_id,
            name: row.name,
            delivery_fee_cents: row.delivery_fee_cents,
        }
    }
}

#[derive(Debug, FromRow)]
struct CustomerRow {
    id: String,
    tenant_id: String,
    branch_id: Option<String>,
    name: String,
    address: Option<String>,
    phone1: String,
    phone2: Option<String>,
    zone_id: Option<String>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id,
            tenant_id: row.tenant_id,
            branch_id: row.branch_id,
            name: row.name,
            address: row.address,
            phone1: row.phone1,
            phone2: row.phone2,
            zone_id: row.zone_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CatalogRepository {
    pool: SqlitePool,
}

impl CatalogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CatalogRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    /// Active products of a branch among `ids`. Missing or inactive ids are
    /// simply absent from the result.
    pub async fn products_by_ids(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        branch_id: &str,
        ids: &[String],
    ) -> DbResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, tenant_id, branch_id, name, category, price_cents, is_active
             FROM products WHERE is_active = 1 AND tenant_id = ",
        );
        qb.push_bind(tenant_id.to_string());
        qb.push(" AND branch_id = ");
        qb.push_bind(branch_id.to_string());
        qb.push(" AND id IN ");
        push_id_list(&mut qb, ids);

        let rows: Vec<ProductRow> = qb.build_query_as().fetch_all(&mut *conn).await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    pub async fn product_count(&self, tenant_id: &str, branch_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE tenant_id = ?1 AND branch_id = ?2",
        )
        .bind(tenant_id)
        .bind(branch_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn insert_product(&self, product: &Product) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (id, tenant_id, branch_id, name, category, price_cents, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&product.id)
        .bind(&product.tenant_id)
        .bind(&product.branch_id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.price_cents)
        .bind(product.is_active)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Zones
    // -------------------------------------------------------------------------

    pub async fn zone(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        zone_id: &str,
    ) -> DbResult<Option<Zone>> {
        let row: Option<ZoneRow> = sqlx::query_as(
            "SELECT id, tenant_id, branch_id, name, delivery_fee_cents
             FROM zones WHERE tenant_id = ?1 AND id = ?2",
        )
        .bind(tenant_id)
        .bind(zone_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(Zone::from))
    }

    pub async fn insert_zone(&self, zone: &Zone) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO zones (id, tenant_id, branch_id, name, delivery_fee_cents)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&zone.id)
        .bind(&zone.tenant_id)
        .bind(&zone.branch_id)
        .bind(&zone.name)
        .bind(zone.delivery_fee_cents)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Customers
    // -------------------------------------------------------------------------

    pub async fn customer(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        customer_id: &str,
    ) -> DbResult<Option<Customer>> {
        let row: Option<CustomerRow> = sqlx::query_as(
            "SELECT id, tenant_id, branch_id, name, address, phone1, phone2, zone_id
             FROM customers WHERE tenant_id = ?1 AND id = ?2",
        )
        .bind(tenant_id)
        .bind(customer_id)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(row.map(Customer::from))
    }

    /// Customers of the tenant among `ids`; unknown ids are absent.
    pub async fn customers_by_ids(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        ids: &[String],
    ) -> DbResult<Vec<Customer>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, tenant_id, branch_id, name, address, phone1, phone2, zone_id
             FROM customers WHERE tenant_id = ",
        );
        qb.push_bind(tenant_id.to_string());
        qb.push(" AND id IN ");
        push_id_list(&mut qb, ids);

        let rows: Vec<CustomerRow> = qb.build_query_as().fetch_all(&mut *conn).await?;
        Ok(rows.into_iter().map(Customer::from).collect())
    }

    pub async fn insert_customer(&self, customer: &Customer) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO customers (id, tenant_id, branch_id, name, address, phone1, phone2, zone_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.tenant_id)
        .bind(&customer.branch_id)
        .bind(&customer.name)
        .bind(&customer.address)
        .bind(&customer.phone1)
        .bind(&customer.phone2)
        .bind(&customer.zone_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
