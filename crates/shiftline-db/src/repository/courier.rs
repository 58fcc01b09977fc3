//! # Courier Repository
//!
//! Courier availability. `busy_since` is set on every dispatch and cleared
//! on any other status change.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use shiftline_core::{Courier, CourierStatus};

const COURIER_COLUMNS: &str =
    "id, tenant_id, branch_id, name, phone, status, busy_since, is_active";

#[derive(Debug, FromRow)]
struct CourierRow {
    id: String,
    tenant_id: String,
    branch_id: String,
    name: String,
    phone: Option<String>,
    status: CourierStatus,
    busy_since: Option<DateTime<Utc>>,
    is_active: bool,
}

impl From<CourierRow> for Courier {
    fn from(row: CourierRow) -> Self {
        Courier {
            id: row.id,
            tenant_id: row.tenant_id,
            branch_id: row.branch_id,
            name: row.name,
            phone: row.phone,
            status: row.status,
            busy_since: row.busy_since,
            is_active: row.is_active,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CourierRepository {
    pool: SqlitePool,
}

impl CourierRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CourierRepository { pool }
    }

    pub async fn get(&self, tenant_id: &str, courier_id: &str) -> DbResult<Option<Courier>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, tenant_id, courier_id).await
    }

    /// Active couriers of a branch, or of the whole tenant.
    pub async fn list(&self, tenant_id: &str, branch_id: Option<&str>) -> DbResult<Vec<Courier>> {
        let sql = format!(
            "SELECT {COURIER_COLUMNS} FROM couriers
             WHERE tenant_id = ?1 AND (?2 IS NULL OR branch_id = ?2) AND is_active = 1
             ORDER BY name"
        );
        let rows: Vec<CourierRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(branch_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Courier::from).collect())
    }

    pub async fn insert(&self, courier: &Courier) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO couriers (id, tenant_id, branch_id, name, phone, status, busy_since, is_active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&courier.id)
        .bind(&courier.tenant_id)
        .bind(&courier.branch_id)
        .bind(&courier.name)
        .bind(&courier.phone)
        .bind(courier.status)
        .bind(courier.busy_since)
        .bind(courier.is_active)
        .execute(&self.pool)
        .await?;

        debug!(id = %courier.id, name = %courier.name, "Courier registered");
        Ok(())
    }

    pub async fn get_in(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        courier_id: &str,
    ) -> DbResult<Option<Courier>> {
        let sql =
            format!("SELECT {COURIER_COLUMNS} FROM couriers WHERE tenant_id = ?1 AND id = ?2");
        let row: Option<CourierRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(courier_id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(Courier::from))
    }

    /// BUSY since `at`.
    pub async fn mark_busy(
        conn: &mut SqliteConnection,
        courier_id: &str,
        at: DateTime<Utc>,
    ) -> DbResult<()> {
        Self::write_status(conn, courier_id, CourierStatus::Busy, Some(at)).await
    }

    /// AVAILABLE or OUT; clears `busy_since`.
    pub async fn set_status(
        conn: &mut SqliteConnection,
        courier_id: &str,
        status: CourierStatus,
    ) -> DbResult<()> {
        let busy_since = match status {
            CourierStatus::Busy => Some(Utc::now()),
            _ => None,
        };
        Self::write_status(conn, courier_id, status, busy_since).await
    }

    /// Every courier of the branch goes OUT. Returns how many changed.
    pub async fn set_all_out(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        branch_id: &str,
    ) -> DbResult<u64> {
        let updated = sqlx::query(
            r#"
            UPDATE couriers SET status = 'OUT', busy_since = NULL
            WHERE tenant_id = ?1 AND branch_id = ?2 AND status != 'OUT'
            "#,
        )
        .bind(tenant_id)
        .bind(branch_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        debug!(tenant_id, branch_id, updated, "Couriers sent out");
        Ok(updated)
    }

    async fn write_status(
        conn: &mut SqliteConnection,
        courier_id: &str,
        status: CourierStatus,
        busy_since: Option<DateTime<Utc>>,
    ) -> DbResult<()> {
        let updated = sqlx::query("UPDATE couriers SET status = ?1, busy_since = ?2 WHERE id = ?3")
            .bind(status)
            .bind(busy_since)
            .bind(courier_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        if updated == 0 {
            return Err(DbError::not_found("Courier", courier_id));
        }

        debug!(courier_id, ?status, "Courier status changed");
        Ok(())
    }
}
