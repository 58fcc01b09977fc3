//! # Shift Repository
//!
//! Shifts, their cashboxes, and every mutation of ledger totals.
//!
//! ## Ledger Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ensure_open()          INSERT OR IGNORE ... status = 'OPEN'            │
//! │                         (idx_shifts_one_open rejects a second one)      │
//! │                                                                         │
//! │  ensure_open_cashbox()  INSERT OR IGNORE ... (shift_id, cashier_id)     │
//! │                                                                         │
//! │  apply_credit()         UPDATE shifts SET bucket += amount,             │
//! │                                       version = version + 1             │
//! │                         WHERE id = ? AND version = ? AND status='OPEN'  │
//! │                           └── 0 rows → DbError::VersionConflict         │
//! │                         UPDATE cashboxes SET bucket += amount           │
//! │                         WHERE shift_id = ? AND cashier_id = ?           │
//! │                                                                         │
//! │  close()                UPDATE shifts SET status = 'CLOSED', totals     │
//! │                         WHERE id = ? AND version = ? AND status='OPEN'  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::push_id_list;
use crate::error::{DbError, DbResult};
use shiftline_core::{Cashbox, LedgerCredit, LedgerStatus, LedgerTotals, Shift};

const SHIFT_COLUMNS: &str = r#"
    id, tenant_id, branch_id, status,
    takeaway_total_cents, takeaway_count, delivery_total_cents, delivery_count,
    overall_total_cents, opened_by, opened_at, closed_by, closed_at, version
"#;

const CASHBOX_COLUMNS: &str = r#"
    id, shift_id, cashier_id, status,
    takeaway_total_cents, takeaway_count, delivery_total_cents, delivery_count,
    overall_total_cents, opened_at, closed_at
"#;

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct ShiftRow {
    id: String,
    tenant_id: String,
    branch_id: String,
    status: LedgerStatus,
    takeaway_total_cents: i64,
    takeaway_count: i64,
    delivery_total_cents: i64,
    delivery_count: i64,
    overall_total_cents: i64,
    opened_by: String,
    opened_at: DateTime<Utc>,
    closed_by: Option<String>,
    closed_at: Option<DateTime<Utc>>,
    version: i64,
}

impl ShiftRow {
    fn into_shift(self, cashboxes: Vec<Cashbox>) -> Shift {
        Shift {
            id: self.id,
            tenant_id: self.tenant_id,
            branch_id: self.branch_id,
            status: self.status,
            totals: LedgerTotals {
                takeaway_total_cents: self.takeaway_total_cents,
                takeaway_count: self.takeaway_count,
                delivery_total_cents: self.delivery_total_cents,
                delivery_count: self.delivery_count,
                overall_total_cents: self.overall_total_cents,
            },
            cashboxes,
            opened_by: self.opened_by,
            opened_at: self.opened_at,
            closed_by: self.closed_by,
            closed_at: self.closed_at,
            version: self.version,
        }
    }
}

#[derive(Debug, FromRow)]
struct CashboxRow {
    id: String,
    shift_id: String,
    cashier_id: String,
    status: LedgerStatus,
    takeaway_total_cents: i64,
    takeaway_count: i64,
    delivery_total_cents: i64,
    delivery_count: i64,
    overall_total_cents: i64,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
}

impl From<CashboxRow> for Cashbox {
    fn from(row: CashboxRow) -> Self {
        Cashbox {
            id: row.id,
            shift_id: row.shift_id,
            cashier_id: row.cashier_id,
            status: row.status,
            totals: LedgerTotals {
                takeaway_total_cents: row.takeaway_total_cents,
                takeaway_count: row.takeaway_count,
                delivery_total_cents: row.delivery_total_cents,
                delivery_count: row.delivery_count,
                overall_total_cents: row.overall_total_cents,
            },
            opened_at: row.opened_at,
            closed_at: row.closed_at,
        }
    }
}

/// Bucket deltas for one credit.
struct Deltas {
    takeaway_total: i64,
    takeaway_count: i64,
    delivery_total: i64,
    delivery_count: i64,
    overall_total: i64,
}

impl From<&LedgerCredit> for Deltas {
    fn from(credit: &LedgerCredit) -> Self {
        let after = credit.applied_to(&LedgerTotals::default());
        Deltas {
            takeaway_total: after.takeaway_total_cents,
            takeaway_count: after.takeaway_count,
            delivery_total: after.delivery_total_cents,
            delivery_count: after.delivery_count,
            overall_total: after.overall_total_cents,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

#[derive(Debug, Clone)]
pub struct ShiftRepository {
    pool: SqlitePool,
}

impl ShiftRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ShiftRepository { pool }
    }

    // -------------------------------------------------------------------------
    // Pool reads
    // -------------------------------------------------------------------------

    /// The branch's OPEN shift, if any.
    pub async fn current(&self, tenant_id: &str, branch_id: &str) -> DbResult<Option<Shift>> {
        let mut conn = self.pool.acquire().await?;
        Self::find_open(&mut conn, tenant_id, branch_id).await
    }

    pub async fn get(&self, tenant_id: &str, shift_id: &str) -> DbResult<Option<Shift>> {
        let mut conn = self.pool.acquire().await?;
        Self::get_in(&mut conn, tenant_id, shift_id).await
    }

    /// Shifts newest first. `branch_id = None` lists the whole tenant.
    pub async fn list(
        &self,
        tenant_id: &str,
        branch_id: Option<&str>,
        limit: i64,
    ) -> DbResult<Vec<Shift>> {
        let mut conn = self.pool.acquire().await?;

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(SHIFT_COLUMNS);
        qb.push(" FROM shifts WHERE tenant_id = ");
        qb.push_bind(tenant_id.to_string());
        if let Some(branch_id) = branch_id {
            qb.push(" AND branch_id = ");
            qb.push_bind(branch_id.to_string());
        }
        qb.push(" ORDER BY opened_at DESC LIMIT ");
        qb.push_bind(limit);

        let rows: Vec<ShiftRow> = qb.build_query_as().fetch_all(&mut *conn).await?;
        Self::with_cashboxes(&mut conn, rows).await
    }

    // -------------------------------------------------------------------------
    // Connection-level operations
    // -------------------------------------------------------------------------

    pub async fn find_open(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        branch_id: &str,
    ) -> DbResult<Option<Shift>> {
        let sql = format!(
            "SELECT {SHIFT_COLUMNS} FROM shifts
             WHERE tenant_id = ?1 AND branch_id = ?2 AND status = 'OPEN'"
        );
        let row: Option<ShiftRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(branch_id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => Ok(Self::with_cashboxes(conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    pub async fn get_in(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        shift_id: &str,
    ) -> DbResult<Option<Shift>> {
        let sql = format!("SELECT {SHIFT_COLUMNS} FROM shifts WHERE tenant_id = ?1 AND id = ?2");
        let row: Option<ShiftRow> = sqlx::query_as(&sql)
            .bind(tenant_id)
            .bind(shift_id)
            .fetch_optional(&mut *conn)
            .await?;

        match row {
            Some(row) => Ok(Self::with_cashboxes(conn, vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    /// Opens a shift for the branch unless one is already open, then
    /// returns the open one.
    ///
    /// Run this as the first statement of a transaction: it is a write, so
    /// SQLite hands out the write lock before any snapshot is taken.
    pub async fn ensure_open(
        conn: &mut SqliteConnection,
        tenant_id: &str,
        branch_id: &str,
        opened_by: &str,
    ) -> DbResult<Shift> {
        let id = Uuid::new_v4().to_string();
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO shifts (id, tenant_id, branch_id, status, opened_by, opened_at)
            VALUES (?1, ?2, ?3, 'OPEN', ?4, ?5)
            "#,
        )
        .bind(&id)
        .bind(tenant_id)
        .bind(branch_id)
        .bind(opened_by)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if inserted > 0 {
            info!(shift_id = %id, tenant_id, branch_id, opened_by, "Opened new shift");
        }

        Self::find_open(conn, tenant_id, branch_id)
            .await?
            .ok_or_else(|| DbError::Internal(format!("no open shift after insert for {branch_id}")))
    }

    /// Opens a cashbox for the cashier in this shift unless one exists.
    pub async fn ensure_open_cashbox(
        conn: &mut SqliteConnection,
        shift_id: &str,
        cashier_id: &str,
    ) -> DbResult<Cashbox> {
        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO cashboxes (id, shift_id, cashier_id, status, opened_at)
            VALUES (?1, ?2, ?3, 'OPEN', ?4)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(shift_id)
        .bind(cashier_id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if inserted > 0 {
            debug!(shift_id, cashier_id, "Opened cashbox");
        }

        let sql = format!(
            "SELECT {CASHBOX_COLUMNS} FROM cashboxes
             WHERE shift_id = ?1 AND cashier_id = ?2 AND status = 'OPEN'"
        );
        let row: CashboxRow = sqlx::query_as(&sql)
            .bind(shift_id)
            .bind(cashier_id)
            .fetch_one(&mut *conn)
            .await?;

        Ok(row.into())
    }

    /// Credits the shift aggregate and the cashier's cashbox by the same
    /// amount. Returns the shift's new version.
    ///
    /// ## Errors
    /// - `VersionConflict` if the shift changed since `shift.version` was read
    ///   or is no longer OPEN
    /// - `NotFound` if the cashier has no open cashbox in this shift
    pub async fn apply_credit(
        conn: &mut SqliteConnection,
        shift: &Shift,
        cashier_id: &str,
        credit: &LedgerCredit,
    ) -> DbResult<i64> {
        let d = Deltas::from(credit);

        let updated = sqlx::query(
            r#"
            UPDATE shifts SET
                takeaway_total_cents = takeaway_total_cents + ?1,
                takeaway_count = takeaway_count + ?2,
                delivery_total_cents = delivery_total_cents + ?3,
                delivery_count = delivery_count + ?4,
                overall_total_cents = overall_total_cents + ?5,
                version = version + 1
            WHERE id = ?6 AND version = ?7 AND status = 'OPEN'
            "#,
        )
        .bind(d.takeaway_total)
        .bind(d.takeaway_count)
        .bind(d.delivery_total)
        .bind(d.delivery_count)
        .bind(d.overall_total)
        .bind(&shift.id)
        .bind(shift.version)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(DbError::version_conflict("Shift", &shift.id));
        }

        let updated = sqlx::query(
            r#"
            UPDATE cashboxes SET
                takeaway_total_cents = takeaway_total_cents + ?1,
                takeaway_count = takeaway_count + ?2,
                delivery_total_cents = delivery_total_cents + ?3,
                delivery_count = delivery_count + ?4,
                overall_total_cents = overall_total_cents + ?5
            WHERE shift_id = ?6 AND cashier_id = ?7 AND status = 'OPEN'
            "#,
        )
        .bind(d.takeaway_total)
        .bind(d.takeaway_count)
        .bind(d.delivery_total)
        .bind(d.delivery_count)
        .bind(d.overall_total)
        .bind(&shift.id)
        .bind(cashier_id)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(DbError::not_found("Cashbox", format!("{}/{}", shift.id, cashier_id)));
        }

        debug!(
            shift_id = %shift.id,
            cashier_id,
            amount = credit.amount().cents(),
            count = credit.count(),
            "Ledger credited"
        );
        Ok(shift.version + 1)
    }

    /// Freezes the shift with the given totals.
    pub async fn close(
        conn: &mut SqliteConnection,
        shift: &Shift,
        totals: &LedgerTotals,
        closed_by: &str,
        closed_at: DateTime<Utc>,
    ) -> DbResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE shifts SET
                status = 'CLOSED',
                takeaway_total_cents = ?1,
                takeaway_count = ?2,
                delivery_total_cents = ?3,
                delivery_count = ?4,
                overall_total_cents = ?5,
                closed_by = ?6,
                closed_at = ?7,
                version = version + 1
            WHERE id = ?8 AND version = ?9 AND status = 'OPEN'
            "#,
        )
        .bind(totals.takeaway_total_cents)
        .bind(totals.takeaway_count)
        .bind(totals.delivery_total_cents)
        .bind(totals.delivery_count)
        .bind(totals.overall_total_cents)
        .bind(closed_by)
        .bind(closed_at)
        .bind(&shift.id)
        .bind(shift.version)
        .execute(&mut *conn)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(DbError::version_conflict("Shift", &shift.id));
        }

        info!(shift_id = %shift.id, closed_by, "Shift closed");
        Ok(())
    }

    async fn with_cashboxes(
        conn: &mut SqliteConnection,
        rows: Vec<ShiftRow>,
    ) -> DbResult<Vec<Shift>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT ");
        qb.push(CASHBOX_COLUMNS);
        qb.push(" FROM cashboxes WHERE shift_id IN ");
        push_id_list(&mut qb, &ids);
        qb.push(" ORDER BY opened_at, id");

        let cashbox_rows: Vec<CashboxRow> = qb.build_query_as().fetch_all(&mut *conn).await?;

        let mut by_shift: HashMap<String, Vec<Cashbox>> = HashMap::new();
        for row in cashbox_rows {
            by_shift
                .entry(row.shift_id.clone())
                .or_default()
                .push(row.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let cashboxes = by_shift.remove(&row.id).unwrap_or_default();
                row.into_shift(cashboxes)
            })
            .collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use shiftline_core::Money;

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn test_ensure_open_is_idempotent() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let first = ShiftRepository::ensure_open(&mut conn, "t1", "b1", "u1").await.unwrap();
        let second = ShiftRepository::ensure_open(&mut conn, "t1", "b1", "u2").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.opened_by, "u1");

        let other_branch = ShiftRepository::ensure_open(&mut conn, "t1", "b2", "u1").await.unwrap();
        assert_ne!(first.id, other_branch.id);
    }

    #[tokio::test]
    async fn test_second_open_shift_rejected_by_index() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();
        ShiftRepository::ensure_open(&mut conn, "t1", "b1", "u1").await.unwrap();

        let err = sqlx::query(
            "INSERT INTO shifts (id, tenant_id, branch_id, status, opened_by, opened_at)
             VALUES ('dup', 't1', 'b1', 'OPEN', 'u1', '2024-01-01T00:00:00Z')",
        )
        .execute(&mut *conn)
        .await
        .map_err(DbError::from)
        .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_credit_keeps_cashboxes_balanced() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let shift = ShiftRepository::ensure_open(&mut conn, "t1", "b1", "u1").await.unwrap();
        ShiftRepository::ensure_open_cashbox(&mut conn, &shift.id, "u1").await.unwrap();
        ShiftRepository::ensure_open_cashbox(&mut conn, &shift.id, "u2").await.unwrap();

        let takeaway = LedgerCredit::Takeaway {
            amount: Money::from_cents(2500),
            count: 1,
        };
        let version = ShiftRepository::apply_credit(&mut conn, &shift, "u1", &takeaway)
            .await
            .unwrap();

        let mut shift = ShiftRepository::get_in(&mut conn, "t1", &shift.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shift.version, version);

        let delivery = LedgerCredit::Delivery {
            amount: Money::from_cents(5500),
            count: 2,
        };
        ShiftRepository::apply_credit(&mut conn, &shift, "u2", &delivery)
            .await
            .unwrap();
        shift = ShiftRepository::get_in(&mut conn, "t1", &shift.id)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(shift.totals.takeaway_total_cents, 2500);
        assert_eq!(shift.totals.delivery_count, 2);
        assert_eq!(shift.totals.overall_total_cents, 8000);
        assert_eq!(shift.cashboxes.len(), 2);
        assert!(shift.is_balanced());
    }

    #[tokio::test]
    async fn test_stale_version_conflicts() {
        let db = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let stale = ShiftRepository::ensure_open(&mut conn, "t1", "b1", "u1").await.unwrap();
        ShiftRepository::ensure_open_cashbox(&mut conn, &stale.id, "u1").await.unwrap();
        let credit = LedgerCredit::Takeaway {
            amount: Money::from_cents(100),
            count: 1,
        };
        ShiftRepository::apply_credit(&mut conn, &stale, "u1", &credit).await.unwrap();

        let err = ShiftRepository::apply_credit(&mut conn, &stale, "u1", &credit)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::VersionConflict { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_close_and_list() {
        let db = setup().await;
        let shift = {
            let mut conn = db.pool().acquire().await.unwrap();
            let shift = ShiftRepository::ensure_open(&mut conn, "t1", "b1", "u1").await.unwrap();
            ShiftRepository::close(&mut conn, &shift, &LedgerTotals::default(), "admin", Utc::now())
                .await
                .unwrap();
            shift
        };

        assert!(db.shifts().current("t1", "b1").await.unwrap().is_none());
        let closed = db.shifts().get("t1", &shift.id).await.unwrap().unwrap();
        assert_eq!(closed.status, LedgerStatus::Closed);
        assert_eq!(closed.closed_by.as_deref(), Some("admin"));

        let listed = db.shifts().list("t1", Some("b1"), 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(db.shifts().list("t1", Some("b9"), 10).await.unwrap().is_empty());
    }
}
