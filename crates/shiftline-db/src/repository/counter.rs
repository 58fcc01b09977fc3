//! # Sequence Counter Repository
//!
//! Gap-free order numbers per (tenant, branch, shift).
//!
//! ```text
//! INSERT (scope, seq = 1)
//!     ON CONFLICT (scope) DO UPDATE SET seq = seq + 1
//!     RETURNING seq
//! ```
//!
//! The upsert is a single statement, so two callers can never read the
//! same value. Because it runs inside the caller's transaction, a rollback
//! also returns the number: nothing is skipped.

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use shiftline_core::ORDER_NUMBER_COUNTER;

/// Key of one counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterScope {
    pub tenant_id: String,
    pub branch_id: String,
    pub shift_id: String,
    pub name: String,
}

impl CounterScope {
    /// The order-number counter of a shift.
    pub fn order_number(
        tenant_id: impl Into<String>,
        branch_id: impl Into<String>,
        shift_id: impl Into<String>,
    ) -> Self {
        CounterScope {
            tenant_id: tenant_id.into(),
            branch_id: branch_id.into(),
            shift_id: shift_id.into(),
            name: ORDER_NUMBER_COUNTER.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CounterRepository {
    pool: SqlitePool,
}

impl CounterRepository {
    pub fn new(pool: SqlitePool) -> Self {
        CounterRepository { pool }
    }

    /// Last issued value, 0 if the counter was never used or was reset.
    pub async fn current(&self, scope: &CounterScope) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::current_in(&mut conn, scope).await
    }

    pub async fn current_in(conn: &mut SqliteConnection, scope: &CounterScope) -> DbResult<i64> {
        let seq: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT seq FROM sequence_counters
            WHERE tenant_id = ?1 AND branch_id = ?2 AND shift_id = ?3 AND name = ?4
            "#,
        )
        .bind(&scope.tenant_id)
        .bind(&scope.branch_id)
        .bind(&scope.shift_id)
        .bind(&scope.name)
        .fetch_optional(&mut *conn)
        .await?;

        Ok(seq.unwrap_or(0))
    }

    /// Increments and returns the next value, creating the counter at 1.
    pub async fn next_value(conn: &mut SqliteConnection, scope: &CounterScope) -> DbResult<i64> {
        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequence_counters (tenant_id, branch_id, shift_id, name, seq)
            VALUES (?1, ?2, ?3, ?4, 1)
            ON CONFLICT (tenant_id, branch_id, shift_id, name)
            DO UPDATE SET seq = seq + 1
            RETURNING seq
            "#,
        )
        .bind(&scope.tenant_id)
        .bind(&scope.branch_id)
        .bind(&scope.shift_id)
        .bind(&scope.name)
        .fetch_one(&mut *conn)
        .await?;

        debug!(shift_id = %scope.shift_id, name = %scope.name, seq, "Issued sequence value");
        Ok(seq)
    }

    /// Sets the counter back to 0.
    pub async fn reset(conn: &mut SqliteConnection, scope: &CounterScope) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE sequence_counters SET seq = 0
            WHERE tenant_id = ?1 AND branch_id = ?2 AND shift_id = ?3 AND name = ?4
            "#,
        )
        .bind(&scope.tenant_id)
        .bind(&scope.branch_id)
        .bind(&scope.shift_id)
        .bind(&scope.name)
        .execute(&mut *conn)
        .await?;

        debug!(shift_id = %scope.shift_id, name = %scope.name, "Counter reset");
        Ok(())
    }
}
