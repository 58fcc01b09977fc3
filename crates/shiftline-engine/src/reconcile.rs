//! # Shift Reconciliation
//!
//! Closing a shift and reading shifts back.
//!
//! ## Close Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   1. find the branch's OPEN shift          none ──► NOT_FOUND           │
//! │   2. first UNPAID delivery?                yes  ──► CONFLICT (#n, id)   │
//! │   3. totals = Σ PAID orders                drift vs running totals: warn│
//! │   4. shift → CLOSED (version CAS)                                       │
//! │   5. every branch courier → OUT                                         │
//! │   6. order-number counter → 0                                           │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The recomputed totals are what the closed shift keeps. The running
//! totals maintained by creation and settlement only serve as a check.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shiftline_core::ledger::totals_from_paid;
use shiftline_core::validation::validate_id;
use shiftline_core::{CoreError, LedgerStatus, Permission, Principal, Shift, ShiftRef};
use shiftline_db::{
    CounterRepository, CounterScope, CourierRepository, OrderFilter, OrderRepository,
    ShiftRepository,
};
use sqlx::SqliteConnection;
use tracing::{info, warn};
use ts_rs::TS;

use crate::error::EngineResult;
use crate::{in_scope, read_branch, Engine};

const MAX_SHIFT_LIST: i64 = 500;

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OpenShift {
    pub id: String,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
}

/// The open shift, if any, and the closed history.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ShiftSummary {
    pub open: Option<OpenShift>,
    pub closed: Vec<Shift>,
}

// =============================================================================
// Operations
// =============================================================================

impl Engine {
    /// Closes the branch's open shift.
    ///
    /// ## Errors
    /// - `NotFound` if the branch has no open shift
    /// - `Conflict` naming the first unsettled delivery; the shift stays open
    pub async fn close_shift(
        &self,
        principal: &Principal,
        branch_id: Option<&str>,
    ) -> EngineResult<Shift> {
        principal.authorize(Permission::CloseShift)?;
        let branch_id = principal.target_branch(branch_id)?;

        let branch_id = branch_id.as_str();
        let shift = self
            .retry
            .run("close_shift", move || self.close_shift_tx(principal, branch_id))
            .await?;

        info!(
            shift_id = %shift.id,
            branch_id,
            closed_by = %principal.user_id,
            overall_total = shift.totals.overall_total_cents,
            takeaway_count = shift.totals.takeaway_count,
            delivery_count = shift.totals.delivery_count,
            "Shift closed"
        );
        Ok(shift)
    }

    async fn close_shift_tx(&self, principal: &Principal, branch_id: &str) -> EngineResult<Shift> {
        let tenant_id = principal.tenant_id.as_str();
        let mut tx = self.db.begin().await?;

        let shift = ShiftRepository::find_open(&mut tx, tenant_id, branch_id)
            .await?
            .ok_or_else(|| CoreError::ShiftNotFound(format!("open shift for branch {branch_id}")))?;

        if let Some((order_id, order_number)) =
            OrderRepository::first_unpaid_delivery(&mut tx, &shift.id).await?
        {
            warn!(
                shift_id = %shift.id,
                %order_id,
                order_number,
                "Close blocked by unsettled delivery"
            );
            return Err(CoreError::UnsettledDelivery {
                order_id,
                order_number,
            }
            .into());
        }

        let orders =
            OrderRepository::list_for_shift_in(&mut tx, &shift.id, &OrderFilter::default()).await?;
        let totals = totals_from_paid(&orders);
        if totals != shift.totals {
            warn!(
                shift_id = %shift.id,
                running = ?shift.totals,
                recomputed = ?totals,
                "Shift totals drifted; closing with recomputed totals"
            );
        }

        ShiftRepository::close(&mut tx, &shift, &totals, &principal.user_id, Utc::now()).await?;
        let couriers_out = CourierRepository::set_all_out(&mut tx, tenant_id, branch_id).await?;
        let scope = CounterScope::order_number(tenant_id, branch_id, &shift.id);
        CounterRepository::reset(&mut tx, &scope).await?;

        let closed = ShiftRepository::get_in(&mut tx, tenant_id, &shift.id)
            .await?
            .ok_or_else(|| CoreError::ShiftNotFound(shift.id.clone()))?;

        tx.commit().await?;
        info!(shift_id = %closed.id, couriers_out, "Couriers sent out");
        Ok(closed)
    }

    /// The branch's open shift, if there is one.
    pub async fn current_shift(
        &self,
        principal: &Principal,
        branch_id: Option<&str>,
    ) -> EngineResult<Option<Shift>> {
        principal.authorize(Permission::ViewShift)?;
        let branch_id = principal.target_branch(branch_id)?;
        Ok(self.db.shifts().current(&principal.tenant_id, &branch_id).await?)
    }

    /// Shifts newest first, at most `limit` (clamped to 1..=500).
    pub async fn list_shifts(
        &self,
        principal: &Principal,
        branch_id: Option<&str>,
        limit: i64,
    ) -> EngineResult<Vec<Shift>> {
        principal.authorize(Permission::ViewShift)?;
        Ok(self
            .db
            .shifts()
            .list(
                &principal.tenant_id,
                read_branch(principal, branch_id),
                limit.clamp(1, MAX_SHIFT_LIST),
            )
            .await?)
    }

    pub async fn shift(&self, principal: &Principal, shift_id: &str) -> EngineResult<Shift> {
        principal.authorize(Permission::ViewShift)?;
        validate_id("shiftId", shift_id)?;
        let mut conn = self.db.pool().acquire().await?;
        resolve_shift(&mut conn, principal, &ShiftRef::Id(shift_id.to_string())).await
    }

    pub async fn shift_summary(
        &self,
        principal: &Principal,
        branch_id: Option<&str>,
    ) -> EngineResult<ShiftSummary> {
        principal.authorize(Permission::ViewShift)?;
        let branch_id = principal.target_branch(branch_id)?;
        let shifts = self
            .db
            .shifts()
            .list(&principal.tenant_id, Some(&branch_id), MAX_SHIFT_LIST)
            .await?;

        let mut summary = ShiftSummary {
            open: None,
            closed: Vec::new(),
        };
        for shift in shifts {
            match shift.status {
                LedgerStatus::Open => {
                    summary.open = Some(OpenShift {
                        id: shift.id,
                        opened_at: shift.opened_at,
                    })
                }
                LedgerStatus::Closed => summary.closed.push(shift),
            }
        }
        Ok(summary)
    }
}

/// Resolves `current` to the principal's open shift, or an id to a shift
/// the principal can see.
pub(crate) async fn resolve_shift(
    conn: &mut SqliteConnection,
    principal: &Principal,
    shift: &ShiftRef,
) -> EngineResult<Shift> {
    match shift {
        ShiftRef::Current => {
            let branch_id = principal.target_branch(None)?;
            ShiftRepository::find_open(conn, &principal.tenant_id, &branch_id)
                .await?
                .ok_or_else(|| {
                    CoreError::ShiftNotFound(format!("open shift for branch {branch_id}")).into()
                })
        }
        ShiftRef::Id(shift_id) => ShiftRepository::get_in(conn, &principal.tenant_id, shift_id)
            .await?
            .filter(|s| in_scope(principal, &s.branch_id))
            .ok_or_else(|| CoreError::ShiftNotFound(shift_id.clone()).into()),
    }
}

// =============================================================================
// Tests
// =============================================================================
