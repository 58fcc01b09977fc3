//! # Courier Dispatch
//!
//! Putting delivery orders on the road, taking them back off, and the
//! courier board the dispatch desk watches.
//!
//! ## Courier States
//! ```text
//!              assign (≥1 order dispatched)
//!   ┌──────┐ ───────────────────────────────► ┌──────┐
//!   │ OUT  │                                  │ BUSY │  busy_since = now
//!   └──────┘ ◄─── settle ──────────────────── └──────┘
//!      ▲  │                                    │  ▲
//!      │  │ return / set available    collect  │  │ assign
//!      │  ▼                                    ▼  │
//!      │ ┌───────────┐ ◄────────────────────────  │
//!      └─│ AVAILABLE │ ───────────────────────────┘
//!  close └───────────┘
//! ```
//!
//! Assignment skips orders it cannot dispatch (wrong type, wrong status,
//! another branch, lost a race) rather than failing the batch. Only a
//! batch where nothing was dispatched is an error.

use chrono::Utc;
use serde::Serialize;
use shiftline_core::status::validate_change;
use shiftline_core::validation::{validate_id, validate_order_ids};
use shiftline_core::{
    CoreError, Courier, CourierStatus, Order, OrderStatus, OrderType, Permission, Principal,
    ValidationError,
};
use shiftline_db::{CourierRepository, OrderFilter, OrderRepository};
use sqlx::SqliteConnection;
use tracing::{info, warn};

use crate::error::EngineResult;
use crate::{in_scope, read_branch, Engine};

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignResult {
    pub courier: Courier,
    pub updated_orders: Vec<Order>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnassignResult {
    pub orders: Vec<Order>,
}

/// A BUSY courier with the time spent on the current run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusyCourier {
    #[serde(flatten)]
    pub courier: Courier,
    pub elapsed_seconds: i64,
    pub elapsed_minutes: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourierBoard {
    pub available: Vec<Courier>,
    pub busy: Vec<BusyCourier>,
    pub out: Vec<Courier>,
}

// =============================================================================
// Operations
// =============================================================================

impl Engine {
    /// Dispatches every eligible order of `order_ids` to the courier.
    ///
    /// ## Errors
    /// - `NotFound` if the courier is unknown or out of scope, or if no
    ///   order could be dispatched (the courier is left untouched)
    pub async fn assign(
        &self,
        principal: &Principal,
        order_ids: &[String],
        courier_id: &str,
    ) -> EngineResult<AssignResult> {
        principal.authorize(Permission::Dispatch)?;
        validate_order_ids(order_ids)?;
        validate_id("courierId", courier_id)?;

        let result = self
            .retry
            .run("assign", move || self.assign_tx(principal, order_ids, courier_id))
            .await?;

        info!(
            courier_id,
            dispatched = result.updated_orders.len(),
            requested = order_ids.len(),
            "Orders assigned"
        );
        self.publish_updates(&result.updated_orders);
        Ok(result)
    }

    async fn assign_tx(
        &self,
        principal: &Principal,
        order_ids: &[String],
        courier_id: &str,
    ) -> EngineResult<AssignResult> {
        let tenant_id = principal.tenant_id.as_str();
        let mut tx = self.db.begin().await?;

        let courier = scoped_courier(&mut tx, principal, courier_id).await?;
        let candidates = OrderRepository::get_many(&mut tx, tenant_id, order_ids).await?;
        let now = Utc::now();

        let mut dispatched = Vec::new();
        for order in candidates {
            if !dispatchable(principal, &order, &courier) {
                warn!(
                    order_id = %order.id,
                    status = %order.status,
                    "Skipping order that cannot be dispatched"
                );
                continue;
            }
            if OrderRepository::mark_dispatched(&mut tx, &order.id, &courier.id, order.status, now)
                .await?
            {
                dispatched.push(order.id);
            }
        }

        if dispatched.is_empty() {
            return Err(CoreError::NoEligibleOrders {
                action: "assign".to_string(),
            }
            .into());
        }

        CourierRepository::mark_busy(&mut tx, &courier.id, now).await?;

        let updated_orders = OrderRepository::get_many(&mut tx, tenant_id, &dispatched).await?;
        let courier = scoped_courier(&mut tx, principal, courier_id).await?;

        tx.commit().await?;
        Ok(AssignResult {
            courier,
            updated_orders,
        })
    }

    /// Takes DELIVERING orders back to NEW. The courier keeps its status.
    pub async fn unassign(
        &self,
        principal: &Principal,
        order_ids: &[String],
    ) -> EngineResult<UnassignResult> {
        principal.authorize(Permission::Dispatch)?;
        validate_order_ids(order_ids)?;

        let result = self
            .retry
            .run("unassign", move || self.unassign_tx(principal, order_ids))
            .await?;

        info!(returned = result.orders.len(), "Orders unassigned");
        self.publish_updates(&result.orders);
        Ok(result)
    }

    async fn unassign_tx(
        &self,
        principal: &Principal,
        order_ids: &[String],
    ) -> EngineResult<UnassignResult> {
        let tenant_id = principal.tenant_id.as_str();
        let mut tx = self.db.begin().await?;

        let candidates = OrderRepository::get_many(&mut tx, tenant_id, order_ids).await?;
        let now = Utc::now();

        let mut returned = Vec::new();
        for order in candidates {
            if !in_scope(principal, &order.branch_id) || order.status != OrderStatus::Delivering {
                continue;
            }
            if OrderRepository::mark_returned(&mut tx, &order.id, now).await? {
                returned.push(order.id);
            }
        }

        if returned.is_empty() {
            return Err(CoreError::NoEligibleOrders {
                action: "unassign".to_string(),
            }
            .into());
        }

        let orders = OrderRepository::get_many(&mut tx, tenant_id, &returned).await?;
        tx.commit().await?;
        Ok(UnassignResult { orders })
    }

    /// Administrative status change. BUSY is only ever entered through
    /// [`Engine::assign`].
    pub async fn set_courier_status(
        &self,
        principal: &Principal,
        courier_id: &str,
        status: CourierStatus,
    ) -> EngineResult<Courier> {
        principal.authorize(Permission::Dispatch)?;
        validate_id("courierId", courier_id)?;
        if status == CourierStatus::Busy {
            return Err(ValidationError::NotAllowed {
                field: "status".to_string(),
                allowed: vec!["AVAILABLE".to_string(), "OUT".to_string()],
            }
            .into());
        }

        let courier = self
            .retry
            .run("set_courier_status", move || {
                self.set_courier_status_tx(principal, courier_id, status)
            })
            .await?;

        info!(courier_id, status = ?courier.status, "Courier status set");
        Ok(courier)
    }

    async fn set_courier_status_tx(
        &self,
        principal: &Principal,
        courier_id: &str,
        status: CourierStatus,
    ) -> EngineResult<Courier> {
        let mut tx = self.db.begin().await?;
        scoped_courier(&mut tx, principal, courier_id).await?;
        CourierRepository::set_status(&mut tx, courier_id, status).await?;
        let courier = scoped_courier(&mut tx, principal, courier_id).await?;
        tx.commit().await?;
        Ok(courier)
    }

    /// The courier is back at the branch and ready for another run.
    pub async fn return_courier(
        &self,
        principal: &Principal,
        courier_id: &str,
    ) -> EngineResult<Courier> {
        self.set_courier_status(principal, courier_id, CourierStatus::Available)
            .await
    }

    /// Active couriers grouped by status.
    pub async fn board(
        &self,
        principal: &Principal,
        branch_id: Option<&str>,
    ) -> EngineResult<CourierBoard> {
        principal.authorize(Permission::ViewShift)?;
        let couriers = self
            .db
            .couriers()
            .list(&principal.tenant_id, read_branch(principal, branch_id))
            .await?;

        let now = Utc::now();
        let mut board = CourierBoard::default();
        for courier in couriers {
            match courier.status {
                CourierStatus::Available => board.available.push(courier),
                CourierStatus::Out => board.out.push(courier),
                CourierStatus::Busy => {
                    let elapsed = courier.elapsed(now).unwrap_or_else(chrono::Duration::zero);
                    board.busy.push(BusyCourier {
                        elapsed_seconds: elapsed.num_seconds(),
                        elapsed_minutes: elapsed.num_minutes(),
                        courier,
                    });
                }
            }
        }
        Ok(board)
    }

    /// OUT couriers, the ones that can be called in.
    pub async fn out_couriers(
        &self,
        principal: &Principal,
        branch_id: Option<&str>,
    ) -> EngineResult<Vec<Courier>> {
        Ok(self.board(principal, branch_id).await?.out)
    }

    /// Deliveries waiting for a courier across open shifts.
    pub async fn unassigned_orders(
        &self,
        principal: &Principal,
        branch_id: Option<&str>,
    ) -> EngineResult<Vec<Order>> {
        principal.authorize(Permission::ViewShift)?;
        Ok(self
            .db
            .orders()
            .unassigned_deliveries(&principal.tenant_id, read_branch(principal, branch_id))
            .await?)
    }

    /// Deliveries on the road in the branch's open shift.
    pub async fn assigned_orders(
        &self,
        principal: &Principal,
        branch_id: Option<&str>,
    ) -> EngineResult<Vec<Order>> {
        principal.authorize(Permission::ViewShift)?;
        let branch_id = principal.target_branch(branch_id)?;

        let Some(shift) = self.db.shifts().current(&principal.tenant_id, &branch_id).await? else {
            return Ok(Vec::new());
        };

        let filter = OrderFilter {
            order_type: Some(OrderType::Delivery),
            statuses: vec![OrderStatus::Delivering],
            ..Default::default()
        };
        Ok(self.db.orders().list_for_shift(&shift.id, &filter).await?)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Loads an active courier visible to the principal.
pub(crate) async fn scoped_courier(
    conn: &mut SqliteConnection,
    principal: &Principal,
    courier_id: &str,
) -> EngineResult<Courier> {
    CourierRepository::get_in(conn, &principal.tenant_id, courier_id)
        .await?
        .filter(|c| c.is_active && in_scope(principal, &c.branch_id))
        .ok_or_else(|| CoreError::CourierNotFound(courier_id.to_string()).into())
}

fn dispatchable(principal: &Principal, order: &Order, courier: &Courier) -> bool {
    if !in_scope(principal, &order.branch_id)
        || order.branch_id != courier.branch_id
        || order.order_type != OrderType::Delivery
        || !order.status.is_assignable()
    {
        return false;
    }

    let mut after = order.clone();
    after.status = OrderStatus::Delivering;
    after.courier_id = Some(courier.id.clone());
    validate_change(order, &after).is_ok()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, ErrorCode};
    use crate::lifecycle::OrderPatch;
    use crate::testing::{self, call_center, cashier, delivery, rider, takeaway, BRANCH};

    async fn two_deliveries(engine: &Engine) -> Vec<Order> {
        let mut orders = Vec::new();
        for items in [[("p-pizza", 1)], [("p-burger", 1)]] {
            orders.push(
                engine
                    .create_order(&cashier(), delivery(Some("c1"), &items))
                    .await
                    .unwrap(),
            );
        }
        orders
    }

    fn ids(orders: &[Order]) -> Vec<String> {
        orders.iter().map(|o| o.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_assign_dispatches_and_marks_busy() {
        let engine = testing::engine().await;
        let orders = two_deliveries(&engine).await;

        let result = engine.assign(&cashier(), &ids(&orders), "k1").await.unwrap();

        assert_eq!(result.courier.status, CourierStatus::Busy);
        assert!(result.courier.busy_since.is_some());
        assert_eq!(result.updated_orders.len(), 2);
        for order in &result.updated_orders {
            assert_eq!(order.status, OrderStatus::Delivering);
            assert_eq!(order.courier_id.as_deref(), Some("k1"));
            assert!(order.assigned_at.is_some());
            assert_eq!(order.version, 1);
        }

        let assigned = engine.assigned_orders(&cashier(), None).await.unwrap();
        assert_eq!(assigned.len(), 2);
        assert!(engine.unassigned_orders(&cashier(), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_assign_skips_what_it_cannot_dispatch() {
        let engine = testing::engine().await;
        let paid = engine
            .create_order(&cashier(), takeaway(&[("p-pizza", 1)]))
            .await
            .unwrap();
        let ready = engine
            .create_order(&cashier(), delivery(Some("c1"), &[("p-cola", 1)]))
            .await
            .unwrap();
        engine
            .update_order(
                &cashier(),
                &ready.id,
                OrderPatch {
                    status: Some(OrderStatus::Ready),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let requested = vec![paid.id.clone(), ready.id.clone(), "o-ghost".to_string()];
        let result = engine.assign(&cashier(), &requested, "k1").await.unwrap();

        assert_eq!(ids(&result.updated_orders), vec![ready.id.clone()]);
        let untouched = engine.order(&cashier(), &paid.id).await.unwrap();
        assert_eq!(untouched.status, OrderStatus::Paid);
        assert!(untouched.courier_id.is_none());

        // Already on the road: nothing left to dispatch
        let err = engine.assign(&cashier(), &[ready.id.clone()], "k2").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_failed_assign_leaves_courier_alone() {
        let engine = testing::engine().await;
        let paid = engine
            .create_order(&cashier(), takeaway(&[("p-pizza", 1)]))
            .await
            .unwrap();

        let err = engine.assign(&cashier(), &[paid.id], "k1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(err.to_string().contains("assign"));

        let board = engine.board(&cashier(), None).await.unwrap();
        assert!(board.busy.is_empty());
        assert_eq!(board.out.len(), 2);
    }

    #[tokio::test]
    async fn test_assign_rejects_unknown_courier_and_roles() {
        let engine = testing::engine().await;
        let orders = two_deliveries(&engine).await;

        let err = engine.assign(&cashier(), &ids(&orders), "k-ghost").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err = engine.assign(&rider(), &ids(&orders), "k1").await.unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));

        let err = engine.assign(&cashier(), &[], "k1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_unassign_returns_orders_and_keeps_courier_busy() {
        let engine = testing::engine().await;
        let orders = two_deliveries(&engine).await;
        engine.assign(&cashier(), &ids(&orders), "k1").await.unwrap();

        let result = engine.unassign(&cashier(), &[orders[0].id.clone()]).await.unwrap();
        assert_eq!(result.orders.len(), 1);
        let returned = &result.orders[0];
        assert_eq!(returned.status, OrderStatus::New);
        assert!(returned.courier_id.is_none());
        assert!(returned.assigned_at.is_none());

        let board = engine.board(&cashier(), None).await.unwrap();
        assert_eq!(board.busy.len(), 1);
        assert_eq!(board.busy[0].courier.id, "k1");

        let err = engine.unassign(&cashier(), &[orders[0].id.clone()]).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_courier_status_changes() {
        let engine = testing::engine().await;

        let courier = engine.return_courier(&cashier(), "k2").await.unwrap();
        assert_eq!(courier.status, CourierStatus::Available);
        assert!(courier.busy_since.is_none());

        let err = engine
            .set_courier_status(&cashier(), "k2", CourierStatus::Busy)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let courier = engine
            .set_courier_status(&cashier(), "k2", CourierStatus::Out)
            .await
            .unwrap();
        assert_eq!(courier.status, CourierStatus::Out);
    }

    #[tokio::test]
    async fn test_board_groups_and_times_couriers() {
        let engine = testing::engine().await;
        let orders = two_deliveries(&engine).await;
        engine.assign(&cashier(), &ids(&orders[..1]), "k1").await.unwrap();
        engine.return_courier(&cashier(), "k2").await.unwrap();

        let board = engine.board(&cashier(), None).await.unwrap();
        assert_eq!(board.available.len(), 1);
        assert_eq!(board.available[0].id, "k2");
        assert_eq!(board.busy.len(), 1);
        assert!(board.busy[0].elapsed_seconds >= 0);
        assert_eq!(board.busy[0].elapsed_minutes, board.busy[0].elapsed_seconds / 60);
        assert!(board.out.is_empty());
        assert!(engine.out_couriers(&cashier(), None).await.unwrap().is_empty());

        let json = serde_json::to_value(&board).unwrap();
        assert_eq!(json["busy"][0]["id"], "k1");
        assert!(json["busy"][0]["elapsedSeconds"].is_number());

        let unassigned = engine.unassigned_orders(&call_center(), None).await.unwrap();
        assert_eq!(ids(&unassigned), vec![orders[1].id.clone()]);
    }

    #[tokio::test]
    async fn test_assigned_orders_without_open_shift() {
        let engine = testing::engine().await;
        assert!(engine.assigned_orders(&cashier(), None).await.unwrap().is_empty());
        assert!(engine
            .assigned_orders(&call_center(), Some(BRANCH))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_assign_publishes_one_update_per_order() {
        let engine = testing::engine().await.with_live_fanout();
        let orders = two_deliveries(&engine).await;
        let (courier_conn, mut courier_rx) = engine.registry().connect("u-rider", "t-none", 8);
        courier_conn.join(shiftline_notify::Room::Courier("k1".into()));

        engine.assign(&cashier(), &ids(&orders), "k1").await.unwrap();

        for _ in 0..2 {
            assert_eq!(courier_rx.try_recv().unwrap().name, "orderUpdated");
        }
        assert!(courier_rx.try_recv().is_err());
    }
}
