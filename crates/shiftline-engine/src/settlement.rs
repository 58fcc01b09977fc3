//! # Settlement
//!
//! Collecting a courier's cash and crediting it to the collecting cashier.
//!
//! ## Collection
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  courier's DELIVERY orders in the shift                                 │
//! │     status ∈ {DELIVERING, DELIVERED}  AND  payment ≠ PAID               │
//! │                         │                                               │
//! │                         ▼                                               │
//! │  UPDATE … SET PAID/PAID WHERE status = observed AND payment = observed  │
//! │     rows that lost a race update nothing and are left out               │
//! │                         │                                               │
//! │                         ▼                                               │
//! │  Σ grand total of the winners ──► cashier's cashbox + shift delivery    │
//! │                                   bucket (same amount, same count)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `settle` ends the courier's run (OUT) and answers with the delivery
//! report; `collect` takes the cash mid-shift and sends the courier back
//! out (AVAILABLE). A second call for the same courier finds nothing left
//! to collect and credits nothing.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shiftline_core::validation::validate_id;
use shiftline_core::{
    CoreError, Courier, CourierStatus, Customer, LedgerCredit, Money, Order, OrderItem,
    OrderStatus, OrderType, PaymentStatus, Permission, Principal, Shift, ShiftRef,
};
use shiftline_db::{
    CatalogRepository, CourierRepository, OrderFilter, OrderRepository, ShiftRepository,
};
use sqlx::SqliteConnection;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};
use ts_rs::TS;

use crate::dispatch::scoped_courier;
use crate::error::EngineResult;
use crate::reconcile::resolve_shift;
use crate::{in_scope, Engine};

// =============================================================================
// Report Types
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CourierContact {
    pub name: String,
    pub phone: Option<String>,
}

/// One delivery as it appears on the courier's sheet.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ReportLine {
    pub order_id: String,
    pub order_number: i64,
    pub cashier_id: String,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_phone2: Option<String>,
    pub customer_address: Option<String>,
    pub total_price_cents: i64,
    pub delivery_fee_cents: i64,
    pub grand_total_cents: i64,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub assigned_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItem>,
}

impl ReportLine {
    fn new(order: Order, customer: Option<&Customer>) -> Self {
        ReportLine {
            customer_name: customer.map(|c| c.name.clone()),
            customer_phone: customer.map(|c| c.phone1.clone()),
            customer_phone2: customer.and_then(|c| c.phone2.clone()),
            customer_address: customer.and_then(|c| c.address.clone()),
            order_id: order.id,
            order_number: order.order_number,
            cashier_id: order.cashier_id,
            total_price_cents: order.total_price_cents,
            delivery_fee_cents: order.delivery_fee_cents,
            grand_total_cents: order.grand_total_cents,
            status: order.status,
            payment_status: order.payment_status,
            created_at: order.created_at,
            assigned_at: order.assigned_at,
            items: order.items,
        }
    }
}

/// A courier's deliveries in one shift with money totals.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryReport {
    pub shift_id: String,
    pub courier_id: String,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    pub total_orders: i64,
    /// Σ item totals.
    pub total_amount_cents: i64,
    pub total_delivery_fees_cents: i64,
    pub grand_total_cents: i64,
    /// Σ grand totals not yet collected.
    pub total_unpaid_cents: i64,
    /// Collected by the call that produced this report.
    pub collected_now_cents: i64,
    /// Every delivery paid (true for a courier with none).
    pub is_settled: bool,
    pub courier: CourierContact,
    pub orders: Vec<ReportLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CollectResult {
    pub total_collected_cents: i64,
    pub updated_orders_count: i64,
}

// =============================================================================
// Operations
// =============================================================================

impl Engine {
    /// Collects everything the courier carries in the shift and sends the
    /// courier OUT.
    ///
    /// ## Errors
    /// - `NotFound` if the shift or courier is unknown, or if the courier
    ///   has unpaid deliveries none of which can be settled yet
    pub async fn settle(
        &self,
        principal: &Principal,
        shift: &ShiftRef,
        courier_id: &str,
    ) -> EngineResult<DeliveryReport> {
        principal.authorize(Permission::Settle)?;
        validate_id("courierId", courier_id)?;

        let (report, collected) = self
            .retry
            .run("settle", move || self.settle_tx(principal, shift, courier_id))
            .await?;

        info!(
            shift_id = %report.shift_id,
            courier_id,
            collected_now = report.collected_now_cents,
            collected_orders = collected.len(),
            cashier_id = %principal.user_id,
            "Courier settled"
        );
        self.publish_updates(&collected);
        Ok(report)
    }

    async fn settle_tx(
        &self,
        principal: &Principal,
        shift: &ShiftRef,
        courier_id: &str,
    ) -> EngineResult<(DeliveryReport, Vec<Order>)> {
        let mut tx = self.db.begin().await?;

        let shift = resolve_shift(&mut tx, principal, shift).await?;
        let courier = scoped_courier(&mut tx, principal, courier_id).await?;

        let collected = collect_from(&mut tx, principal, &shift, &courier.id).await?;
        if !collected.is_empty() {
            CourierRepository::set_status(&mut tx, &courier.id, CourierStatus::Out).await?;
        }

        let report =
            build_report(&mut tx, principal, &shift, &courier, sum_grand(&collected)).await?;
        if collected.is_empty() {
            if !report.is_settled {
                return Err(CoreError::NoEligibleOrders {
                    action: "settle".to_string(),
                }
                .into());
            }
            warn!(shift_id = %shift.id, courier_id, "Courier already settled");
        }

        tx.commit().await?;
        Ok((report, collected))
    }

    /// Mid-shift collection: the courier goes back to AVAILABLE.
    ///
    /// Returns zeros when there is nothing left to collect.
    pub async fn collect(
        &self,
        principal: &Principal,
        shift_id: &str,
        courier_id: &str,
    ) -> EngineResult<CollectResult> {
        principal.authorize(Permission::Settle)?;
        validate_id("shiftId", shift_id)?;
        validate_id("courierId", courier_id)?;

        let collected = self
            .retry
            .run("collect", move || self.collect_tx(principal, shift_id, courier_id))
            .await?;

        let result = CollectResult {
            total_collected_cents: sum_grand(&collected).cents(),
            updated_orders_count: collected.len() as i64,
        };
        info!(
            shift_id,
            courier_id,
            collected = result.total_collected_cents,
            orders = result.updated_orders_count,
            "Cash collected"
        );
        self.publish_updates(&collected);
        Ok(result)
    }

    async fn collect_tx(
        &self,
        principal: &Principal,
        shift_id: &str,
        courier_id: &str,
    ) -> EngineResult<Vec<Order>> {
        let mut tx = self.db.begin().await?;

        let shift = ShiftRepository::get_in(&mut tx, &principal.tenant_id, shift_id)
            .await?
            .filter(|s| s.is_open() && in_scope(principal, &s.branch_id))
            .ok_or_else(|| CoreError::ShiftNotFound(shift_id.to_string()))?;
        let courier = scoped_courier(&mut tx, principal, courier_id).await?;

        let collected = collect_from(&mut tx, principal, &shift, &courier.id).await?;
        if collected.is_empty() {
            warn!(shift_id, courier_id, "Nothing left to collect");
        } else {
            CourierRepository::set_status(&mut tx, &courier.id, CourierStatus::Available).await?;
        }

        tx.commit().await?;
        Ok(collected)
    }

    /// The courier's delivery report without collecting anything.
    pub async fn report(
        &self,
        principal: &Principal,
        shift: &ShiftRef,
        courier_id: &str,
    ) -> EngineResult<DeliveryReport> {
        principal.authorize(Permission::ViewShift)?;
        validate_id("courierId", courier_id)?;

        let mut conn = self.db.pool().acquire().await?;
        let shift = resolve_shift(&mut conn, principal, shift).await?;
        let courier = scoped_courier(&mut conn, principal, courier_id).await?;
        build_report(&mut conn, principal, &shift, &courier, Money::zero()).await
    }

    /// Couriers that carried at least one delivery in the shift.
    pub async fn shift_couriers(
        &self,
        principal: &Principal,
        shift: &ShiftRef,
    ) -> EngineResult<Vec<Courier>> {
        principal.authorize(Permission::ViewShift)?;

        let mut conn = self.db.pool().acquire().await?;
        let shift = resolve_shift(&mut conn, principal, shift).await?;
        let filter = OrderFilter {
            order_type: Some(OrderType::Delivery),
            ..Default::default()
        };
        let orders = OrderRepository::list_for_shift_in(&mut conn, &shift.id, &filter).await?;

        let courier_ids: BTreeSet<String> =
            orders.into_iter().filter_map(|o| o.courier_id).collect();
        let mut couriers = Vec::with_capacity(courier_ids.len());
        for courier_id in &courier_ids {
            if let Some(courier) =
                CourierRepository::get_in(&mut conn, &principal.tenant_id, courier_id).await?
            {
                couriers.push(courier);
            }
        }
        Ok(couriers)
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn sum_grand(orders: &[Order]) -> Money {
    orders.iter().map(Order::grand_total).sum()
}

/// Marks the courier's settleable, unpaid deliveries PAID and credits what
/// was actually marked. Returns the marked orders as stored.
async fn collect_from(
    conn: &mut SqliteConnection,
    principal: &Principal,
    shift: &Shift,
    courier_id: &str,
) -> EngineResult<Vec<Order>> {
    let filter = OrderFilter {
        order_type: Some(OrderType::Delivery),
        statuses: OrderStatus::SETTLEABLE.to_vec(),
        courier_id: Some(courier_id.to_string()),
        unassigned_only: false,
    };
    let candidates = OrderRepository::list_for_shift_in(conn, &shift.id, &filter).await?;

    let now = Utc::now();
    let mut won = Vec::new();
    for order in candidates.iter().filter(|o| !o.is_paid()) {
        if OrderRepository::mark_collected(conn, order, &principal.user_id, now).await? {
            won.push(order.id.clone());
        } else {
            debug!(order_id = %order.id, "Order already collected");
        }
    }

    let collected = OrderRepository::get_many(conn, &principal.tenant_id, &won).await?;
    if let Some(credit) = LedgerCredit::for_settlement(&collected) {
        ShiftRepository::ensure_open_cashbox(conn, &shift.id, &principal.user_id).await?;
        ShiftRepository::apply_credit(conn, shift, &principal.user_id, &credit).await?;
    }
    Ok(collected)
}

async fn build_report(
    conn: &mut SqliteConnection,
    principal: &Principal,
    shift: &Shift,
    courier: &Courier,
    collected_now: Money,
) -> EngineResult<DeliveryReport> {
    let filter = OrderFilter {
        order_type: Some(OrderType::Delivery),
        courier_id: Some(courier.id.clone()),
        ..Default::default()
    };
    let mut orders = OrderRepository::list_for_shift_in(conn, &shift.id, &filter).await?;
    orders.reverse();

    let customer_ids: Vec<String> = orders
        .iter()
        .filter_map(|o| o.customer_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let customers: HashMap<String, Customer> =
        CatalogRepository::customers_by_ids(conn, &principal.tenant_id, &customer_ids)
            .await?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

    let total_amount: Money = orders.iter().map(Order::total_price).sum();
    let total_fees: Money = orders.iter().map(Order::delivery_fee).sum();
    let grand_total: Money = orders.iter().map(Order::grand_total).sum();
    let total_unpaid: Money = orders.iter().filter(|o| !o.is_paid()).map(Order::grand_total).sum();
    let is_settled = orders.iter().all(Order::is_paid);

    let lines = orders
        .into_iter()
        .map(|order| {
            let customer = order.customer_id.as_ref().and_then(|id| customers.get(id));
            ReportLine::new(order, customer)
        })
        .collect::<Vec<_>>();

    Ok(DeliveryReport {
        shift_id: shift.id.clone(),
        courier_id: courier.id.clone(),
        opened_at: shift.opened_at,
        closed_at: shift.closed_at,
        total_orders: lines.len() as i64,
        total_amount_cents: total_amount.cents(),
        total_delivery_fees_cents: total_fees.cents(),
        grand_total_cents: grand_total.cents(),
        total_unpaid_cents: total_unpaid.cents(),
        collected_now_cents: collected_now.cents(),
        is_settled,
        courier: CourierContact {
            name: courier.name.clone(),
            phone: courier.phone.clone(),
        },
        orders: lines,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EngineError, ErrorCode};
    use crate::lifecycle::OrderPatch;
    use crate::testing::{
        self, admin, assert_balanced, cashier, delivery, rider, second_cashier, takeaway,
    };

    /// Two deliveries on the road with k1: 10.00 + 15.00 fee, 40.00 + 15.00 fee.
    async fn on_the_road(engine: &Engine) -> Vec<Order> {
        let mut ids = Vec::new();
        for product in ["p-pizza", "p-burger"] {
            let order = engine
                .create_order(&cashier(), delivery(Some("c1"), &[(product, 1)]))
                .await
                .unwrap();
            ids.push(order.id);
        }
        engine.assign(&cashier(), &ids, "k1").await.unwrap().updated_orders
    }

    #[tokio::test]
    async fn test_settle_collects_and_credits_the_cashier() {
        let engine = testing::engine().await;
        engine
            .create_order(&cashier(), takeaway(&[("p-cola", 1)]))
            .await
            .unwrap();
        let orders = on_the_road(&engine).await;
        let expected: i64 = orders.iter().map(|o| o.grand_total_cents).sum();
        assert_eq!(expected, 2500 + 5500);

        let report = engine
            .settle(&second_cashier(), &ShiftRef::Current, "k1")
            .await
            .unwrap();

        assert!(report.is_settled);
        assert_eq!(report.collected_now_cents, expected);
        assert_eq!(report.total_orders, 2);
        assert_eq!(report.total_amount_cents, 5000);
        assert_eq!(report.total_delivery_fees_cents, 3000);
        assert_eq!(report.grand_total_cents, expected);
        assert_eq!(report.total_unpaid_cents, 0);
        assert_eq!(report.courier.name, "Karim");
        assert_eq!(report.orders[0].order_number, 2);
        assert_eq!(report.orders[0].customer_name.as_deref(), Some("Customer c1"));
        assert_eq!(report.orders[0].customer_phone.as_deref(), Some("555-0101"));
        assert!(report
            .orders
            .iter()
            .all(|l| l.status == OrderStatus::Paid && l.payment_status == PaymentStatus::Paid));

        let settled = engine.order(&cashier(), &orders[0].id).await.unwrap();
        assert_eq!(settled.collected_by.as_deref(), Some("u-cashier-2"));
        assert!(settled.collected_at.is_some());

        let shift = engine.current_shift(&cashier(), None).await.unwrap().unwrap();
        assert_eq!(shift.totals.delivery_total_cents, expected);
        assert_eq!(shift.totals.delivery_count, 2);
        assert_eq!(shift.totals.overall_total_cents, expected + 500);
        let cashbox = shift.cashbox_for("u-cashier-2").unwrap();
        assert_eq!(cashbox.totals.delivery_total_cents, expected);
        assert_eq!(cashbox.totals.takeaway_count, 0);
        assert_balanced(&shift);

        let board = engine.board(&cashier(), None).await.unwrap();
        assert!(board.out.iter().any(|c| c.id == "k1"));
    }

    #[tokio::test]
    async fn test_second_settle_credits_nothing() {
        let engine = testing::engine().await;
        on_the_road(&engine).await;

        engine.settle(&cashier(), &ShiftRef::Current, "k1").await.unwrap();
        let before = engine.current_shift(&cashier(), None).await.unwrap().unwrap();

        let again = engine.settle(&cashier(), &ShiftRef::Current, "k1").await.unwrap();
        assert!(again.is_settled);
        assert_eq!(again.collected_now_cents, 0);
        assert_eq!(again.total_orders, 2);

        let after = engine.current_shift(&cashier(), None).await.unwrap().unwrap();
        assert_eq!(after.totals, before.totals);
        assert_eq!(after.version, before.version);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_settles_credit_once() {
        let path =
            std::env::temp_dir().join(format!("shiftline-settle-{}.db", uuid::Uuid::new_v4()));
        let config = shiftline_db::DbConfig::new(&path).max_connections(5);
        let db = shiftline_db::Database::new(config).await.unwrap();
        testing::seed(&db).await;
        let engine = Engine::new(db.clone()).with_retry(testing::fast_retry());
        let orders = on_the_road(&engine).await;
        let expected: i64 = orders.iter().map(|o| o.grand_total_cents).sum();

        let mut tasks = Vec::new();
        for principal in [cashier(), second_cashier()] {
            let engine = engine.clone();
            tasks.push(tokio::spawn(async move {
                engine.settle(&principal, &ShiftRef::Current, "k1").await.unwrap()
            }));
        }
        let mut collected = Vec::new();
        for task in tasks {
            let report = task.await.unwrap();
            assert!(report.is_settled);
            collected.push(report.collected_now_cents);
        }
        collected.sort();

        assert_eq!(collected.iter().sum::<i64>(), expected);
        assert_eq!(collected, vec![0, expected]);

        let shift = engine.current_shift(&cashier(), None).await.unwrap().unwrap();
        assert_eq!(shift.totals.delivery_total_cents, expected);
        assert_balanced(&shift);

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn test_settle_with_nothing_settleable() {
        let engine = testing::engine().await;
        let order = engine
            .create_order(&cashier(), delivery(Some("c1"), &[("p-pizza", 1)]))
            .await
            .unwrap();
        // Courier set by patch without dispatch: still NEW, not settleable
        engine
            .update_order(
                &cashier(),
                &order.id,
                OrderPatch {
                    courier_id: Some(Some("k2".into())),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = engine
            .settle(&cashier(), &ShiftRef::Current, "k2")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        // A courier with no deliveries at all is vacuously settled
        let report = engine.settle(&cashier(), &ShiftRef::Current, "k1").await.unwrap();
        assert!(report.is_settled);
        assert_eq!(report.total_orders, 0);
    }

    #[tokio::test]
    async fn test_settle_roles_and_lookup() {
        let engine = testing::engine().await;
        on_the_road(&engine).await;

        let err = engine.settle(&rider(), &ShiftRef::Current, "k1").await.unwrap_err();
        assert!(matches!(err, EngineError::Unauthorized(_)));

        let err = engine
            .settle(&cashier(), &ShiftRef::Id("s-ghost".into()), "k1")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        let err = engine.settle(&cashier(), &ShiftRef::Current, "k-ghost").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        // Nothing was collected by the failed calls
        let report = engine.report(&admin(), &ShiftRef::Current, "k1").await.unwrap();
        assert!(!report.is_settled);
        assert_eq!(report.total_unpaid_cents, 8000);
        assert_eq!(report.collected_now_cents, 0);
    }

    #[tokio::test]
    async fn test_collect_keeps_courier_working() {
        let engine = testing::engine().await;
        let orders = on_the_road(&engine).await;
        let shift_id = orders[0].shift_id.clone();

        let result = engine.collect(&cashier(), &shift_id, "k1").await.unwrap();
        assert_eq!(result.updated_orders_count, 2);
        assert_eq!(result.total_collected_cents, 8000);

        let board = engine.board(&cashier(), None).await.unwrap();
        assert!(board.available.iter().any(|c| c.id == "k1"));

        let again = engine.collect(&cashier(), &shift_id, "k1").await.unwrap();
        assert_eq!(again, CollectResult { total_collected_cents: 0, updated_orders_count: 0 });

        let shift = engine.shift(&cashier(), &shift_id).await.unwrap();
        assert_eq!(shift.totals.delivery_total_cents, 8000);
        assert_balanced(&shift);

        let err = engine.collect(&cashier(), "s-ghost", "k1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_collect_only_from_open_shift() {
        let engine = testing::engine().await;
        let orders = on_the_road(&engine).await;
        let shift_id = orders[0].shift_id.clone();
        engine.settle(&cashier(), &ShiftRef::Current, "k1").await.unwrap();
        engine.close_shift(&admin(), None).await.unwrap();

        let err = engine.collect(&cashier(), &shift_id, "k1").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);

        // The closed shift's report is still readable by id
        let report = engine
            .report(&cashier(), &ShiftRef::Id(shift_id.clone()), "k1")
            .await
            .unwrap();
        assert!(report.is_settled);
        assert!(report.closed_at.is_some());
    }

    #[tokio::test]
    async fn test_delivered_orders_settle_too() {
        let engine = testing::engine().await;
        let orders = on_the_road(&engine).await;
        engine
            .update_order(
                &cashier(),
                &orders[0].id,
                OrderPatch {
                    status: Some(OrderStatus::Delivered),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let report = engine.settle(&cashier(), &ShiftRef::Current, "k1").await.unwrap();
        assert_eq!(report.collected_now_cents, 8000);
        assert!(report.is_settled);
    }

    #[tokio::test]
    async fn test_shift_couriers() {
        let engine = testing::engine().await;
        on_the_road(&engine).await;
        let other = engine
            .create_order(&cashier(), delivery(Some("c2"), &[("p-cola", 1)]))
            .await
            .unwrap();
        engine.assign(&cashier(), &[other.id], "k2").await.unwrap();

        let couriers = engine.shift_couriers(&cashier(), &ShiftRef::Current).await.unwrap();
        let ids: Vec<&str> = couriers.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["k1", "k2"]);
    }
}
