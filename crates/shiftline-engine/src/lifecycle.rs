//! # Order Lifecycle
//!
//! Creating orders, patching them through the state machine, and reading
//! them back.
//!
//! ## Create Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   1. ensure_open(shift)          first statement is a write, so the     │
//! │                                  writer lock is held from here on       │
//! │   2. price lines                 unknown product ──► rollback           │
//! │   3. customer → zone → fee       DELIVERY only                          │
//! │   4. next order number           counter upsert, rolled back on failure │
//! │   5. insert order + items                                               │
//! │   6. TAKEAWAY: cashbox + credit  shift version CAS                      │
//! │  COMMIT ──► publish NEW                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! TAKEAWAY orders are paid at the counter: they are born PAID/PAID and
//! credited immediately. DELIVERY orders are born NEW/UNPAID and reach the
//! ledger only when their cash is collected (see [`crate::settlement`]).

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use shiftline_core::pricing::{self, LineRequest, OrderTotals};
use shiftline_core::status::validate_change;
use shiftline_core::validation::{validate_id, validate_lines};
use shiftline_core::{
    CoreError, Customer, LedgerCredit, Money, Order, OrderItem, OrderStatus, OrderType,
    PaymentMethod, PaymentStatus, Permission, Principal, ShiftRef, ValidationError,
};
use shiftline_db::{
    CatalogRepository, CounterRepository, CounterScope, CourierRepository, OrderFilter,
    OrderRepository, ShiftRepository,
};
use shiftline_notify::OrderEvent;
use sqlx::SqliteConnection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::reconcile::resolve_shift;
use crate::{in_scope, Engine};

// =============================================================================
// Requests
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// `TAKEAWAY` or `DELIVERY`, case-insensitive.
    #[serde(rename = "type")]
    pub order_type: String,
    pub items: Vec<LineRequest>,
    #[serde(default)]
    pub customer_id: Option<String>,
    /// Only honoured for call-center roles.
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

/// Partial update of an order. Absent fields are left alone; for
/// `customerId` and `courierId`, an explicit `null` clears the field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPatch {
    #[serde(default)]
    pub items: Option<Vec<LineRequest>>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub customer_id: Option<Option<String>>,
    #[serde(default)]
    pub status: Option<OrderStatus>,
    #[serde(default)]
    pub payment_status: Option<PaymentStatus>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub courier_id: Option<Option<String>>,
}

impl OrderPatch {
    pub fn is_empty(&self) -> bool {
        self.items.is_none()
            && self.customer_id.is_none()
            && self.status.is_none()
            && self.payment_status.is_none()
            && self.courier_id.is_none()
    }
}

/// Present-but-null deserializes to `Some(None)`.
fn explicit_null<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// =============================================================================
// Operations
// =============================================================================

impl Engine {
    /// Creates an order in the branch's open shift, opening the shift if
    /// there is none.
    ///
    /// ## Errors
    /// - `Validation` for an unknown type, bad lines, a customer on a
    ///   TAKEAWAY order, or no branch to write to
    /// - `NotFound` for an unknown product, customer or zone
    pub async fn create_order(
        &self,
        principal: &Principal,
        request: CreateOrderRequest,
    ) -> EngineResult<Order> {
        principal.authorize(Permission::CreateOrder)?;

        let order_type: OrderType = request.order_type.parse()?;
        validate_lines(&request.items)?;
        if let Some(customer_id) = &request.customer_id {
            if order_type == OrderType::Takeaway {
                return Err(ValidationError::NotApplicable {
                    field: "customerId".to_string(),
                    reason: "takeaway orders have no customer".to_string(),
                }
                .into());
            }
            validate_id("customerId", customer_id)?;
        }
        let branch_id = principal.target_branch(request.branch_id.as_deref())?;

        let request = &request;
        let branch_id = branch_id.as_str();
        let order = self
            .retry
            .run("create_order", move || {
                self.create_order_tx(principal, branch_id, order_type, request)
            })
            .await?;

        info!(
            order_id = %order.id,
            order_number = order.order_number,
            order_type = %order.order_type,
            grand_total = order.grand_total_cents,
            branch_id = %order.branch_id,
            "Order created"
        );
        self.bus.publish(&OrderEvent::new_order(&order));
        Ok(order)
    }

    async fn create_order_tx(
        &self,
        principal: &Principal,
        branch_id: &str,
        order_type: OrderType,
        request: &CreateOrderRequest,
    ) -> EngineResult<Order> {
        let tenant_id = principal.tenant_id.as_str();
        let mut tx = self.db.begin().await?;

        let shift =
            ShiftRepository::ensure_open(&mut tx, tenant_id, branch_id, &principal.user_id).await?;

        let items = price_requested(&mut tx, tenant_id, branch_id, &request.items).await?;

        let (customer, zone_fee) = match order_type {
            OrderType::Delivery => {
                resolve_customer(&mut tx, tenant_id, request.customer_id.as_deref()).await?
            }
            OrderType::Takeaway => (None, Money::zero()),
        };

        let scope = CounterScope::order_number(tenant_id, branch_id, &shift.id);
        let order_number = CounterRepository::next_value(&mut tx, &scope).await?;

        let now = Utc::now();
        let paid_now = order_type == OrderType::Takeaway;
        let mut order = Order {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            branch_id: branch_id.to_string(),
            shift_id: shift.id.clone(),
            order_number,
            order_type,
            status: if paid_now { OrderStatus::Paid } else { OrderStatus::New },
            payment_status: if paid_now {
                PaymentStatus::Paid
            } else {
                PaymentStatus::Unpaid
            },
            payment_method: request.payment_method.unwrap_or_default(),
            source: principal.order_source(),
            items,
            total_price_cents: 0,
            delivery_fee_cents: 0,
            grand_total_cents: 0,
            cashier_id: principal.user_id.clone(),
            courier_id: None,
            customer_id: customer.as_ref().map(|c| c.id.clone()),
            zone_id: customer.and_then(|c| c.zone_id),
            collected_by: paid_now.then(|| principal.user_id.clone()),
            created_at: now,
            updated_at: now,
            assigned_at: None,
            collected_at: paid_now.then_some(now),
            version: 0,
        };
        OrderTotals::for_items(order_type, &order.items, zone_fee).apply_to(&mut order);

        OrderRepository::insert(&mut tx, &order).await?;

        if let Some(credit) = LedgerCredit::at_creation(&order) {
            ShiftRepository::ensure_open_cashbox(&mut tx, &shift.id, &principal.user_id).await?;
            ShiftRepository::apply_credit(&mut tx, &shift, &principal.user_id, &credit).await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    /// Applies a patch through the state machines.
    ///
    /// Items are re-priced from current products and the fee re-resolved
    /// when the customer changes. Ledger totals are not touched here.
    ///
    /// ## Errors
    /// - `Conflict` for an illegal transition, a failed guard, or a pricing
    ///   change on a paid order
    /// - `NotFound` for an order outside the principal's scope
    pub async fn update_order(
        &self,
        principal: &Principal,
        order_id: &str,
        patch: OrderPatch,
    ) -> EngineResult<Order> {
        principal.authorize(Permission::UpdateOrder)?;
        validate_id("orderId", order_id)?;
        if patch.is_empty() {
            return Err(ValidationError::Required {
                field: "patch".to_string(),
            }
            .into());
        }
        if let Some(items) = &patch.items {
            validate_lines(items)?;
        }
        if let Some(Some(customer_id)) = &patch.customer_id {
            validate_id("customerId", customer_id)?;
        }
        if let Some(Some(courier_id)) = &patch.courier_id {
            validate_id("courierId", courier_id)?;
        }

        let patch = &patch;
        let order = self
            .retry
            .run("update_order", move || self.update_order_tx(principal, order_id, patch))
            .await?;

        info!(
            order_id = %order.id,
            status = %order.status,
            payment_status = %order.payment_status,
            "Order updated"
        );
        self.bus.publish(&OrderEvent::updated(&order));
        Ok(order)
    }

    async fn update_order_tx(
        &self,
        principal: &Principal,
        order_id: &str,
        patch: &OrderPatch,
    ) -> EngineResult<Order> {
        let tenant_id = principal.tenant_id.as_str();
        let mut tx = self.db.begin().await?;

        let before = scoped_order(&mut tx, principal, order_id).await?;
        let mut after = before.clone();
        let now = Utc::now();

        if let Some(lines) = &patch.items {
            after.items = price_requested(&mut tx, tenant_id, &before.branch_id, lines).await?;
        }

        let mut zone_fee = before.delivery_fee();
        if let Some(customer_id) = &patch.customer_id {
            if before.order_type == OrderType::Takeaway && customer_id.is_some() {
                return Err(ValidationError::NotApplicable {
                    field: "customerId".to_string(),
                    reason: "takeaway orders have no customer".to_string(),
                }
                .into());
            }
            let (customer, fee) =
                resolve_customer(&mut tx, tenant_id, customer_id.as_deref()).await?;
            after.customer_id = customer.as_ref().map(|c| c.id.clone());
            after.zone_id = customer.and_then(|c| c.zone_id);
            zone_fee = fee;
        }
        OrderTotals::for_items(after.order_type, &after.items, zone_fee).apply_to(&mut after);

        if let Some(courier_id) = &patch.courier_id {
            if let Some(courier_id) = courier_id {
                CourierRepository::get_in(&mut tx, tenant_id, courier_id)
                    .await?
                    .filter(|c| c.branch_id == before.branch_id)
                    .ok_or_else(|| CoreError::CourierNotFound(courier_id.clone()))?;
            }
            after.courier_id = courier_id.clone();
        }

        if let Some(status) = patch.status {
            after.status = status;
        }
        if let Some(payment_status) = patch.payment_status {
            after.payment_status = payment_status;
        }

        if after.status == OrderStatus::Delivering && before.status != OrderStatus::Delivering {
            after.assigned_at = Some(now);
        }
        if after.status == OrderStatus::New && before.status == OrderStatus::Delivering {
            after.assigned_at = None;
        }
        if after.payment_status == PaymentStatus::Paid
            && before.payment_status != PaymentStatus::Paid
        {
            after.collected_at = Some(now);
            after.collected_by = Some(principal.user_id.clone());
        }
        after.updated_at = now;

        validate_change(&before, &after)?;

        OrderRepository::update(&mut tx, &after, before.version).await?;
        after.version = before.version + 1;

        // A courier put on the road by patch is BUSY, same as through assign
        let dispatched = after.status == OrderStatus::Delivering
            && (before.status != OrderStatus::Delivering || before.courier_id != after.courier_id);
        if let (true, Some(courier_id)) = (dispatched, after.courier_id.as_deref()) {
            CourierRepository::mark_busy(&mut tx, courier_id, now).await?;
        }

        tx.commit().await?;
        Ok(after)
    }

    /// One order, if it is in the principal's scope.
    pub async fn order(&self, principal: &Principal, order_id: &str) -> EngineResult<Order> {
        validate_id("orderId", order_id)?;
        let mut conn = self.db.pool().acquire().await?;
        scoped_order(&mut conn, principal, order_id).await
    }

    /// Every order of the open shift or of a given shift, newest first.
    pub async fn shift_orders(
        &self,
        principal: &Principal,
        shift: &ShiftRef,
    ) -> EngineResult<Vec<Order>> {
        principal.authorize(Permission::ViewShift)?;
        let mut conn = self.db.pool().acquire().await?;
        let shift = resolve_shift(&mut conn, principal, shift).await?;
        Ok(OrderRepository::list_for_shift_in(&mut conn, &shift.id, &OrderFilter::default()).await?)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Loads an order, hiding it when it belongs to another branch.
pub(crate) async fn scoped_order(
    conn: &mut SqliteConnection,
    principal: &Principal,
    order_id: &str,
) -> EngineResult<Order> {
    OrderRepository::get_in(conn, &principal.tenant_id, order_id)
        .await?
        .filter(|o| in_scope(principal, &o.branch_id))
        .ok_or_else(|| CoreError::OrderNotFound(order_id.to_string()).into())
}

/// Prices lines from the branch's active products.
async fn price_requested(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    branch_id: &str,
    lines: &[LineRequest],
) -> EngineResult<Vec<OrderItem>> {
    let ids: Vec<String> = lines.iter().map(|l| l.product_id.clone()).collect();
    let products = CatalogRepository::products_by_ids(conn, tenant_id, branch_id, &ids).await?;
    Ok(pricing::price_lines(lines, |id| products.iter().find(|p| p.id == id))?)
}

/// Customer and the delivery fee of their zone (0 without a zone).
async fn resolve_customer(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    customer_id: Option<&str>,
) -> EngineResult<(Option<Customer>, Money)> {
    let Some(customer_id) = customer_id else {
        return Ok((None, Money::zero()));
    };

    let customer = CatalogRepository::customer(conn, tenant_id, customer_id)
        .await?
        .ok_or_else(|| CoreError::CustomerNotFound(customer_id.to_string()))?;

    let fee = match customer.zone_id.as_deref() {
        Some(zone_id) => CatalogRepository::zone(conn, tenant_id, zone_id)
            .await?
            .ok_or_else(|| CoreError::ZoneNotFound(zone_id.to_string()))?
            .delivery_fee(),
        None => Money::zero(),
    };

    debug!(customer_id, fee = fee.cents(), "Resolved delivery fee");
    Ok((Some(customer), fee))
}

// =============================================================================
// Tests
// =============================================================================
