//! Shared fixtures: an in-memory engine seeded with one branch's catalog,
//! zones, customers and couriers.
//!
//! | id       | kind     | detail                         |
//! |----------|----------|--------------------------------|
//! | p-pizza  | product  | 10.00                          |
//! | p-cola   | product  | 5.00                           |
//! | p-burger | product  | 40.00                          |
//! | z1       | zone     | fee 15.00                      |
//! | c1       | customer | zone z1                        |
//! | c2       | customer | no zone                        |
//! | k1, k2   | courier  | OUT                            |

use shiftline_core::pricing::LineRequest;
use shiftline_core::{
    Courier, CourierStatus, Customer, LedgerTotals, Principal, Product, Role, Shift, Zone,
};
use shiftline_db::{Database, DbConfig};
use std::time::Duration;

use crate::lifecycle::CreateOrderRequest;
use crate::retry::RetryPolicy;
use crate::Engine;

pub(crate) const TENANT: &str = "t1";
pub(crate) const BRANCH: &str = "b1";

pub(crate) fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 20,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(20),
    }
}

pub(crate) async fn engine() -> Engine {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    seed(&db).await;
    Engine::new(db).with_retry(fast_retry())
}

pub(crate) async fn seed(db: &Database) {
    let catalog = db.catalog();
    for (id, name, price_cents) in [
        ("p-pizza", "Pizza", 1000),
        ("p-cola", "Cola", 500),
        ("p-burger", "Burger", 4000),
    ] {
        catalog
            .insert_product(&Product {
                id: id.to_string(),
                tenant_id: TENANT.to_string(),
                branch_id: BRANCH.to_string(),
                name: name.to_string(),
                category: None,
                price_cents,
                is_active: true,
            })
            .await
            .unwrap();
    }

    catalog
        .insert_zone(&Zone {
            id: "z1".to_string(),
            tenant_id: TENANT.to_string(),
            branch_id: BRANCH.to_string(),
            name: "Downtown".to_string(),
            delivery_fee_cents: 1500,
        })
        .await
        .unwrap();

    for (id, zone_id) in [("c1", Some("z1")), ("c2", None)] {
        catalog
            .insert_customer(&Customer {
                id: id.to_string(),
                tenant_id: TENANT.to_string(),
                branch_id: Some(BRANCH.to_string()),
                name: format!("Customer {id}"),
                address: Some("12 Harbour Road".to_string()),
                phone1: "555-0101".to_string(),
                phone2: None,
                zone_id: zone_id.map(str::to_string),
            })
            .await
            .unwrap();
    }

    for (id, name) in [("k1", "Karim"), ("k2", "Sara")] {
        db.couriers()
            .insert(&Courier {
                id: id.to_string(),
                tenant_id: TENANT.to_string(),
                branch_id: BRANCH.to_string(),
                name: name.to_string(),
                phone: Some("555-0199".to_string()),
                status: CourierStatus::Out,
                busy_since: None,
                is_active: true,
            })
            .await
            .unwrap();
    }
}

// -----------------------------------------------------------------------------
// Principals
// -----------------------------------------------------------------------------

fn principal(user_id: &str, role: Role) -> Principal {
    Principal::new(TENANT, Some(BRANCH.to_string()), user_id, role)
}

pub(crate) fn cashier() -> Principal {
    principal("u-cashier", Role::Cashier)
}

pub(crate) fn second_cashier() -> Principal {
    principal("u-cashier-2", Role::Cashier)
}

pub(crate) fn admin() -> Principal {
    principal("u-admin", Role::Admin)
}

pub(crate) fn rider() -> Principal {
    principal("u-rider", Role::Delivery)
}

/// Tenant-wide, no home branch.
pub(crate) fn call_center() -> Principal {
    Principal::new(TENANT, None, "u-agent", Role::CallCenterUser)
}

// -----------------------------------------------------------------------------
// Requests
// -----------------------------------------------------------------------------

fn lines(items: &[(&str, i64)]) -> Vec<LineRequest> {
    items
        .iter()
        .map(|(product_id, quantity)| LineRequest::new(*product_id, *quantity))
        .collect()
}

pub(crate) fn takeaway(items: &[(&str, i64)]) -> CreateOrderRequest {
    CreateOrderRequest {
        order_type: "TAKEAWAY".to_string(),
        items: lines(items),
        customer_id: None,
        branch_id: None,
        payment_method: None,
    }
}

pub(crate) fn delivery(customer_id: Option<&str>, items: &[(&str, i64)]) -> CreateOrderRequest {
    CreateOrderRequest {
        order_type: "DELIVERY".to_string(),
        items: lines(items),
        customer_id: customer_id.map(str::to_string),
        branch_id: None,
        payment_method: None,
    }
}

// -----------------------------------------------------------------------------
// Assertions
// -----------------------------------------------------------------------------

/// Σ cashbox totals == shift totals.
pub(crate) fn assert_balanced(shift: &Shift) {
    let sum: LedgerTotals = shift.cashbox_sum();
    assert_eq!(sum, shift.totals, "cashboxes do not add up to the shift");
}
