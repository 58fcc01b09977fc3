//! # Domain Types
//!
//! Core domain types used throughout Shiftline.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Shift       │   │     Order       │   │    Courier      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  status         │◄──│  shift_id       │──►│  status         │       │
//! │  │  totals         │   │  order_number   │   │  busy_since     │       │
//! │  │  cashboxes[]    │   │  items[]        │   └─────────────────┘       │
//! │  │  version        │   │  grand_total    │                              │
//! │  └────────┬────────┘   └─────────────────┘                              │
//! │           │                                                             │
//! │  ┌────────▼────────┐   Catalog (owned elsewhere, read here):           │
//! │  │    Cashbox      │   Product ─ price      Zone ─ delivery fee        │
//! │  │  cashier_id     │   Customer ─ zone_id                              │
//! │  │  totals         │                                                    │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All identifiers are UUID v4 strings; all money is stored as `*_cents`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::status::{OrderStatus, PaymentStatus};

// =============================================================================
// Order Enums
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Takeaway,
    Delivery,
}

impl OrderType {
    pub const fn as_str(self) -> &'static str {
        match self {
            OrderType::Takeaway => "TAKEAWAY",
            OrderType::Delivery => "DELIVERY",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the wire form of an order type.
///
/// ```rust
/// use shiftline_core::OrderType;
///
/// assert_eq!("delivery".parse::<OrderType>().unwrap(), OrderType::Delivery);
/// assert!("PICKUP".parse::<OrderType>().is_err());
/// ```
impl FromStr for OrderType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TAKEAWAY" => Ok(OrderType::Takeaway),
            "DELIVERY" => Ok(OrderType::Delivery),
            _ => Err(ValidationError::NotAllowed {
                field: "type".to_string(),
                allowed: vec!["TAKEAWAY".to_string(), "DELIVERY".to_string()],
            }),
        }
    }
}

/// Where an order was keyed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSource {
    Cashier,
    CallCenter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Card,
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Cash
    }
}

// =============================================================================
// Order
// =============================================================================

/// A priced line on an order.
///
/// Name and unit price are captured when the line is priced and never
/// follow later catalog changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

impl OrderItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

/// An order scoped to (tenant, branch, shift).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: String,
    pub shift_id: String,
    /// Unique and gap-free within the shift, starting at 1.
    pub order_number: i64,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub source: OrderSource,
    pub items: Vec<OrderItem>,
    pub total_price_cents: i64,
    /// Always 0 for TAKEAWAY.
    pub delivery_fee_cents: i64,
    /// `total_price_cents + delivery_fee_cents`.
    pub grand_total_cents: i64,
    /// User who keyed the order in.
    pub cashier_id: String,
    pub courier_id: Option<String>,
    pub customer_id: Option<String>,
    pub zone_id: Option<String>,
    /// Cashier who collected the cash for a delivery.
    pub collected_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub collected_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every update.
    pub version: i64,
}

impl Order {
    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }

    #[inline]
    pub fn delivery_fee(&self) -> Money {
        Money::from_cents(self.delivery_fee_cents)
    }

    #[inline]
    pub fn grand_total(&self) -> Money {
        Money::from_cents(self.grand_total_cents)
    }

    pub fn is_delivery(&self) -> bool {
        self.order_type == OrderType::Delivery
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// Whether the stored totals agree with each other and with the items.
    pub fn totals_consistent(&self) -> bool {
        let lines: Money = self.items.iter().map(OrderItem::line_total).sum();
        let fee_ok = self.order_type == OrderType::Delivery || self.delivery_fee_cents == 0;
        fee_ok
            && lines == self.total_price()
            && self.grand_total() == self.total_price() + self.delivery_fee()
    }
}

// =============================================================================
// Ledger
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerStatus {
    Open,
    Closed,
}

/// Running totals kept by a shift and by each of its cashboxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTotals {
    pub takeaway_total_cents: i64,
    pub takeaway_count: i64,
    pub delivery_total_cents: i64,
    pub delivery_count: i64,
    pub overall_total_cents: i64,
}

impl LedgerTotals {
    #[inline]
    pub fn overall(&self) -> Money {
        Money::from_cents(self.overall_total_cents)
    }

    /// Component-wise sum.
    pub fn combined(&self, other: &LedgerTotals) -> LedgerTotals {
        LedgerTotals {
            takeaway_total_cents: self.takeaway_total_cents + other.takeaway_total_cents,
            takeaway_count: self.takeaway_count + other.takeaway_count,
            delivery_total_cents: self.delivery_total_cents + other.delivery_total_cents,
            delivery_count: self.delivery_count + other.delivery_count,
            overall_total_cents: self.overall_total_cents + other.overall_total_cents,
        }
    }
}

/// A per-cashier sub-ledger within a shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Cashbox {
    pub id: String,
    pub shift_id: String,
    pub cashier_id: String,
    pub status: LedgerStatus,
    pub totals: LedgerTotals,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
}

/// An accounting period for one branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: String,
    pub status: LedgerStatus,
    pub totals: LedgerTotals,
    /// Ordered by opening time.
    pub cashboxes: Vec<Cashbox>,
    pub opened_by: String,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    pub closed_by: Option<String>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped on every totals mutation.
    pub version: i64,
}

impl Shift {
    pub fn is_open(&self) -> bool {
        self.status == LedgerStatus::Open
    }

    pub fn cashbox_for(&self, cashier_id: &str) -> Option<&Cashbox> {
        self.cashboxes.iter().find(|c| c.cashier_id == cashier_id)
    }

    /// Σ of every cashbox's totals.
    pub fn cashbox_sum(&self) -> LedgerTotals {
        self.cashboxes
            .iter()
            .fold(LedgerTotals::default(), |acc, c| acc.combined(&c.totals))
    }

    /// Whether the shift aggregate equals the sum of its cashboxes.
    pub fn is_balanced(&self) -> bool {
        self.cashbox_sum() == self.totals
    }
}

/// Addresses a shift either as "whatever is open now" or by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShiftRef {
    Current,
    Id(String),
}

impl FromStr for ShiftRef {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "shiftId".to_string(),
            });
        }
        if s.eq_ignore_ascii_case("current") {
            Ok(ShiftRef::Current)
        } else {
            Ok(ShiftRef::Id(s.to_string()))
        }
    }
}

impl fmt::Display for ShiftRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShiftRef::Current => f.write_str("current"),
            ShiftRef::Id(id) => f.write_str(id),
        }
    }
}

// =============================================================================
// Courier
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CourierStatus {
    Available,
    Busy,
    Out,
}

impl Default for CourierStatus {
    fn default() -> Self {
        CourierStatus::Out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Courier {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: String,
    pub name: String,
    pub phone: Option<String>,
    pub status: CourierStatus,
    /// Set while BUSY.
    #[ts(as = "Option<String>")]
    pub busy_since: Option<DateTime<Utc>>,
    pub is_active: bool,
}

impl Courier {
    /// Time spent on the current dispatch, if any.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        match (self.status, self.busy_since) {
            (CourierStatus::Busy, Some(since)) => Some(now - since),
            _ => None,
        }
    }
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: String,
    pub name: String,
    pub category: Option<String>,
    pub price_cents: i64,
    pub is_active: bool,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: String,
    pub name: String,
    pub delivery_fee_cents: i64,
}

impl Zone {
    #[inline]
    pub fn delivery_fee(&self) -> Money {
        Money::from_cents(self.delivery_fee_cents)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub tenant_id: String,
    pub branch_id: Option<String>,
    pub name: String,
    pub address: Option<String>,
    pub phone1: String,
    pub phone2: Option<String>,
    pub zone_id: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A NEW/UNPAID order with one 2 × 10.00 line.
    pub(crate) fn sample_order(order_type: OrderType) -> Order {
        let now = Utc::now();
        let fee = if order_type == OrderType::Delivery { 1500 } else { 0 };
        Order {
            id: "ord-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            branch_id: "branch-1".to_string(),
            shift_id: "shift-1".to_string(),
            order_number: 1,
            order_type,
            status: OrderStatus::New,
            payment_status: PaymentStatus::Unpaid,
            payment_method: PaymentMethod::Cash,
            source: OrderSource::Cashier,
            items: vec![OrderItem {
                product_id: "prod-1".to_string(),
                name: "Burger".to_string(),
                quantity: 2,
                unit_price_cents: 1000,
                line_total_cents: 2000,
            }],
            total_price_cents: 2000,
            delivery_fee_cents: fee,
            grand_total_cents: 2000 + fee,
            cashier_id: "cashier-1".to_string(),
            courier_id: None,
            customer_id: None,
            zone_id: None,
            collected_by: None,
            created_at: now,
            updated_at: now,
            assigned_at: None,
            collected_at: None,
            version: 0,
        }
    }

    #[test]
    fn test_order_type_parse() {
        assert_eq!("TAKEAWAY".parse::<OrderType>().unwrap(), OrderType::Takeaway);
        assert_eq!(" delivery ".parse::<OrderType>().unwrap(), OrderType::Delivery);
        assert!(matches!(
            "PICKUP".parse::<OrderType>(),
            Err(ValidationError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_order_serializes_type_field() {
        let order = sample_order(OrderType::Delivery);
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["type"], "DELIVERY");
        assert_eq!(json["paymentStatus"], "UNPAID");
        assert_eq!(json["grandTotalCents"], 3500);
    }

    #[test]
    fn test_totals_consistent() {
        let mut order = sample_order(OrderType::Delivery);
        assert!(order.totals_consistent());

        order.grand_total_cents += 1;
        assert!(!order.totals_consistent());

        let mut takeaway = sample_order(OrderType::Takeaway);
        assert!(takeaway.totals_consistent());
        takeaway.delivery_fee_cents = 100;
        takeaway.grand_total_cents = 2100;
        assert!(!takeaway.totals_consistent());
    }

    #[test]
    fn test_shift_ref_parse() {
        assert_eq!("current".parse::<ShiftRef>().unwrap(), ShiftRef::Current);
        assert_eq!("CURRENT".parse::<ShiftRef>().unwrap(), ShiftRef::Current);
        assert_eq!(
            "shift-9".parse::<ShiftRef>().unwrap(),
            ShiftRef::Id("shift-9".to_string())
        );
        assert!("".parse::<ShiftRef>().is_err());
    }

    #[test]
    fn test_shift_balance() {
        let now = Utc::now();
        let totals = LedgerTotals {
            takeaway_total_cents: 2500,
            takeaway_count: 1,
            delivery_total_cents: 0,
            delivery_count: 0,
            overall_total_cents: 2500,
        };
        let mut shift = Shift {
            id: "shift-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            branch_id: "branch-1".to_string(),
            status: LedgerStatus::Open,
            totals,
            cashboxes: vec![Cashbox {
                id: "cb-1".to_string(),
                shift_id: "shift-1".to_string(),
                cashier_id: "cashier-1".to_string(),
                status: LedgerStatus::Open,
                totals,
                opened_at: now,
                closed_at: None,
            }],
            opened_by: "cashier-1".to_string(),
            opened_at: now,
            closed_by: None,
            closed_at: None,
            version: 1,
        };
        assert!(shift.is_balanced());
        assert!(shift.cashbox_for("cashier-1").is_some());
        assert!(shift.cashbox_for("cashier-2").is_none());

        shift.totals.overall_total_cents += 100;
        assert!(!shift.is_balanced());
    }

    #[test]
    fn test_courier_elapsed_only_when_busy() {
        let now = Utc::now();
        let mut courier = Courier {
            id: "c-1".to_string(),
            tenant_id: "tenant-1".to_string(),
            branch_id: "branch-1".to_string(),
            name: "Sam".to_string(),
            phone: None,
            status: CourierStatus::Busy,
            busy_since: Some(now - Duration::seconds(90)),
            is_active: true,
        };
        assert_eq!(courier.elapsed(now).map(|d| d.num_seconds()), Some(90));

        courier.status = CourierStatus::Available;
        assert!(courier.elapsed(now).is_none());
    }
}
