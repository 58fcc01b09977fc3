//! # Order State Machines
//!
//! One transition table for order status, one for payment status, and the
//! guard predicates every operation consults before writing.
//!
//! ## Order Status
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   NEW ──► PREPARING ──► READY ──┐                                       │
//! │    │          │                 │                                       │
//! │    └──────────┴─────────────────┴──► DELIVERING ──► DELIVERED ──► PAID  │
//! │    ▲                                  │   │                       ▲     │
//! │    └──────────── unassign ────────────┘   └──── settle ───────────┘     │
//! │                                                                         │
//! │   TAKEAWAY orders are born PAID.     CANCELED: declared, unreachable.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Payment Status
//! ```text
//! UNPAID ──► PAID ──► REFUNDED
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::{Order, OrderType};

// =============================================================================
// Order Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Preparing,
    Ready,
    Delivering,
    Delivered,
    Paid,
    Canceled,
}

impl OrderStatus {
    /// Statuses an order may be dispatched from.
    pub const ASSIGNABLE: [OrderStatus; 3] =
        [OrderStatus::New, OrderStatus::Preparing, OrderStatus::Ready];

    /// Statuses a courier can be settled for.
    pub const SETTLEABLE: [OrderStatus; 2] = [OrderStatus::Delivering, OrderStatus::Delivered];

    /// The transition table.
    pub const fn allowed_next(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            New => &[Preparing, Ready, Delivering],
            Preparing => &[Ready, Delivering],
            Ready => &[Delivering],
            Delivering => &[Delivered, Paid, New],
            Delivered => &[Paid],
            Paid | Canceled => &[],
        }
    }

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    pub fn is_assignable(self) -> bool {
        Self::ASSIGNABLE.contains(&self)
    }

    pub fn is_settleable(self) -> bool {
        Self::SETTLEABLE.contains(&self)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::Ready => "READY",
            OrderStatus::Delivering => "DELIVERING",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Paid => "PAID",
            OrderStatus::Canceled => "CANCELED",
        }
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::New
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Unpaid, PaymentStatus::Paid)
                | (PaymentStatus::Paid, PaymentStatus::Refunded)
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl Default for PaymentStatus {
    fn default() -> Self {
        PaymentStatus::Unpaid
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Guards
// =============================================================================

/// Checks the guard attached to entering `order.status`.
///
/// ## Guards
/// - DELIVERING: DELIVERY order with a courier
/// - NEW (from DELIVERING): courier cleared
/// - PAID: payment status is PAID
fn check_entry_guard(from: OrderStatus, order: &Order) -> CoreResult<()> {
    let fail = |reason: &str| CoreError::GuardFailed {
        order_id: order.id.clone(),
        to: order.status.to_string(),
        reason: reason.to_string(),
    };

    match order.status {
        OrderStatus::Delivering => {
            if order.order_type != OrderType::Delivery {
                return Err(fail("only delivery orders can be dispatched"));
            }
            if order.courier_id.is_none() {
                return Err(fail("a courier must be assigned"));
            }
        }
        OrderStatus::New if from == OrderStatus::Delivering => {
            if order.courier_id.is_some() {
                return Err(fail("the courier must be cleared when returning to NEW"));
            }
        }
        OrderStatus::Paid => {
            if order.payment_status != PaymentStatus::Paid {
                return Err(fail("payment must be PAID"));
            }
        }
        _ => {}
    }

    Ok(())
}

/// Validates a whole-order change against both state machines, the entry
/// guards and the paid-order pricing freeze.
///
/// Settlement and collection write DELIVERY payments directly with a
/// conditional update, so a DELIVERY order going UNPAID → PAID through
/// here is rejected.
///
/// `before` is the stored order, `after` the order as it would be written.
///
/// ## Example
/// ```rust,ignore
/// let mut after = before.clone();
/// after.status = OrderStatus::Preparing;
/// status::validate_change(&before, &after)?;
/// ```
pub fn validate_change(before: &Order, after: &Order) -> CoreResult<()> {
    // Pricing stays frozen once paid, refunds included
    if before.payment_status != PaymentStatus::Unpaid
        && (before.items != after.items
            || before.delivery_fee_cents != after.delivery_fee_cents
            || before.customer_id != after.customer_id)
    {
        return Err(CoreError::OrderLocked {
            order_id: before.id.clone(),
        });
    }

    if before.payment_status != after.payment_status
        && !before.payment_status.can_transition_to(after.payment_status)
    {
        return Err(CoreError::InvalidPaymentTransition {
            order_id: before.id.clone(),
            from: before.payment_status.to_string(),
            to: after.payment_status.to_string(),
        });
    }

    if before.order_type == OrderType::Delivery
        && before.payment_status == PaymentStatus::Unpaid
        && after.payment_status == PaymentStatus::Paid
    {
        return Err(CoreError::SettlementRequired {
            order_id: before.id.clone(),
        });
    }

    if before.status != after.status {
        if !before.status.can_transition_to(after.status) {
            return Err(CoreError::InvalidTransition {
                order_id: before.id.clone(),
                from: before.status.to_string(),
                to: after.status.to_string(),
            });
        }
        check_entry_guard(before.status, after)?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::tests::sample_order;

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        assert!(New.can_transition_to(Delivering));
        assert!(Ready.can_transition_to(Delivering));
        assert!(Delivering.can_transition_to(New));
        assert!(Delivered.can_transition_to(Paid));

        assert!(!New.can_transition_to(Paid));
        assert!(!Ready.can_transition_to(Preparing));
        assert!(!Delivered.can_transition_to(Delivering));
    }

    #[test]
    fn test_terminal_states() {
        assert!(OrderStatus::Paid.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(!OrderStatus::Delivered.is_terminal());
    }

    #[test]
    fn test_canceled_is_unreachable() {
        let all = [
            OrderStatus::New,
            OrderStatus::Preparing,
            OrderStatus::Ready,
            OrderStatus::Delivering,
            OrderStatus::Delivered,
            OrderStatus::Paid,
            OrderStatus::Canceled,
        ];
        assert!(all
            .iter()
            .all(|s| !s.can_transition_to(OrderStatus::Canceled)));
    }

    #[test]
    fn test_guard_sets() {
        assert!(OrderStatus::Preparing.is_assignable());
        assert!(!OrderStatus::Delivering.is_assignable());
        assert!(OrderStatus::Delivered.is_settleable());
        assert!(!OrderStatus::Ready.is_settleable());
    }

    #[test]
    fn test_payment_transitions() {
        assert!(PaymentStatus::Unpaid.can_transition_to(PaymentStatus::Paid));
        assert!(PaymentStatus::Paid.can_transition_to(PaymentStatus::Refunded));
        assert!(!PaymentStatus::Paid.can_transition_to(PaymentStatus::Unpaid));
        assert!(!PaymentStatus::Unpaid.can_transition_to(PaymentStatus::Refunded));
    }

    #[test]
    fn test_dispatch_requires_courier() {
        let before = sample_order(OrderType::Delivery);
        let mut after = before.clone();
        after.status = OrderStatus::Delivering;

        let err = validate_change(&before, &after).unwrap_err();
        assert!(matches!(err, CoreError::GuardFailed { .. }));

        after.courier_id = Some("courier-1".to_string());
        assert!(validate_change(&before, &after).is_ok());
    }

    #[test]
    fn test_takeaway_cannot_be_dispatched() {
        let mut before = sample_order(OrderType::Takeaway);
        before.status = OrderStatus::Ready;
        before.payment_status = PaymentStatus::Unpaid;
        let mut after = before.clone();
        after.status = OrderStatus::Delivering;
        after.courier_id = Some("courier-1".to_string());

        assert!(matches!(
            validate_change(&before, &after),
            Err(CoreError::GuardFailed { .. })
        ));
    }

    #[test]
    fn test_paid_requires_payment() {
        let mut before = sample_order(OrderType::Delivery);
        before.status = OrderStatus::Delivered;
        before.courier_id = Some("courier-1".to_string());
        let mut after = before.clone();
        after.status = OrderStatus::Paid;
        assert!(matches!(
            validate_change(&before, &after),
            Err(CoreError::GuardFailed { .. })
        ));
    }

    #[test]
    fn test_delivery_payment_goes_through_settlement() {
        let mut before = sample_order(OrderType::Delivery);
        before.status = OrderStatus::Delivered;
        before.courier_id = Some("courier-1".to_string());

        let mut after = before.clone();
        after.payment_status = PaymentStatus::Paid;
        assert!(matches!(
            validate_change(&before, &after),
            Err(CoreError::SettlementRequired { .. })
        ));

        after.status = OrderStatus::Paid;
        assert!(matches!(
            validate_change(&before, &after),
            Err(CoreError::SettlementRequired { .. })
        ));
    }

    #[test]
    fn test_paid_order_pricing_is_frozen() {
        let mut before = sample_order(OrderType::Delivery);
        before.payment_status = PaymentStatus::Paid;
        let mut after = before.clone();
        after.delivery_fee_cents += 500;

        assert!(matches!(
            validate_change(&before, &after),
            Err(CoreError::OrderLocked { .. })
        ));
    }

    #[test]
    fn test_refunded_order_pricing_is_frozen() {
        let mut before = sample_order(OrderType::Takeaway);
        before.status = OrderStatus::Paid;
        before.payment_status = PaymentStatus::Paid;

        let mut refunded = before.clone();
        refunded.payment_status = PaymentStatus::Refunded;
        assert!(validate_change(&before, &refunded).is_ok());

        let mut repriced = refunded.clone();
        repriced.items[0].quantity = 50;
        repriced.items[0].line_total_cents = 50_000;
        assert!(matches!(
            validate_change(&refunded, &repriced),
            Err(CoreError::OrderLocked { .. })
        ));
    }

    #[test]
    fn test_illegal_transition_reports_states() {
        let before = sample_order(OrderType::Delivery);
        let mut after = before.clone();
        after.status = OrderStatus::Delivered;

        match validate_change(&before, &after) {
            Err(CoreError::InvalidTransition { from, to, .. }) => {
                assert_eq!(from, "NEW");
                assert_eq!(to, "DELIVERED");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
