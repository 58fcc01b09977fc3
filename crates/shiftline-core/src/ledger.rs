//! # Ledger Arithmetic
//!
//! Decides which bucket an amount lands in and applies it to
//! [`LedgerTotals`]. The database layer persists the result; the rule for
//! *when* an order is credited lives here.
//!
//! ## Crediting Rule
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  TAKEAWAY created ──► credit takeaway bucket                            │
//! │                       ├── shift aggregate                               │
//! │                       └── creator's cashbox                             │
//! │                                                                         │
//! │  DELIVERY created ──► nothing (cash is still with nobody)               │
//! │                                                                         │
//! │  DELIVERY settled ──► credit delivery bucket                            │
//! │                       ├── shift aggregate                               │
//! │                       └── collecting cashier's cashbox                  │
//! │                                                                         │
//! │  Every credit hits the shift and exactly one cashbox, so                │
//! │  Σ cashbox.totals == shift.totals holds after every commit.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::money::Money;
use crate::types::{LedgerTotals, Order, OrderType};

/// An amount headed for one bucket of a shift and one of its cashboxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerCredit {
    Takeaway { amount: Money, count: i64 },
    Delivery { amount: Money, count: i64 },
}

impl LedgerCredit {
    pub fn amount(&self) -> Money {
        match self {
            LedgerCredit::Takeaway { amount, .. } | LedgerCredit::Delivery { amount, .. } => {
                *amount
            }
        }
    }

    pub fn count(&self) -> i64 {
        match self {
            LedgerCredit::Takeaway { count, .. } | LedgerCredit::Delivery { count, .. } => *count,
        }
    }

    /// Credit owed when an order is created, if any.
    pub fn at_creation(order: &Order) -> Option<LedgerCredit> {
        match order.order_type {
            OrderType::Takeaway => Some(LedgerCredit::Takeaway {
                amount: order.grand_total(),
                count: 1,
            }),
            OrderType::Delivery => None,
        }
    }

    /// Credit owed for a batch of deliveries collected from a courier.
    ///
    /// Returns `None` when nothing was actually collected.
    pub fn for_settlement(collected: &[Order]) -> Option<LedgerCredit> {
        if collected.is_empty() {
            return None;
        }
        Some(LedgerCredit::Delivery {
            amount: collected.iter().map(Order::grand_total).sum(),
            count: collected.len() as i64,
        })
    }

    /// Totals with this credit applied.
    pub fn applied_to(&self, totals: &LedgerTotals) -> LedgerTotals {
        let mut next = *totals;
        match *self {
            LedgerCredit::Takeaway { amount, count } => {
                next.takeaway_total_cents += amount.cents();
                next.takeaway_count += count;
            }
            LedgerCredit::Delivery { amount, count } => {
                next.delivery_total_cents += amount.cents();
                next.delivery_count += count;
            }
        }
        next.overall_total_cents += self.amount().cents();
        next
    }
}

/// Rebuilds totals from scratch out of paid orders.
///
/// Used when a shift closes; unpaid and refunded orders are ignored.
pub fn totals_from_paid<'a>(orders: impl IntoIterator<Item = &'a Order>) -> LedgerTotals {
    orders
        .into_iter()
        .filter(|o| o.is_paid())
        .fold(LedgerTotals::default(), |acc, order| {
            let credit = match order.order_type {
                OrderType::Takeaway => LedgerCredit::Takeaway {
                    amount: order.grand_total(),
                    count: 1,
                },
                OrderType::Delivery => LedgerCredit::Delivery {
                    amount: order.grand_total(),
                    count: 1,
                },
            };
            credit.applied_to(&acc)
        })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::PaymentStatus;
    use crate::types::tests::sample_order;

    #[test]
    fn test_takeaway_credited_at_creation() {
        let order = sample_order(OrderType::Takeaway);
        let credit = LedgerCredit::at_creation(&order).unwrap();
        assert_eq!(credit.amount().cents(), 2000);

        let totals = credit.applied_to(&LedgerTotals::default());
        assert_eq!(totals.takeaway_total_cents, 2000);
        assert_eq!(totals.takeaway_count, 1);
        assert_eq!(totals.overall_total_cents, 2000);
        assert_eq!(totals.delivery_count, 0);
    }

    #[test]
    fn test_delivery_not_credited_at_creation() {
        let order = sample_order(OrderType::Delivery);
        assert!(LedgerCredit::at_creation(&order).is_none());
    }

    #[test]
    fn test_settlement_credit_sums_grand_totals() {
        let a = sample_order(OrderType::Delivery);
        let mut b = sample_order(OrderType::Delivery);
        b.grand_total_cents = 5500;

        let credit = LedgerCredit::for_settlement(&[a, b]).unwrap();
        assert_eq!(credit.amount().cents(), 3500 + 5500);
        assert_eq!(credit.count(), 2);
        assert!(LedgerCredit::for_settlement(&[]).is_none());
    }

    #[test]
    fn test_totals_from_paid_skips_unpaid() {
        let mut takeaway = sample_order(OrderType::Takeaway);
        takeaway.payment_status = PaymentStatus::Paid;
        let mut delivered = sample_order(OrderType::Delivery);
        delivered.payment_status = PaymentStatus::Paid;
        let unpaid = sample_order(OrderType::Delivery);

        let totals = totals_from_paid([&takeaway, &delivered, &unpaid]);
        assert_eq!(totals.takeaway_total_cents, 2000);
        assert_eq!(totals.delivery_total_cents, 3500);
        assert_eq!(totals.delivery_count, 1);
        assert_eq!(totals.overall_total_cents, 5500);
    }
}
