//! # Pricing
//!
//! Turns requested lines into priced [`OrderItem`]s and derives order totals.
//!
//! ```text
//! LineRequest { product_id, quantity }
//!      │  lookup(product_id) ──► Product { name, price }
//!      ▼
//! OrderItem { name, quantity, unit_price, line_total = quantity × unit_price }
//!      │
//!      ▼
//! OrderTotals { total_price = Σ line_total,
//!               delivery_fee = zone fee (DELIVERY) | 0 (TAKEAWAY),
//!               grand_total = total_price + delivery_fee }
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Order, OrderItem, OrderType, Product};

/// A line as requested by the caller, before pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LineRequest {
    pub product_id: String,
    pub quantity: i64,
}

impl LineRequest {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        LineRequest {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Prices one line from the product's current price.
pub fn price_line(product: &Product, quantity: i64) -> OrderItem {
    OrderItem {
        product_id: product.id.clone(),
        name: product.name.clone(),
        quantity,
        unit_price_cents: product.price_cents,
        line_total_cents: product.price().multiply_quantity(quantity).cents(),
    }
}

/// Prices every requested line, failing on the first unknown product.
///
/// `lookup` resolves a product id within the caller's tenant/branch scope.
pub fn price_lines<'a, F>(lines: &[LineRequest], mut lookup: F) -> CoreResult<Vec<OrderItem>>
where
    F: FnMut(&str) -> Option<&'a Product>,
{
    lines
        .iter()
        .map(|line| {
            lookup(&line.product_id)
                .map(|product| price_line(product, line.quantity))
                .ok_or_else(|| CoreError::ProductNotFound(line.product_id.clone()))
        })
        .collect()
}

// =============================================================================
// Order Totals
// =============================================================================

/// The three derived money fields of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub total_price: Money,
    pub delivery_fee: Money,
    pub grand_total: Money,
}

impl OrderTotals {
    /// Builds totals; the zone fee is dropped for TAKEAWAY orders.
    pub fn new(order_type: OrderType, total_price: Money, zone_fee: Money) -> Self {
        let delivery_fee = match order_type {
            OrderType::Delivery => zone_fee,
            OrderType::Takeaway => Money::zero(),
        };
        OrderTotals {
            total_price,
            delivery_fee,
            grand_total: total_price + delivery_fee,
        }
    }

    pub fn for_items(order_type: OrderType, items: &[OrderItem], zone_fee: Money) -> Self {
        let total_price = items.iter().map(OrderItem::line_total).sum();
        Self::new(order_type, total_price, zone_fee)
    }

    /// Writes the totals onto an order.
    pub fn apply_to(&self, order: &mut Order) {
        order.total_price_cents = self.total_price.cents();
        order.delivery_fee_cents = self.delivery_fee.cents();
        order.grand_total_cents = self.grand_total.cents();
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn product(id: &str, price_cents: i64) -> Product {
        Product {
            id: id.to_string(),
            tenant_id: "tenant-1".to_string(),
            branch_id: "branch-1".to_string(),
            name: format!("Product {id}"),
            category: None,
            price_cents,
            is_active: true,
        }
    }

    #[test]
    fn test_takeaway_totals() {
        let catalog: HashMap<String, Product> = [product("a", 1000), product("b", 500)]
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();
        let lines = vec![LineRequest::new("a", 2), LineRequest::new("b", 1)];

        let items = price_lines(&lines, |id| catalog.get(id)).unwrap();
        let totals = OrderTotals::for_items(OrderType::Takeaway, &items, Money::from_cents(1500));

        assert_eq!(items[0].line_total_cents, 2000);
        assert_eq!(totals.total_price.cents(), 2500);
        assert_eq!(totals.delivery_fee.cents(), 0);
        assert_eq!(totals.grand_total.cents(), 2500);
    }

    #[test]
    fn test_delivery_totals_include_zone_fee() {
        let totals = OrderTotals::new(
            OrderType::Delivery,
            Money::from_cents(4000),
            Money::from_cents(1500),
        );
        assert_eq!(totals.grand_total.cents(), 5500);
    }

    #[test]
    fn test_unknown_product() {
        let catalog: HashMap<String, Product> = HashMap::new();
        let lines = vec![LineRequest::new("ghost", 1)];

        let err = price_lines(&lines, |id| catalog.get(id)).unwrap_err();
        assert!(matches!(err, CoreError::ProductNotFound(id) if id == "ghost"));
    }

    #[test]
    fn test_line_snapshot_ignores_later_price_change() {
        let mut p = product("a", 1000);
        let item = price_line(&p, 3);
        p.price_cents = 9999;
        assert_eq!(item.unit_price_cents, 1000);
        assert_eq!(item.line_total_cents, 3000);
    }
}
