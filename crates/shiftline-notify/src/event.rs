//! # Order Events
//!
//! The payload pushed to live observers whenever an order is created or
//! changes.
//!
//! ## Routing
//! ```text
//! OrderEvent { tenantId, branchId, courierId? }
//!      │
//!      ├──▶ Room::Tenant(tenantId)      call center, admins
//!      ├──▶ Room::Branch(branchId)      cashiers, kitchen
//!      └──▶ Room::Courier(courierId)    the assigned courier, if any
//! ```

use serde::{Deserialize, Serialize};
use shiftline_core::Order;
use std::fmt;

use crate::error::NotifyResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEventType {
    New,
    Update,
}

impl OrderEventType {
    /// Name observers subscribe to.
    pub fn name(&self) -> &'static str {
        match self {
            OrderEventType::New => "newOrder",
            OrderEventType::Update => "orderUpdated",
        }
    }
}

/// A subscription target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    Tenant(String),
    Branch(String),
    Courier(String),
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Room::Tenant(id) => write!(f, "tenant:{}", id),
            Room::Branch(id) => write!(f, "branch:{}", id),
            Room::Courier(id) => write!(f, "courier:{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub event_type: OrderEventType,
    pub tenant_id: String,
    pub branch_id: String,
    pub order: Order,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub courier_id: Option<String>,
}

impl OrderEvent {
    pub fn new_order(order: &Order) -> Self {
        Self::build(OrderEventType::New, order)
    }

    pub fn updated(order: &Order) -> Self {
        Self::build(OrderEventType::Update, order)
    }

    fn build(event_type: OrderEventType, order: &Order) -> Self {
        OrderEvent {
            event_type,
            tenant_id: order.tenant_id.clone(),
            branch_id: order.branch_id.clone(),
            courier_id: order.courier_id.clone(),
            order: order.clone(),
        }
    }

    /// Rooms this event is routed to.
    pub fn rooms(&self) -> Vec<Room> {
        let mut rooms = vec![
            Room::Tenant(self.tenant_id.clone()),
            Room::Branch(self.branch_id.clone()),
        ];
        if let Some(courier_id) = &self.courier_id {
            rooms.push(Room::Courier(courier_id.clone()));
        }
        rooms
    }

    pub fn to_json(&self) -> NotifyResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;
    use shiftline_core::{
        OrderItem, OrderSource, OrderStatus, OrderType, PaymentMethod, PaymentStatus,
    };

    pub(crate) fn order(courier_id: Option<&str>) -> Order {
        let now = Utc::now();
        Order {
            id: "o1".to_string(),
            tenant_id: "t1".to_string(),
            branch_id: "b1".to_string(),
            shift_id: "s1".to_string(),
            order_number: 7,
            order_type: OrderType::Delivery,
            status: OrderStatus::New,
            payment_status: PaymentStatus::Unpaid,
            payment_method: PaymentMethod::Cash,
            source: OrderSource::Cashier,
            items: vec![OrderItem {
                product_id: "p1".to_string(),
                name: "Pizza".to_string(),
                quantity: 1,
                unit_price_cents: 4000,
                line_total_cents: 4000,
            }],
            total_price_cents: 4000,
            delivery_fee_cents: 1500,
            grand_total_cents: 5500,
            cashier_id: "u1".to_string(),
            courier_id: courier_id.map(str::to_string),
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
    fn test_rooms_include_courier_only_when_assigned() {
        let unassigned = OrderEvent::new_order(&order(None));
        assert_eq!(
            unassigned.rooms(),
            vec![Room::Tenant("t1".into()), Room::Branch("b1".into())]
        );

        let assigned = OrderEvent::updated(&order(Some("k1")));
        assert_eq!(assigned.rooms().len(), 3);
        assert!(assigned.rooms().contains(&Room::Courier("k1".into())));
    }

    #[test]
    fn test_payload_shape() {
        let json = OrderEvent::new_order(&order(None)).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["eventType"], "NEW");
        assert_eq!(value["tenantId"], "t1");
        assert_eq!(value["branchId"], "b1");
        assert_eq!(value["order"]["orderNumber"], 7);
        assert!(value.get("courierId").is_none());
    }

    #[test]
    fn test_event_names() {
        assert_eq!(OrderEventType::New.name(), "newOrder");
        assert_eq!(OrderEventType::Update.name(), "orderUpdated");
        assert_eq!(Room::Courier("k1".into()).to_string(), "courier:k1");
    }
}
