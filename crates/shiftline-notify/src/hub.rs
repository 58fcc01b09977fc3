//! # Fanout Hub
//!
//! Delivers order events to live connections in this process.
//!
//! ## Delivery
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  OrderEvent ──▶ serialize once ──▶ Arc<str>                            │
//! │                                      │                                  │
//! │            registry.recipients(event.rooms())   (deduplicated)          │
//! │                                      │                                  │
//! │            ┌─────────────────────────┼─────────────────────────┐        │
//! │            ▼                         ▼                         ▼        │
//! │     try_send(conn A)          try_send(conn B)          try_send(conn C)│
//! │                                                                         │
//! │  Full queue   → frame dropped for that connection, logged              │
//! │  Closed queue → receiver gone, counted                                 │
//! │  Neither ever blocks the publisher.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::bus::EventSink;
use crate::error::NotifyResult;
use crate::event::OrderEvent;
use crate::registry::{ConnectionRegistry, Delivery};

/// Outcome of one fanout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutStats {
    pub delivered: usize,
    pub dropped: usize,
    pub closed: usize,
}

#[derive(Debug, Clone)]
pub struct FanoutHub {
    registry: ConnectionRegistry,
}

impl FanoutHub {
    pub fn new(registry: ConnectionRegistry) -> Self {
        FanoutHub { registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn deliver(&self, event: &OrderEvent) -> NotifyResult<FanoutStats> {
        let payload: Arc<str> = Arc::from(event.to_json()?);
        let name = event.event_type.name();
        let mut stats = FanoutStats::default();

        for (connection_id, sender) in self.registry.recipients(&event.rooms()) {
            let delivery = Delivery {
                name,
                payload: Arc::clone(&payload),
            };
            match sender.try_send(delivery) {
                Ok(()) => stats.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        connection_id = %connection_id,
                        order_id = %event.order.id,
                        "Connection queue full, event dropped"
                    );
                    stats.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => stats.closed += 1,
            }
        }

        debug!(
            order_id = %event.order.id,
            event = name,
            delivered = stats.delivered,
            dropped = stats.dropped,
            "Order event fanned out"
        );
        Ok(stats)
    }
}

impl EventSink for FanoutHub {
    fn name(&self) -> &'static str {
        "fanout"
    }

    fn publish(&self, event: &OrderEvent) -> NotifyResult<()> {
        self.deliver(event).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::tests::order;
    use crate::event::Room;

    #[tokio::test]
    async fn test_routes_by_tenant_branch_and_courier() {
        let registry = ConnectionRegistry::new();
        let hub = FanoutHub::new(registry.clone());

        // Tenant room only (joined on connect)
        let (_admin, mut admin_rx) = registry.connect("admin", "t1", 8);
        // Branch + tenant: still one frame
        let (cashier, mut cashier_rx) = registry.connect("cashier", "t1", 8);
        cashier.join(Room::Branch("b1".into()));
        // Other tenant, courier room of a different courier
        let (courier, mut courier_rx) = registry.connect("courier", "t2", 8);
        courier.join(Room::Courier("k2".into()));

        let stats = hub.deliver(&OrderEvent::updated(&order(Some("k1")))).unwrap();
        assert_eq!(stats.delivered, 2);

        let frame = admin_rx.try_recv().unwrap();
        assert_eq!(frame.name, "orderUpdated");
        let value: serde_json::Value = serde_json::from_str(&frame.payload).unwrap();
        assert_eq!(value["courierId"], "k1");

        assert!(cashier_rx.try_recv().is_ok());
        assert!(cashier_rx.try_recv().is_err());
        assert!(courier_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_courier_room_receives_assigned_orders() {
        let registry = ConnectionRegistry::new();
        let hub = FanoutHub::new(registry.clone());
        let (courier, mut rx) = registry.connect("courier", "t9", 8);
        courier.join(Room::Courier("k1".into()));

        hub.deliver(&OrderEvent::updated(&order(Some("k1")))).unwrap();
        assert_eq!(rx.try_recv().unwrap().name, "orderUpdated");

        hub.deliver(&OrderEvent::new_order(&order(None))).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_and_closed_queues_never_block() {
        let registry = ConnectionRegistry::new();
        let hub = FanoutHub::new(registry.clone());
        let (_slow, _slow_rx) = registry.connect("slow", "t1", 1);
        let (_gone, gone_rx) = registry.connect("gone", "t1", 8);
        drop(gone_rx);

        let event = OrderEvent::new_order(&order(None));
        let first = hub.deliver(&event).unwrap();
        assert_eq!(first, FanoutStats { delivered: 1, dropped: 0, closed: 1 });

        let second = hub.deliver(&event).unwrap();
        assert_eq!(second, FanoutStats { delivered: 0, dropped: 1, closed: 1 });
    }
}
