//! # Event Bus
//!
//! The one publish call the engine makes after a transaction commits.
//!
//! ```text
//! engine: tx.commit() ──▶ bus.publish(&event)
//!                               │
//!                  for each sink: sink.publish(&event)
//!                               │
//!                  Err → warn!, continue with the next sink
//! ```
//!
//! `publish` has no error return: an observer missing an event only delays
//! what it sees, it never changes what was committed.

use std::sync::Arc;
use tracing::warn;

use crate::error::NotifyResult;
use crate::event::OrderEvent;

/// A destination for order events.
pub trait EventSink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Hands the event off without waiting on any observer.
    fn publish(&self, event: &OrderEvent) -> NotifyResult<()>;
}

#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventBus {
    /// A bus with no sinks; publishing is a no-op.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn publish(&self, event: &OrderEvent) {
        for sink in &self.sinks {
            if let Err(e) = sink.publish(event) {
                warn!(
                    sink = sink.name(),
                    order_id = %event.order.id,
                    error = %e,
                    "Event publish failed"
                );
            }
        }
    }

    pub fn publish_all<'a>(&self, events: impl IntoIterator<Item = &'a OrderEvent>) {
        for event in events {
            self.publish(event);
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.sinks.iter().map(|s| s.name()).collect();
        f.debug_struct("EventBus").field("sinks", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotifyError;
    use crate::event::tests::order;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing;

    impl EventSink for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn publish(&self, _event: &OrderEvent) -> NotifyResult<()> {
            Err(NotifyError::NoRuntime)
        }
    }

    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl EventSink for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn publish(&self, _event: &OrderEvent) -> NotifyResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_failing_sink_does_not_stop_others() {
        let counting = Arc::new(Counting::default());
        let bus = EventBus::new()
            .with_sink(Arc::new(Failing))
            .with_sink(counting.clone());

        let events = vec![
            OrderEvent::new_order(&order(None)),
            OrderEvent::updated(&order(Some("k1"))),
        ];
        bus.publish_all(&events);

        assert_eq!(counting.0.load(Ordering::SeqCst), 2);
        assert_eq!(bus.sink_count(), 2);
    }

    #[test]
    fn test_empty_bus() {
        EventBus::new().publish(&OrderEvent::new_order(&order(None)));
    }
}
