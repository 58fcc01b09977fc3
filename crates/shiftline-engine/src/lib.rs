//! # shiftline-engine: Transactional Operations for Shiftline
//!
//! Every operation a request handler can call, each one a single SQLite
//! transaction with role checks in front and event fanout behind.
//!
//! ## Operation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  handler ──► Engine::create_order(&principal, request)                  │
//! │                 │                                                       │
//! │                 ├── principal.authorize(Permission::CreateOrder)        │
//! │                 ├── validate input (no I/O)                             │
//! │                 │                                                       │
//! │                 ├── RetryPolicy::run ─────────────────────────────┐     │
//! │                 │     BEGIN                                       │     │
//! │                 │     shift / counter / order / ledger writes     │     │
//! │                 │     COMMIT          Transient? roll back, again ┘     │
//! │                 │                                                       │
//! │                 └── EventBus::publish(&OrderEvent)   (after commit)     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`lifecycle`] - Order creation, patching and reads
//! - [`dispatch`] - Courier assignment and the courier board
//! - [`settlement`] - Cash collection from couriers and delivery reports
//! - [`reconcile`] - Shift close and shift queries
//! - [`config`] - `EngineConfig` (TOML + environment)
//! - [`retry`] - Transient failure retry
//! - [`telemetry`] - Tracing subscriber setup
//! - [`error`] - `EngineError` and `ErrorCode`

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod reconcile;
pub mod retry;
pub mod settlement;
pub mod telemetry;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, EngineConfig};
pub use dispatch::{AssignResult, BusyCourier, CourierBoard, UnassignResult};
pub use error::{EngineError, EngineResult, ErrorBody, ErrorCode};
pub use lifecycle::{CreateOrderRequest, OrderPatch};
pub use reconcile::{OpenShift, ShiftSummary};
pub use retry::RetryPolicy;
pub use settlement::{CollectResult, CourierContact, DeliveryReport, ReportLine};

use shiftline_core::{Order, Principal};
use shiftline_db::Database;
use shiftline_notify::{
    ConnectionHandle, ConnectionRegistry, Delivery, EventBus, EventSink, FanoutHub, OrderEvent,
    RedisPublisher, Room,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

const DEFAULT_QUEUE_CAPACITY: usize = 64;

// =============================================================================
// Engine
// =============================================================================

/// Cheap to clone; clones share the pool, the bus and the registry.
#[derive(Debug, Clone)]
pub struct Engine {
    pub(crate) db: Database,
    pub(crate) bus: EventBus,
    pub(crate) registry: ConnectionRegistry,
    pub(crate) retry: RetryPolicy,
    queue_capacity: usize,
}

impl Engine {
    /// An engine with no event sinks and the default retry policy.
    pub fn new(db: Database) -> Self {
        Engine {
            db,
            bus: EventBus::new(),
            registry: ConnectionRegistry::new(),
            retry: RetryPolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Opens the database and wires fanout as configured.
    ///
    /// A Redis mirror that cannot connect is logged and left out; live
    /// in-process fanout still works without it.
    pub async fn from_config(config: &EngineConfig) -> EngineResult<Self> {
        let db = Database::new(config.to_db_config()).await?;
        let mut engine = Engine::new(db)
            .with_retry(RetryPolicy::from(&config.retry))
            .with_live_fanout();
        engine.queue_capacity = config.fanout.queue_capacity;

        if let Some(url) = &config.fanout.redis_url {
            match RedisPublisher::connect(url, config.fanout.channel_prefix.clone()).await {
                Ok(publisher) => engine = engine.with_sink(Arc::new(publisher)),
                Err(e) => warn!(error = %e, "Redis mirror unavailable, continuing without it"),
            }
        }

        info!(sinks = engine.bus.sink_count(), "Engine ready");
        Ok(engine)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.bus = self.bus.with_sink(sink);
        self
    }

    /// Adds in-process fanout to this engine's connection registry.
    pub fn with_live_fanout(self) -> Self {
        let hub = FanoutHub::new(self.registry.clone());
        self.with_sink(Arc::new(hub))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Registers a live observer for the principal: tenant room always,
    /// branch room when the principal is tied to one branch.
    pub fn observe(&self, principal: &Principal) -> (ConnectionHandle, mpsc::Receiver<Delivery>) {
        let (handle, receiver) = self.registry.connect(
            principal.user_id.clone(),
            principal.tenant_id.clone(),
            self.queue_capacity,
        );
        if let Some(branch_id) = principal.branch_scope() {
            handle.join(Room::Branch(branch_id.to_string()));
        }
        (handle, receiver)
    }

    /// Users with a live connection in the principal's tenant.
    pub fn online_in_tenant(&self, principal: &Principal) -> Vec<String> {
        self.registry.online_in_tenant(&principal.tenant_id)
    }

    pub(crate) fn publish_updates(&self, orders: &[Order]) {
        for order in orders {
            self.bus.publish(&OrderEvent::updated(order));
        }
    }
}

// =============================================================================
// Scoping
// =============================================================================

/// Whether a row of `branch_id` is visible to the principal.
pub(crate) fn in_scope(principal: &Principal, branch_id: &str) -> bool {
    principal.branch_scope().map_or(true, |scope| scope == branch_id)
}

/// Branch filter for list reads: the principal's own branch, or for
/// tenant-wide principals the requested one (`None` = whole tenant).
pub(crate) fn read_branch<'a>(
    principal: &'a Principal,
    requested: Option<&'a str>,
) -> Option<&'a str> {
    match principal.branch_scope() {
        Some(branch_id) => Some(branch_id),
        None => requested.filter(|b| !b.trim().is_empty()),
    }
}
