//! # shiftline-notify: Order Event Fanout
//!
//! Best-effort broadcast of order lifecycle events to live observers.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    EventBus (bus.rs)                             │  │
//! │  │  publish(&OrderEvent) after commit; logs sink failures           │  │
//! │  └───────────────┬──────────────────────────────┬───────────────────┘  │
//! │                  ▼                              ▼                       │
//! │  ┌────────────────────────────┐   ┌────────────────────────────────┐   │
//! │  │   FanoutHub (hub.rs)       │   │  RedisPublisher (mirror.rs)    │   │
//! │  │   bounded mpsc per conn,   │   │  <prefix>:orders:<tenant>      │   │
//! │  │   try_send, never blocks   │   │  spawned, fire-and-forget      │   │
//! │  └─────────────┬──────────────┘   └────────────────────────────────┘   │
//! │                ▼                                                        │
//! │  ┌────────────────────────────┐                                        │
//! │  │ ConnectionRegistry         │                                        │
//! │  │ (registry.rs, DashMap)     │                                        │
//! │  │ rooms: tenant/branch/courier                                        │
//! │  └────────────────────────────┘                                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`bus`] - `EventSink` trait and `EventBus`
//! - [`event`] - `OrderEvent` payload and routing rooms
//! - [`hub`] - In-process fanout
//! - [`mirror`] - Redis pub/sub mirror
//! - [`registry`] - Live connection registry
//! - [`error`] - Notify error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod bus;
pub mod error;
pub mod event;
pub mod hub;
pub mod mirror;
pub mod registry;

// =============================================================================
// Re-exports
// =============================================================================

pub use bus::{EventBus, EventSink};
pub use error::{NotifyError, NotifyResult};
pub use event::{OrderEvent, OrderEventType, Room};
pub use hub::{FanoutHub, FanoutStats};
pub use mirror::RedisPublisher;
pub use registry::{ConnectionHandle, ConnectionRegistry, Delivery};
