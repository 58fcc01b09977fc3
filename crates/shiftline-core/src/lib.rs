//! # shiftline-core: Pure Business Logic for Shiftline
//!
//! Everything that decides *what* happens to an order, a shift or a courier
//! lives here as plain functions over plain data. Persistence and event
//! delivery live in `shiftline-db` and `shiftline-notify`; the engine crate
//! glues them together inside transactions.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Shiftline Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Request handlers (HTTP / socket, external)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Principal + request                    │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    shiftline-engine                              │   │
//! │  │   OrderLifecycle  CourierDispatch  Settlement  ShiftReconciler   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ shiftline-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌──────────┐ │   │
//! │  │   │  types  │ │ status  │ │ pricing │ │ ledger  │ │principal │ │   │
//! │  │   │ Order   │ │  FSM    │ │ totals  │ │ credits │ │  roles   │ │   │
//! │  │   │ Shift   │ │ guards  │ │  fees   │ │ buckets │ │  perms   │ │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └──────────┘ │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Order, Shift, Cashbox, Courier, catalog)
//! - [`status`] - Order and payment state machines
//! - [`pricing`] - Line pricing and order totals
//! - [`ledger`] - Ledger credits and bucket arithmetic
//! - [`principal`] - Roles, permissions and branch scoping
//! - [`money`] - Integer money
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use shiftline_core::money::Money;
//! use shiftline_core::pricing::OrderTotals;
//! use shiftline_core::OrderType;
//!
//! let totals = OrderTotals::new(
//!     OrderType::Delivery,
//!     Money::from_cents(4000),
//!     Money::from_cents(1500),
//! );
//! assert_eq!(totals.grand_total.cents(), 5500);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod money;
pub mod pricing;
pub mod principal;
pub mod status;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::LedgerCredit;
pub use money::Money;
pub use principal::{Permission, Principal, Role};
pub use status::{OrderStatus, PaymentStatus};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of lines on a single order.
pub const MAX_ORDER_LINES: usize = 100;

/// Maximum quantity of a single line.
///
/// Guards against keying mistakes (1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Name of the per-shift counter that issues order numbers.
pub const ORDER_NUMBER_COUNTER: &str = "orderNumber";
