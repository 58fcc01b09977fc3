//! # Error Types
//!
//! Domain-specific error types for shiftline-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  shiftline-core errors (this file)                                     │
//! │  ├── CoreError        - Business rule violations                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  shiftline-db errors                                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  shiftline-engine errors                                               │
//! │  └── EngineError      - What callers see (code + message)              │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError ← DbError             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    /// No OPEN shift (or no shift with the given id) in scope.
    #[error("Shift not found: {0}")]
    ShiftNotFound(String),

    #[error("Courier not found: {0}")]
    CourierNotFound(String),

    /// A batch operation found nothing it was allowed to touch.
    ///
    /// ## When This Occurs
    /// - assign: none of the orders is a DELIVERY order in NEW/PREPARING/READY
    /// - unassign: none of the orders is DELIVERING
    #[error("No eligible orders to {action}")]
    NoEligibleOrders { action: String },

    /// Status change not present in the transition table.
    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: String,
        from: String,
        to: String,
    },

    /// Payment status change not present in the payment table.
    #[error("Order {order_id} payment cannot move from {from} to {to}")]
    InvalidPaymentTransition {
        order_id: String,
        from: String,
        to: String,
    },

    /// Transition exists but the order does not satisfy its guard.
    #[error("Order {order_id} cannot enter {to}: {reason}")]
    GuardFailed {
        order_id: String,
        to: String,
        reason: String,
    },

    /// Items or fee changed after payment.
    #[error("Order {order_id} is paid; items and fees are frozen")]
    OrderLocked { order_id: String },

    /// DELIVERY orders are only paid by settle or collect, which credit a
    /// cashbox in the same transaction.
    #[error("Order {order_id} can only be paid through settlement")]
    SettlementRequired { order_id: String },

    #[error("Role {role} is not permitted to {action}")]
    Unauthorized { role: String, action: String },

    /// Shift close attempted while a delivery is still unpaid.
    ///
    /// ## User Workflow
    /// ```text
    /// Admin: close shift
    ///      │
    ///      ▼
    /// Order #12 (DELIVERY, UNPAID) still in shift
    ///      │
    ///      ▼
    /// UnsettledDelivery { order_number: 12, .. }
    ///      │
    ///      ▼
    /// UI: "Settle order #12 before closing the shift"
    /// ```
    #[error("Delivery order #{order_number} ({order_id}) is not settled")]
    UnsettledDelivery { order_id: String, order_number: i64 },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Builds an [`CoreError::Unauthorized`] from a role and action name.
    pub fn unauthorized(role: impl ToString, action: impl Into<String>) -> Self {
        CoreError::Unauthorized {
            role: role.to_string(),
            action: action.into(),
        }
    }

    /// Returns `true` for the "missing entity" family of errors.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::ProductNotFound(_)
                | CoreError::CustomerNotFound(_)
                | CoreError::ZoneNotFound(_)
                | CoreError::OrderNotFound(_)
                | CoreError::ShiftNotFound(_)
                | CoreError::CourierNotFound(_)
                | CoreError::NoEligibleOrders { .. }
        )
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any state is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Collection has too many entries.
    #[error("{field} cannot have more than {max} entries")]
    TooMany { field: String, max: usize },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Field cannot be used in this context.
    #[error("{field} is not applicable: {reason}")]
    NotApplicable { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
