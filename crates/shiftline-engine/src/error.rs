//! # Engine Error Type
//!
//! The single error type every engine operation returns.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Shiftline                              │
//! │                                                                         │
//! │  ValidationError ──► CoreError ──┐                                      │
//! │                                  ├──► EngineError ──► ErrorBody         │
//! │  sqlx::Error ──► DbError ────────┘        │           { code, message } │
//! │                                           │                             │
//! │                      is_transient()? ─────┤                             │
//! │                         yes: RetryPolicy rolls back and runs again      │
//! │                         no:  returned to the caller                     │
//! │                                                                         │
//! │  Storage failures are logged with the real cause and surface with a     │
//! │  generic message; nothing internal leaks to the caller.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Serialization
//! ```json
//! {
//!   "code": "CONFLICT",
//!   "message": "Order #12 is an unsettled delivery"
//! }
//! ```

use serde::Serialize;
use shiftline_core::{CoreError, ValidationError};
use shiftline_db::DbError;
use thiserror::Error;

use crate::config::ConfigError;

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Input validation failed (400)
    ValidationError,

    /// Resource not found, or nothing eligible for the action (404)
    NotFound,

    /// Role not permitted (403)
    Unauthorized,

    /// Business rule conflict: FSM, paid lock, unsettled deliveries (409)
    Conflict,

    /// Store stayed busy past the retry budget (503)
    Unavailable,

    /// Storage failure (500)
    DatabaseError,

    /// Configuration could not be loaded
    ConfigError,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    /// `order_id` / `order_number` name the offending order when there is one.
    #[error("{message}")]
    Conflict {
        message: String,
        order_id: Option<String>,
        order_number: Option<i64>,
    },

    /// Lock contention or a lost compare-and-set.
    #[error("{0}")]
    Transient(String),

    #[error("{0}")]
    Transaction(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Serializable `{ code, message }` pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl EngineError {
    pub fn conflict(message: impl Into<String>) -> Self {
        EngineError::Conflict {
            message: message.into(),
            order_id: None,
            order_number: None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Validation(_) => ErrorCode::ValidationError,
            EngineError::NotFound(_) => ErrorCode::NotFound,
            EngineError::Unauthorized(_) => ErrorCode::Unauthorized,
            EngineError::Conflict { .. } => ErrorCode::Conflict,
            EngineError::Transient(_) => ErrorCode::Unavailable,
            EngineError::Transaction(_) => ErrorCode::DatabaseError,
            EngineError::Config(_) => ErrorCode::ConfigError,
        }
    }

    /// Whether the whole operation may be rolled back and run again.
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Validation(err.to_string())
    }
}

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => EngineError::Validation(e.to_string()),
            CoreError::Unauthorized { .. } => EngineError::Unauthorized(err.to_string()),
            CoreError::UnsettledDelivery {
                ref order_id,
                order_number,
            } => EngineError::Conflict {
                order_id: Some(order_id.clone()),
                order_number: Some(order_number),
                message: err.to_string(),
            },
            CoreError::InvalidTransition { ref order_id, .. }
            | CoreError::InvalidPaymentTransition { ref order_id, .. }
            | CoreError::GuardFailed { ref order_id, .. }
            | CoreError::OrderLocked { ref order_id }
            | CoreError::SettlementRequired { ref order_id } => EngineError::Conflict {
                order_id: Some(order_id.clone()),
                order_number: None,
                message: err.to_string(),
            },
            // Every remaining variant names something missing
            _ => EngineError::NotFound(err.to_string()),
        }
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => {
                EngineError::NotFound(format!("{} not found: {}", entity, id))
            }
            DbError::UniqueViolation { field, .. } => {
                // Only reachable through a bug in number issuance or ids
                tracing::error!(field = %field, "Unique constraint violated");
                EngineError::Transaction("Database transaction failed".to_string())
            }
            DbError::ForeignKeyViolation { message } => {
                tracing::error!("Foreign key violation: {}", message);
                EngineError::Validation("Invalid reference".to_string())
            }
            DbError::ConnectionFailed(e) => {
                tracing::error!("Database connection failed: {}", e);
                EngineError::Transaction("Database connection failed".to_string())
            }
            DbError::MigrationFailed(e) => {
                tracing::error!("Database migration failed: {}", e);
                EngineError::Transaction("Database migration failed".to_string())
            }
            DbError::QueryFailed(e) | DbError::Internal(e) => {
                tracing::error!("Database operation failed: {}", e);
                EngineError::Transaction("Database operation failed".to_string())
            }
            DbError::Busy(_) | DbError::VersionConflict { .. } | DbError::PoolExhausted => {
                EngineError::Transient(err.to_string())
            }
        }
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        DbError::from(err).into()
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_map_to_codes() {
        let missing: EngineError = CoreError::CourierNotFound("k9".into()).into();
        assert_eq!(missing.code(), ErrorCode::NotFound);

        let denied: EngineError = CoreError::unauthorized("DELIVERY", "close shifts").into();
        assert_eq!(denied.code(), ErrorCode::Unauthorized);

        let locked: EngineError = CoreError::OrderLocked {
            order_id: "o1".into(),
        }
        .into();
        assert_eq!(locked.code(), ErrorCode::Conflict);

        let invalid: EngineError = ValidationError::Required {
            field: "items".into(),
        }
        .into();
        assert_eq!(invalid.code(), ErrorCode::ValidationError);
    }

    #[test]
    fn test_unsettled_delivery_carries_order() {
        let err: EngineError = CoreError::UnsettledDelivery {
            order_id: "o7".into(),
            order_number: 7,
        }
        .into();

        match err {
            EngineError::Conflict {
                order_id,
                order_number,
                ..
            } => {
                assert_eq!(order_id.as_deref(), Some("o7"));
                assert_eq!(order_number, Some(7));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_db_errors_hide_internals() {
        let busy: EngineError = DbError::Busy("database is locked".into()).into();
        assert!(busy.is_transient());
        assert_eq!(busy.code(), ErrorCode::Unavailable);

        let failed: EngineError = DbError::QueryFailed("no such column: foo".into()).into();
        assert_eq!(failed.code(), ErrorCode::DatabaseError);
        assert!(!failed.to_string().contains("foo"));
    }

    #[test]
    fn test_body_serializes_code() {
        let body = EngineError::conflict("nope").body();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["code"], "CONFLICT");
        assert_eq!(json["message"], "nope");
    }
}
