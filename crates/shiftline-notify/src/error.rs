//! # Notify Error Types
//!
//! Errors raised while encoding or forwarding an order event. None of them
//! ever reaches the operation that produced the event: the [`EventBus`]
//! logs and drops them.
//!
//! [`EventBus`]: crate::bus::EventBus

use thiserror::Error;

/// Result type alias for notify operations.
pub type NotifyResult<T> = Result<T, NotifyError>;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// Event could not be encoded as JSON.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Redis client or connection failure.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Publishing requires a running Tokio runtime.
    #[error("No async runtime available to publish on")]
    NoRuntime,
}
