//! Execution layer error types.

use thiserror::Error;
use warden_domain::OrderId;

/// Errors that can occur during execution operations.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Gateway communication error
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Order was rejected by the gateway
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// Cancel request failed; the order may still be live
    #[error("Cancel failed for {order_id}: {reason}")]
    CancelFailed {
        /// Order that could not be cancelled
        order_id: OrderId,
        /// Gateway explanation
        reason: String,
    },

    /// Intent journal error
    #[error("Intent journal error: {0}")]
    IntentJournal(String),

    /// Intent already processed (idempotency check)
    #[error("Intent already processed: {0}")]
    AlreadyProcessed(OrderId),
}

/// Result type for execution operations.
pub type ExecResult<T> = Result<T, ExecError>;
