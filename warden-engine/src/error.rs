//! Engine error types.

use thiserror::Error;
use warden_domain::{DomainError, LegId};

/// Errors raised while building or configuring an engine.
///
/// Steady-state event handlers return decisions, not errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Domain validation error
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Risk settings are inconsistent
    #[error("Invalid risk settings: {0}")]
    InvalidSettings(String),

    /// Leg is not registered with the exposure coordinator
    #[error("Unknown leg: {0}")]
    UnknownLeg(LegId),

    /// Leg id registered twice
    #[error("Duplicate leg: {0}")]
    DuplicateLeg(LegId),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
