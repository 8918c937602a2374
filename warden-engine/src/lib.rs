//! Warden Engine Layer
//!
//! Pure decision logic, deterministic, no I/O.
//! Takes input → Returns actions to execute.
//!
//! - [`Engine`]: single-instrument position lifecycle, protective exits,
//!   martingale sizing
//! - [`ExposureCoordinator`]: per-direction volume cap across legs

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod engine;
pub mod error;
pub mod exposure;
pub mod orders;
pub mod settings;

pub use engine::{Engine, EngineAction, EngineDecision};
pub use error::{EngineError, EngineResult};
pub use exposure::{ExposureCoordinator, Leg};
pub use orders::OrderBook;
pub use settings::{ProtectionMode, RiskSettings, SizingMode};
