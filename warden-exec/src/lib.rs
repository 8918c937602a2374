//! Warden Execution Layer
//!
//! Idempotent order routing with intent journal.
//!
//! # Architecture
//!
//! ```text
//! Engine Decision → Executor → Intent Journal → Gateway → Result
//! ```
//!
//! # Components
//!
//! - **Ports**: The `OrderGateway` trait every venue adapter implements, and
//!   `MarketDataPort` for simulated venues
//! - **Intent Journal**: At-most-once submission per engine order id
//! - **Executor**: Runs engine actions in order, cancel before replace
//! - **Stub**: Gateway for tests and dry runs
//!
//! # Example
//!
//! ```rust,ignore
//! use warden_exec::{Executor, IntentJournal, StubGateway};
//! use std::sync::Arc;
//!
//! let (gateway, updates) = StubGateway::with_updates(dec!(95000));
//! let executor = Executor::new(Arc::new(gateway), Arc::new(IntentJournal::new()));
//!
//! let results = executor.execute(decision).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod executor;
pub mod intent;
pub mod ports;
pub mod stub;

// Re-exports for convenience
pub use error::{ExecError, ExecResult};
pub use executor::{ActionResult, Executor};
pub use intent::{Intent, IntentAction, IntentJournal, IntentResult, IntentStatus};
pub use ports::{GatewayAck, MarketDataPort, OrderGateway};
pub use stub::StubGateway;
