//! Warden Daemon Library
//!
//! Runtime wiring for the Warden position risk engine.
//!
//! # Architecture
//!
//! ```text
//! NDJSON inputs → StrategyRunner → Engine → Executor → Gateway
//!                       ↑                                  │
//!                       └────────── order updates ─────────┘
//!                       │
//!                   Event Bus (emitted events)
//! ```
//!
//! # Components
//!
//! - **Strategy Runner**: Single owner of an engine, serializes its inputs
//! - **Event Bus**: Fan-out of the domain events the engine emits
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use warden_engine::Engine;
//! use warden_exec::{Executor, IntentJournal, StubGateway};
//! use wardend::{Config, EventBus, StrategyRunner};
//!
//! let config = Config::from_env()?;
//! let (gateway, updates) = StubGateway::with_updates(config.stub.fill_price);
//! let executor = Executor::new(Arc::new(gateway), Arc::new(IntentJournal::new()));
//! let engine = Engine::new(config.symbol.clone(), config.risk.clone())?;
//! let runner = StrategyRunner::new(engine, executor, updates, Arc::new(EventBus::default()));
//! let engine = runner.run(inputs).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod event_bus;
pub mod runner;

// Re-exports for convenience
pub use config::{parse_tiers, Config, Environment, StubConfig};
pub use error::{DaemonError, DaemonResult};
pub use event_bus::{DaemonEvent, EventBus, EventReceiver};
pub use runner::StrategyRunner;
