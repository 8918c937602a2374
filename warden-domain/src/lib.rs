//! Warden Domain Layer
//!
//! Pure position-risk logic with zero I/O dependencies: position tracking,
//! protective levels, trailing rules and volume sizing.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod events;
pub mod market_data;
pub mod protective;
pub mod sizing;
pub mod tracker;
pub mod trailing;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{
    ExitReason, LegId, LifecycleState, Order, OrderId, OrderRequest, OrderRole, OrderStatus,
    OrderType, OrderUpdate, ProtectiveKind, SignalIntent, UpdateStatus,
};
pub use events::{Event, SkipReason, StopMoveReason};
pub use market_data::{Candle, Quote};
pub use protective::{
    BreakevenConfig, ExitPriority, ExitSignal, ProtectiveConfig, ProtectiveLevels, Tier,
    TierConfig, TierExit, TrailingConfig,
};
pub use sizing::{SizingConfig, SizingPolicy, SizingState};
pub use tracker::{ClosedCycle, FillOutcome, PositionTracker};
pub use trailing::TrailingStopUpdate;
pub use value_objects::{
    Distance, DomainError, InstrumentSpec, OrderSide, Price, Side, Symbol, Volume,
};
