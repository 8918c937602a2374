//! Domain Entities for Warden
//!
//! Orders with an explicit lifecycle, gateway notifications, and the
//! per-position lifecycle state machine.

use crate::value_objects::{DomainError, OrderSide, Price, Side, Symbol, Volume};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier for an Order (also used as the client order id)
pub type OrderId = Uuid;

/// Identifier of one leg in a multi-instrument position
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LegId(String);

impl LegId {
    /// Create a leg identifier
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LegId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for LegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Signals
// =============================================================================

/// Output of the external signal evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalIntent {
    /// Open (or reverse into) a long position
    EnterLong,
    /// Open (or reverse into) a short position
    EnterShort,
    /// Close whatever is open
    Exit,
    /// Nothing to do this cycle
    None,
}

impl SignalIntent {
    /// Side requested by an entry intent
    pub fn entry_side(&self) -> Option<Side> {
        match self {
            SignalIntent::EnterLong => Some(Side::Long),
            SignalIntent::EnterShort => Some(Side::Short),
            SignalIntent::Exit | SignalIntent::None => None,
        }
    }
}

// =============================================================================
// Exit reasons
// =============================================================================

/// Why a position (or part of it) is being closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Stop-loss level crossed (including a stop moved by break-even)
    StopLoss,
    /// Trailing stop crossed
    TrailingStop,
    /// Take-profit level crossed
    TakeProfit,
    /// Signal evaluator requested an exit
    Signal,
    /// Reversal order flattening before re-entry
    Reversal,
}

/// Kind of resting protective order kept at the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectiveKind {
    /// Stop order guarding the loss side
    Stop,
    /// Limit order at the take-profit level
    Take,
}

// =============================================================================
// Position lifecycle
// =============================================================================

/// Per-position lifecycle state machine
///
/// ```text
/// Flat → Opening → Open → [PartialExit]* → Closing → Flat
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LifecycleState {
    /// No position, no order in flight
    Flat,
    /// Entry (or reversal) order submitted, waiting for fill
    Opening {
        /// Entry order
        order_id: OrderId,
    },
    /// Position open, protective levels armed
    Open,
    /// Tier order submitted, waiting for fill
    PartialExit {
        /// Tier order
        order_id: OrderId,
        /// Tier index
        tier: usize,
    },
    /// Full exit order submitted, waiting for fill
    Closing {
        /// Exit order
        order_id: OrderId,
        /// Why the position is closing
        reason: ExitReason,
    },
}

impl LifecycleState {
    /// Get the name of the state for display
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Flat => "flat",
            LifecycleState::Opening { .. } => "opening",
            LifecycleState::Open => "open",
            LifecycleState::PartialExit { .. } => "partial_exit",
            LifecycleState::Closing { .. } => "closing",
        }
    }

    /// Order currently driving a transition, if any
    pub fn pending_order(&self) -> Option<OrderId> {
        match self {
            LifecycleState::Opening { order_id }
            | LifecycleState::PartialExit { order_id, .. }
            | LifecycleState::Closing { order_id, .. } => Some(*order_id),
            LifecycleState::Flat | LifecycleState::Open => None,
        }
    }
}

// =============================================================================
// Order
// =============================================================================

/// Order types supported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Market order (immediate execution)
    Market,
    /// Limit order (price guaranteed)
    Limit,
    /// Stop order (becomes market when the stop price trades)
    Stop,
}

/// Order status lifecycle
///
/// Replaces "is the order reference null / active / done" checks with
/// explicit states, so "never placed" and "finished" cannot be confused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created locally, not acknowledged yet
    Pending,
    /// Acknowledged by the gateway (resting or partially filled)
    Active,
    /// Completely filled
    Filled,
    /// Cancelled (locally assumed or confirmed)
    Cancelled,
    /// Rejected by the gateway
    Rejected,
}

impl OrderStatus {
    /// True for Filled, Cancelled and Rejected
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected)
    }

    /// True while the order can still fill
    pub fn is_live(&self) -> bool {
        !self.is_terminal()
    }
}

/// What an order is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum OrderRole {
    /// Opens a position from flat
    Entry,
    /// Flattens the current position and opens the opposite one
    Reversal,
    /// Closes the whole position
    Exit {
        /// Exit reason
        reason: ExitReason,
    },
    /// Partial close for a take-profit tier
    Tier {
        /// Tier index
        index: usize,
    },
    /// Resting protective order
    Protective {
        /// Stop or take
        kind: ProtectiveKind,
    },
}

impl OrderRole {
    /// Orders that may only shrink the position, never open or flip it
    pub fn is_reduce_only(&self) -> bool {
        matches!(self, OrderRole::Exit { .. } | OrderRole::Tier { .. } | OrderRole::Protective { .. })
    }
}

/// Order request as sent to the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Instrument
    pub symbol: Symbol,
    /// Buy or sell
    pub side: OrderSide,
    /// Order volume
    pub volume: Volume,
    /// Market, limit or stop
    pub order_type: OrderType,
    /// Limit/stop price (None for market orders)
    pub price: Option<Price>,
}

impl OrderRequest {
    /// Market order request
    pub fn market(symbol: Symbol, side: OrderSide, volume: Volume) -> Self {
        Self {
            symbol,
            side,
            volume,
            order_type: OrderType::Market,
            price: None,
        }
    }
}

/// Order tracked by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Engine-assigned id, sent as client order id
    pub id: OrderId,
    /// Instrument
    pub symbol: Symbol,
    /// Buy or sell
    pub side: OrderSide,
    /// Market, limit or stop
    pub order_type: OrderType,
    /// Requested volume
    pub volume: Volume,
    /// Limit/stop price
    pub price: Option<Price>,
    /// Purpose of the order
    pub role: OrderRole,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Volume filled so far
    pub filled_volume: Decimal,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Create a new pending order from a request
    pub fn new(request: OrderRequest, role: OrderRole) -> Self {
        Self {
            id: Uuid::now_v7(),
            symbol: request.symbol,
            side: request.side,
            order_type: request.order_type,
            volume: request.volume,
            price: request.price,
            role,
            status: OrderStatus::Pending,
            filled_volume: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }

    /// Create a new pending market order
    pub fn market(symbol: Symbol, side: OrderSide, volume: Volume, role: OrderRole) -> Self {
        Self::new(OrderRequest::market(symbol, side, volume), role)
    }

    /// Rebuild the gateway request for this order
    pub fn request(&self) -> OrderRequest {
        OrderRequest {
            symbol: self.symbol.clone(),
            side: self.side,
            volume: self.volume,
            order_type: self.order_type,
            price: self.price,
        }
    }

    /// Volume not filled yet
    pub fn remaining_volume(&self) -> Decimal {
        (self.volume.as_decimal() - self.filled_volume).max(Decimal::ZERO)
    }

    /// Record a fill
    ///
    /// # Errors
    /// Returns `DomainError::InvalidStateTransition` if the order is no longer live
    /// and was not merely assumed cancelled (late fills on locally cancelled
    /// orders are accepted so the position can be reconciled).
    pub fn record_fill(&mut self, volume: Decimal) -> Result<(), DomainError> {
        if matches!(self.status, OrderStatus::Filled | OrderStatus::Rejected) {
            return Err(DomainError::InvalidStateTransition(format!(
                "Cannot fill order {} in status {:?}",
                self.id, self.status
            )));
        }

        self.filled_volume += volume;
        self.status = if self.remaining_volume().is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::Active
        };
        Ok(())
    }
}

// =============================================================================
// Gateway notifications
// =============================================================================

/// Status reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    /// Order acknowledged and resting
    Accepted,
    /// Part of the order filled
    PartiallyFilled,
    /// Order completely filled
    Filled,
    /// Order cancelled
    Cancelled,
    /// Order rejected
    Rejected,
}

/// Fill/cancel/reject notification from the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderUpdate {
    /// Engine order id
    pub order_id: OrderId,
    /// Volume filled by this notification (zero for non-fill updates)
    pub filled_volume: Decimal,
    /// Price of this fill
    pub filled_price: Option<Decimal>,
    /// Reported status
    pub status: UpdateStatus,
}

impl OrderUpdate {
    /// Full or partial fill notification
    pub fn fill(order_id: OrderId, volume: Decimal, price: Decimal, complete: bool) -> Self {
        Self {
            order_id,
            filled_volume: volume,
            filled_price: Some(price),
            status: if complete { UpdateStatus::Filled } else { UpdateStatus::PartiallyFilled },
        }
    }

    /// Rejection notification
    pub fn rejected(order_id: OrderId) -> Self {
        Self {
            order_id,
            filled_volume: Decimal::ZERO,
            filled_price: None,
            status: UpdateStatus::Rejected,
        }
    }

    /// Cancellation notification
    pub fn cancelled(order_id: OrderId) -> Self {
        Self {
            order_id,
            filled_volume: Decimal::ZERO,
            filled_price: None,
            status: UpdateStatus::Cancelled,
        }
    }

    /// Acknowledgement without fill
    pub fn accepted(order_id: OrderId) -> Self {
        Self {
            order_id,
            filled_volume: Decimal::ZERO,
            filled_price: None,
            status: UpdateStatus::Accepted,
        }
    }

    /// True when this update carries a usable fill
    pub fn has_fill(&self) -> bool {
        self.filled_volume > Decimal::ZERO && self.filled_price.is_some_and(|p| p > Decimal::ZERO)
    }
}

// =============================================================================
// Tests
// =============================================================================
