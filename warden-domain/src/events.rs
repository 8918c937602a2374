//! Domain Events for Warden
//!
//! Events are immutable records of what the engine decided or observed.
//! They are emitted alongside order actions and serialized by the daemon
//! for audit output.

use crate::entities::{ExitReason, OrderId, OrderRole};
use crate::value_objects::{OrderSide, Side, Symbol};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Why a stop was moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMoveReason {
    /// Break-even threshold reached
    Breakeven,
    /// Trailing rule advanced the stop
    Trailing,
}

/// Why an intended order was not sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Entry volume rounded to zero or fell below the minimum
    ZeroVolume,
    /// Exposure cap left nothing to grant
    ExposureCap,
}

/// Domain events for the position lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Position went from flat to open and protective levels were armed
    PositionOpened {
        /// Instrument
        symbol: Symbol,
        /// Position direction
        side: Side,
        /// Absolute volume held
        volume: Decimal,
        /// Average entry price
        entry_price: Decimal,
        /// Initial stop
        stop_price: Option<Decimal>,
        /// Initial target
        take_price: Option<Decimal>,
        /// When the position opened
        timestamp: DateTime<Utc>,
    },

    /// A fill was applied to the position tracker
    FillApplied {
        /// Instrument
        symbol: Symbol,
        /// Order that filled
        order_id: OrderId,
        /// Order direction
        side: OrderSide,
        /// Fill price
        price: Decimal,
        /// Fill volume
        volume: Decimal,
        /// Signed net volume after the fill
        net_volume: Decimal,
        /// When the fill was applied
        timestamp: DateTime<Utc>,
    },

    /// Stop moved by break-even or trailing
    StopMoved {
        /// Instrument
        symbol: Symbol,
        /// Stop before the move
        previous_stop: Option<Decimal>,
        /// Stop after the move
        new_stop: Decimal,
        /// What moved it
        reason: StopMoveReason,
        /// When the stop moved
        timestamp: DateTime<Utc>,
    },

    /// Full exit triggered (stop, target, signal, reversal, unwind)
    ExitTriggered {
        /// Instrument
        symbol: Symbol,
        /// Exit reason
        reason: ExitReason,
        /// Crossed level or reference price
        level: Decimal,
        /// Volume to close
        volume: Decimal,
        /// When the exit was triggered
        timestamp: DateTime<Utc>,
    },

    /// Partial take-profit tier fired
    TierHit {
        /// Instrument
        symbol: Symbol,
        /// Tier index
        index: usize,
        /// Tier trigger price
        trigger_price: Decimal,
        /// Volume to close
        volume: Decimal,
        /// When the tier fired
        timestamp: DateTime<Utc>,
    },

    /// Position returned to flat
    PositionClosed {
        /// Instrument
        symbol: Symbol,
        /// Direction of the closed position
        side: Side,
        /// Price of the flattening fill
        exit_price: Decimal,
        /// Realized PnL of the whole cycle
        realized_pnl: Decimal,
        /// Sizing multiplier for the next entry
        next_multiplier: Decimal,
        /// When the position closed
        timestamp: DateTime<Utc>,
    },

    /// Gateway rejected an order; the engine rolled back
    OrderRejected {
        /// Instrument
        symbol: Symbol,
        /// Rejected order
        order_id: OrderId,
        /// What the order was for
        role: OrderRole,
        /// When the rejection was processed
        timestamp: DateTime<Utc>,
    },

    /// Intended order skipped
    VolumeSkipped {
        /// Instrument
        symbol: Symbol,
        /// Why nothing was sent
        reason: SkipReason,
        /// When the order was skipped
        timestamp: DateTime<Utc>,
    },
}

impl Event {
    /// Get the symbol from any event
    pub fn symbol(&self) -> &Symbol {
        match self {
            Event::PositionOpened { symbol, .. }
            | Event::FillApplied { symbol, .. }
            | Event::StopMoved { symbol, .. }
            | Event::ExitTriggered { symbol, .. }
            | Event::TierHit { symbol, .. }
            | Event::PositionClosed { symbol, .. }
            | Event::OrderRejected { symbol, .. }
            | Event::VolumeSkipped { symbol, .. } => symbol,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::PositionOpened { timestamp, .. }
            | Event::FillApplied { timestamp, .. }
            | Event::StopMoved { timestamp, .. }
            | Event::ExitTriggered { timestamp, .. }
            | Event::TierHit { timestamp, .. }
            | Event::PositionClosed { timestamp, .. }
            | Event::OrderRejected { timestamp, .. }
            | Event::VolumeSkipped { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::PositionOpened { .. } => "position_opened",
            Event::FillApplied { .. } => "fill_applied",
            Event::StopMoved { .. } => "stop_moved",
            Event::ExitTriggered { .. } => "exit_triggered",
            Event::TierHit { .. } => "tier_hit",
            Event::PositionClosed { .. } => "position_closed",
            Event::OrderRejected { .. } => "order_rejected",
            Event::VolumeSkipped { .. } => "volume_skipped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn ts() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn symbol() -> Symbol {
        Symbol::new("BTCUSDT").unwrap()
    }

    #[test]
    fn test_event_serialization_position_closed() {
        let event = Event::PositionClosed {
            symbol: symbol(),
            side: Side::Long,
            exit_price: dec!(95),
            realized_pnl: dec!(-5),
            next_multiplier: dec!(2),
            timestamp: ts(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(event, deserialized);
        assert_eq!(deserialized.event_type(), "position_closed");
    }

    #[test]
    fn test_event_json_format() {
        let event = Event::StopMoved {
            symbol: symbol(),
            previous_stop: Some(dec!(95)),
            new_stop: dec!(101),
            reason: StopMoveReason::Breakeven,
            timestamp: ts(),
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "stop_moved");
        assert_eq!(json["reason"], "breakeven");
        assert_eq!(json["symbol"], "BTCUSDT");
    }

    #[test]
    fn test_rejection_carries_role() {
        let event = Event::OrderRejected {
            symbol: symbol(),
            order_id: Uuid::nil(),
            role: OrderRole::Tier { index: 1 },
            timestamp: ts(),
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["role"]["role"], "tier");
        assert_eq!(event.symbol().as_str(), "BTCUSDT");
        assert_eq!(event.timestamp(), ts());
    }
}
