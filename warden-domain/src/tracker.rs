//! Position Tracker
//!
//! Net signed volume and volume-weighted average entry price of one
//! instrument (or one leg), updated on every fill.
//!
//! # Average price rules
//!
//! ```text
//! flat + fill            → avg = fill price
//! same-direction fill    → avg = (avg·|net| + price·vol) / (|net| + vol)
//! reducing fill          → avg unchanged, |net| shrinks
//! fill crossing zero     → excess opens a new position, avg = fill price
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::value_objects::{OrderSide, Side};

/// Result of a position cycle that returned to flat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedCycle {
    /// Direction of the position that closed
    pub side: Side,
    /// Realized PnL accumulated over the whole flat→flat cycle
    pub realized_pnl: Decimal,
    /// Price of the fill that flattened the position
    pub exit_price: Decimal,
}

/// What a single fill did to the position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillOutcome {
    /// Side of a position opened by this fill (from flat or via a flip)
    pub opened: Option<Side>,
    /// Cycle closed by this fill
    pub closed: Option<ClosedCycle>,
    /// PnL realized by this fill alone
    pub realized_pnl: Decimal,
    /// Fill was ignored (non-positive volume or price)
    pub ignored: bool,
}

impl FillOutcome {
    /// The fill crossed through zero
    pub fn flipped(&self) -> bool {
        self.closed.is_some() && self.opened.is_some()
    }
}

/// Net position of one instrument
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionTracker {
    net_volume: Decimal,
    average_price: Option<Decimal>,
    cycle_realized_pnl: Decimal,
}

impl PositionTracker {
    /// Create a flat tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Signed net volume (positive long, negative short)
    pub fn net_volume(&self) -> Decimal {
        self.net_volume
    }

    /// Absolute position size
    pub fn abs_volume(&self) -> Decimal {
        self.net_volume.abs()
    }

    /// Average entry price, `None` while flat
    pub fn average_price(&self) -> Option<Decimal> {
        self.average_price
    }

    /// Direction, `None` while flat
    pub fn side(&self) -> Option<Side> {
        Side::from_signed(self.net_volume)
    }

    /// True when no position is held
    pub fn is_flat(&self) -> bool {
        self.net_volume.is_zero()
    }

    /// PnL realized since the position last left flat
    pub fn cycle_realized_pnl(&self) -> Decimal {
        self.cycle_realized_pnl
    }

    /// Unrealized PnL at `current_price`, positive for a favorable move
    pub fn unrealized_pnl(&self, current_price: Decimal) -> Decimal {
        match self.average_price {
            Some(avg) => self.net_volume * (current_price - avg),
            None => Decimal::ZERO,
        }
    }

    /// Apply a fill
    ///
    /// Non-positive volumes or prices are ignored; callers are expected to
    /// filter them out before they get here.
    pub fn on_fill(&mut self, side: OrderSide, fill_price: Decimal, fill_volume: Decimal) -> FillOutcome {
        if fill_volume <= Decimal::ZERO || fill_price <= Decimal::ZERO {
            return FillOutcome {
                ignored: true,
                ..FillOutcome::default()
            };
        }

        let fill_direction = side.opens();

        let (current, average) = match (self.side(), self.average_price) {
            (Some(current), Some(average)) => (current, average),
            _ => {
                self.open(fill_direction, fill_price, fill_volume);
                return FillOutcome {
                    opened: Some(fill_direction),
                    ..FillOutcome::default()
                };
            },
        };

        if current == fill_direction {
            let held = self.net_volume.abs();
            let total = held + fill_volume;
            self.average_price = Some((average * held + fill_price * fill_volume) / total);
            self.net_volume += side.signed(fill_volume);
            return FillOutcome::default();
        }

        // Reducing (and possibly flipping)
        let held = self.net_volume.abs();
        let closing = fill_volume.min(held);
        let realized = (fill_price - average) * closing * current.sign();
        self.cycle_realized_pnl += realized;

        if closing < held {
            self.net_volume += side.signed(closing);
            return FillOutcome {
                realized_pnl: realized,
                ..FillOutcome::default()
            };
        }

        let closed = ClosedCycle {
            side: current,
            realized_pnl: self.cycle_realized_pnl,
            exit_price: fill_price,
        };
        *self = Self::default();

        let excess = fill_volume - closing;
        let opened = if excess > Decimal::ZERO {
            self.open(fill_direction, fill_price, excess);
            Some(fill_direction)
        } else {
            None
        };

        FillOutcome {
            opened,
            closed: Some(closed),
            realized_pnl: realized,
            ignored: false,
        }
    }

    fn open(&mut self, side: Side, price: Decimal, volume: Decimal) {
        self.net_volume = side.sign() * volume;
        self.average_price = Some(price);
        self.cycle_realized_pnl = Decimal::ZERO;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_open_from_flat() {
        let mut tracker = PositionTracker::new();
        let outcome = tracker.on_fill(OrderSide::Buy, dec!(100), dec!(1));

        assert_eq!(outcome.opened, Some(Side::Long));
        assert_eq!(tracker.net_volume(), dec!(1));
        assert_eq!(tracker.average_price(), Some(dec!(100)));
    }

    #[test]
    fn test_same_direction_weighted_average() {
        let mut tracker = PositionTracker::new();
        tracker.on_fill(OrderSide::Sell, dec!(100), dec!(1));
        tracker.on_fill(OrderSide::Sell, dec!(106), dec!(2));

        assert_eq!(tracker.net_volume(), dec!(-3));
        // (100·1 + 106·2) / 3 = 104
        assert_eq!(tracker.average_price(), Some(dec!(104)));
    }

    #[test]
    fn test_reduce_keeps_average_and_realizes_pnl() {
        let mut tracker = PositionTracker::new();
        tracker.on_fill(OrderSide::Buy, dec!(100), dec!(2));
        let outcome = tracker.on_fill(OrderSide::Sell, dec!(110), dec!(0.5));

        assert_eq!(tracker.net_volume(), dec!(1.5));
        assert_eq!(tracker.average_price(), Some(dec!(100)));
        assert_eq!(outcome.realized_pnl, dec!(5));
        assert!(outcome.closed.is_none());
        assert_eq!(tracker.cycle_realized_pnl(), dec!(5));
    }

    #[test]
    fn test_close_to_flat_reports_cycle_pnl() {
        let mut tracker = PositionTracker::new();
        tracker.on_fill(OrderSide::Buy, dec!(100), dec!(2));
        tracker.on_fill(OrderSide::Sell, dec!(110), dec!(1));
        let outcome = tracker.on_fill(OrderSide::Sell, dec!(95), dec!(1));

        let closed = outcome.closed.unwrap();
        assert_eq!(closed.side, Side::Long);
        // +10 then -5
        assert_eq!(closed.realized_pnl, dec!(5));
        assert_eq!(closed.exit_price, dec!(95));
        assert!(tracker.is_flat());
        assert_eq!(tracker.average_price(), None);
        assert!(!outcome.flipped());
    }

    #[test]
    fn test_flip_opens_excess_at_fill_price() {
        let mut tracker = PositionTracker::new();
        tracker.on_fill(OrderSide::Buy, dec!(100), dec!(1));
        tracker.on_fill(OrderSide::Buy, dec!(102), dec!(1));
        let outcome = tracker.on_fill(OrderSide::Sell, dec!(98), dec!(3));

        assert!(outcome.flipped());
        assert_eq!(outcome.opened, Some(Side::Short));
        // avg was 101, closed 2 lots at 98
        assert_eq!(outcome.closed.unwrap().realized_pnl, dec!(-6));
        assert_eq!(tracker.net_volume(), dec!(-1));
        assert_eq!(tracker.average_price(), Some(dec!(98)));
        assert_eq!(tracker.cycle_realized_pnl(), Decimal::ZERO);
    }

    #[test]
    fn test_short_realized_pnl_sign() {
        let mut tracker = PositionTracker::new();
        tracker.on_fill(OrderSide::Sell, dec!(50), dec!(2));
        let outcome = tracker.on_fill(OrderSide::Buy, dec!(45), dec!(2));

        assert_eq!(outcome.closed.unwrap().realized_pnl, dec!(10));
    }

    #[test]
    fn test_unrealized_pnl_positive_for_favorable_move() {
        let mut long = PositionTracker::new();
        long.on_fill(OrderSide::Buy, dec!(100), dec!(2));
        assert_eq!(long.unrealized_pnl(dec!(103)), dec!(6));

        let mut short = PositionTracker::new();
        short.on_fill(OrderSide::Sell, dec!(100), dec!(2));
        assert_eq!(short.unrealized_pnl(dec!(97)), dec!(6));
        assert_eq!(short.unrealized_pnl(dec!(101)), dec!(-2));

        assert_eq!(PositionTracker::new().unrealized_pnl(dec!(100)), Decimal::ZERO);
    }

    #[test]
    fn test_invalid_fill_ignored() {
        let mut tracker = PositionTracker::new();
        assert!(tracker.on_fill(OrderSide::Buy, dec!(100), dec!(0)).ignored);
        assert!(tracker.on_fill(OrderSide::Buy, dec!(100), dec!(-1)).ignored);
        assert!(tracker.on_fill(OrderSide::Buy, dec!(0), dec!(1)).ignored);
        assert!(tracker.is_flat());
    }
}
