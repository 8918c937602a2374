//! Protective Levels
//!
//! Stop-loss, take-profit, break-even, trailing-stop and partial take-profit
//! tiers for one open position, evaluated against each finished bar.
//!
//! Evaluation is polled: levels are compared with the bar's high/low after
//! the bar closes. An intrabar reversal that touches both stop and target
//! is resolved by [`ExitPriority`] (stop first unless configured otherwise).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::ExitReason;
use crate::trailing::{
    self, favorable_move, is_more_favorable, is_stop_hit, is_target_hit, stop_from, target_from,
    TrailingStopUpdate,
};
use crate::value_objects::{Distance, DomainError, Side};

// =============================================================================
// Configuration
// =============================================================================

/// Which exit wins when stop and target are both inside one bar's range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPriority {
    /// Assume the worst case: the stop traded first
    #[default]
    StopFirst,
    /// Assume the target traded first
    TakeFirst,
}

/// Trailing stop parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingConfig {
    /// Distance kept between price and stop
    pub distance: Distance,
    /// Minimum stop improvement before it is moved
    pub step: Distance,
}

/// Break-even parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakevenConfig {
    /// Favorable move required before the stop is moved
    pub threshold: Distance,
    /// Offset past entry the stop is moved to
    pub offset: Distance,
}

/// One partial take-profit tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Distance from entry to the tier trigger
    pub distance: Distance,
    /// Fraction of the remaining position closed when the tier fires, in (0, 1]
    pub close_fraction: Decimal,
}

/// Protective configuration shared by every position of a strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectiveConfig {
    /// Initial stop-loss distance (None disables the stop)
    pub stop_distance: Option<Distance>,
    /// Take-profit distance (None disables the target)
    pub take_distance: Option<Distance>,
    /// Trailing stop
    pub trailing: Option<TrailingConfig>,
    /// Break-even
    pub breakeven: Option<BreakevenConfig>,
    /// Partial take-profit ladder
    pub tiers: Vec<TierConfig>,
    /// Same-bar stop/target resolution
    #[serde(default)]
    pub exit_priority: ExitPriority,
    /// Whether touching a level counts as crossing it
    #[serde(default = "inclusive_default")]
    pub inclusive: bool,
}

fn inclusive_default() -> bool {
    true
}

impl Default for ProtectiveConfig {
    /// No levels, stop-first, inclusive boundaries
    fn default() -> Self {
        Self {
            stop_distance: None,
            take_distance: None,
            trailing: None,
            breakeven: None,
            tiers: Vec::new(),
            exit_priority: ExitPriority::StopFirst,
            inclusive: inclusive_default(),
        }
    }
}

impl ProtectiveConfig {
    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `DomainError::InvalidConfig` if:
    /// - a stop or take distance is zero
    /// - a percent stop distance is 100% or more
    /// - trailing is enabled with a zero distance or zero step
    /// - break-even threshold is zero
    /// - a tier has a zero distance or a close fraction outside (0, 1]
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.stop_distance.is_some_and(|d| d.is_zero()) {
            return Err(DomainError::InvalidConfig(
                "stop_distance must be positive (omit it to disable the stop)".to_string(),
            ));
        }

        if let Some(Distance::Percent(pct)) = self.stop_distance {
            if pct >= Decimal::ONE_HUNDRED {
                return Err(DomainError::InvalidConfig(format!(
                    "percent stop_distance must be below 100%, got {}%",
                    pct
                )));
            }
        }

        if self.take_distance.is_some_and(|d| d.is_zero()) {
            return Err(DomainError::InvalidConfig(
                "take_distance must be positive (omit it to disable the target)".to_string(),
            ));
        }

        if let Some(trailing) = &self.trailing {
            if trailing.distance.is_zero() {
                return Err(DomainError::InvalidConfig(
                    "trailing_distance must be positive when trailing is enabled".to_string(),
                ));
            }
            if trailing.step.is_zero() {
                return Err(DomainError::InvalidConfig(
                    "trailing_step must be positive when trailing is enabled".to_string(),
                ));
            }
        }

        if let Some(breakeven) = &self.breakeven {
            if breakeven.threshold.is_zero() {
                return Err(DomainError::InvalidConfig(
                    "breakeven_threshold must be positive".to_string(),
                ));
            }
        }

        for (index, tier) in self.tiers.iter().enumerate() {
            if tier.distance.is_zero() {
                return Err(DomainError::InvalidConfig(format!(
                    "partial tier {} must have a positive distance",
                    index
                )));
            }
            if tier.close_fraction <= Decimal::ZERO || tier.close_fraction > Decimal::ONE {
                return Err(DomainError::InvalidConfig(format!(
                    "partial tier {} close fraction {} must be in (0, 1]",
                    index, tier.close_fraction
                )));
            }
        }

        Ok(())
    }
}

// =============================================================================
// Levels
// =============================================================================

/// Partial take-profit tier with its trigger resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    /// Price at which the tier fires
    pub trigger_price: Decimal,
    /// Fraction of the remaining position to close
    pub close_fraction: Decimal,
    /// Tier already fired in this position lifecycle
    pub hit: bool,
}

/// Partial close emitted by a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierExit {
    /// Index in ascending-distance order
    pub index: usize,
    /// Volume to close
    pub volume: Decimal,
    /// Trigger price of the tier
    pub trigger_price: Decimal,
}

/// Full exit requested by a crossed stop or target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitSignal {
    /// Stop, trailing stop or take profit
    pub reason: ExitReason,
    /// Level that was crossed (not the bar extreme)
    pub level: Decimal,
    /// Close of the bar that crossed it
    pub bar_close: Decimal,
}

/// Trailing rule resolved to absolute prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailingRule {
    /// Distance kept behind price
    pub distance: Decimal,
    /// Minimum improvement
    pub step: Decimal,
}

/// Break-even rule resolved to absolute prices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakevenRule {
    /// Required favorable move
    pub threshold: Decimal,
    /// Offset past entry
    pub offset: Decimal,
}

/// Protective levels of one open position
///
/// # Invariants
/// - At initialization: Long `stop < entry < take`, Short `take < entry < stop`
/// - Trailing only ever moves the stop in the favorable direction
/// - Each tier fires at most once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectiveLevels {
    /// Position direction
    pub side: Side,
    /// Entry (average) price the levels were computed from
    pub entry_price: Decimal,
    /// Current stop
    pub stop_price: Option<Decimal>,
    /// Current target
    pub take_price: Option<Decimal>,
    /// Trailing has moved the stop at least once
    pub trailing_active: bool,
    /// Break-even already applied
    pub breakeven_activated: bool,
    /// Partial take-profit ladder, nearest first
    pub tiers: Vec<Tier>,
    trailing_rule: Option<TrailingRule>,
    breakeven_rule: Option<BreakevenRule>,
    exit_priority: ExitPriority,
    inclusive: bool,
}

impl ProtectiveLevels {
    /// Initialize stop and target from absolute distances
    ///
    /// `stop = entry ∓ stop_distance`, `take = entry ± take_distance`.
    /// Non-positive distances leave the corresponding level unset.
    ///
    /// # Examples
    /// ```
    /// # use warden_domain::protective::ProtectiveLevels;
    /// # use warden_domain::value_objects::Side;
    /// # use rust_decimal_macros::dec;
    /// let levels = ProtectiveLevels::initialize(dec!(100), Side::Short, Some(dec!(5)), Some(dec!(10)));
    /// assert_eq!(levels.stop_price, Some(dec!(105)));
    /// assert_eq!(levels.take_price, Some(dec!(90)));
    /// ```
    pub fn initialize(
        entry_price: Decimal,
        side: Side,
        stop_distance: Option<Decimal>,
        take_distance: Option<Decimal>,
    ) -> Self {
        let positive = |d: Decimal| d > Decimal::ZERO;
        Self {
            side,
            entry_price,
            stop_price: stop_distance.filter(|d| positive(*d)).map(|d| stop_from(side, entry_price, d)),
            take_price: take_distance.filter(|d| positive(*d)).map(|d| target_from(side, entry_price, d)),
            trailing_active: false,
            breakeven_activated: false,
            tiers: Vec::new(),
            trailing_rule: None,
            breakeven_rule: None,
            exit_priority: ExitPriority::StopFirst,
            inclusive: true,
        }
    }

    /// Initialize every level from the strategy configuration
    ///
    /// Distances are resolved against `entry_price` and `price_step`
    /// (a zero price step counts as `1`).
    pub fn from_config(
        entry_price: Decimal,
        side: Side,
        config: &ProtectiveConfig,
        price_step: Decimal,
    ) -> Self {
        let resolve = |d: &Distance| d.resolve(entry_price, price_step);

        let mut levels = Self::initialize(
            entry_price,
            side,
            config.stop_distance.as_ref().map(resolve),
            config.take_distance.as_ref().map(resolve),
        );

        let mut tiers: Vec<(Decimal, Tier)> = config
            .tiers
            .iter()
            .map(|tier| {
                let distance = resolve(&tier.distance);
                (
                    distance,
                    Tier {
                        trigger_price: target_from(side, entry_price, distance),
                        close_fraction: tier.close_fraction,
                        hit: false,
                    },
                )
            })
            .collect();
        tiers.sort_by(|a, b| a.0.cmp(&b.0));

        levels.tiers = tiers.into_iter().map(|(_, tier)| tier).collect();
        levels.trailing_rule = config.trailing.as_ref().map(|t| TrailingRule {
            distance: resolve(&t.distance),
            step: resolve(&t.step),
        });
        levels.breakeven_rule = config.breakeven.as_ref().map(|b| BreakevenRule {
            threshold: resolve(&b.threshold),
            offset: resolve(&b.offset),
        });
        levels.exit_priority = config.exit_priority;
        levels.inclusive = config.inclusive;
        levels
    }

    /// Resolved trailing rule, if trailing is configured
    pub fn trailing_rule(&self) -> Option<TrailingRule> {
        self.trailing_rule
    }

    /// Resolved break-even rule, if break-even is configured
    pub fn breakeven_rule(&self) -> Option<BreakevenRule> {
        self.breakeven_rule
    }

    /// Same-bar stop/target resolution in force
    pub fn exit_priority(&self) -> ExitPriority {
        self.exit_priority
    }

    /// Override the same-bar resolution
    pub fn with_exit_priority(mut self, priority: ExitPriority) -> Self {
        self.exit_priority = priority;
        self
    }

    /// Override the boundary comparison
    pub fn with_inclusive(mut self, inclusive: bool) -> Self {
        self.inclusive = inclusive;
        self
    }

    /// Check a finished bar against stop and target
    ///
    /// Returns the exit to take, with the crossed level as its price.
    pub fn evaluate(&self, low: Decimal, high: Decimal, close: Decimal) -> Option<ExitSignal> {
        let stop = self
            .stop_price
            .filter(|stop| is_stop_hit(self.side, low, high, *stop, self.inclusive))
            .map(|level| ExitSignal {
                reason: if self.trailing_active {
                    ExitReason::TrailingStop
                } else {
                    ExitReason::StopLoss
                },
                level,
                bar_close: close,
            });

        let take = self
            .take_price
            .filter(|take| is_target_hit(self.side, low, high, *take, self.inclusive))
            .map(|level| ExitSignal {
                reason: ExitReason::TakeProfit,
                level,
                bar_close: close,
            });

        match self.exit_priority {
            ExitPriority::StopFirst => stop.or(take),
            ExitPriority::TakeFirst => take.or(stop),
        }
    }

    /// Move the stop to break-even once profit reaches `threshold`
    ///
    /// Applies at most once per position. The stop never moves backward:
    /// if it already sits past `entry ± offset` only the guard flag is set.
    /// Returns the new stop when it moved.
    pub fn apply_breakeven(
        &mut self,
        current_profit: Decimal,
        threshold: Decimal,
        offset: Decimal,
    ) -> Option<Decimal> {
        if self.breakeven_activated {
            return None;
        }

        let reached = if self.inclusive {
            current_profit >= threshold
        } else {
            current_profit > threshold
        };
        if !reached {
            return None;
        }

        self.breakeven_activated = true;
        let candidate = target_from(self.side, self.entry_price, offset);
        match self.stop_price {
            Some(stop) if !is_more_favorable(self.side, candidate, stop) => None,
            _ => {
                self.stop_price = Some(candidate);
                Some(candidate)
            },
        }
    }

    /// Trail the stop behind `current_price`
    ///
    /// See [`trailing::update_trailing_stop_stepped`] for the rule.
    pub fn apply_trailing(
        &mut self,
        current_price: Decimal,
        trail_distance: Decimal,
        trail_step: Decimal,
    ) -> Option<TrailingStopUpdate> {
        let update = trailing::update_trailing_stop_stepped(
            self.side,
            self.entry_price,
            current_price,
            self.stop_price,
            trail_distance,
            trail_step,
        )?;

        self.stop_price = Some(update.new_stop);
        self.trailing_active = true;
        Some(update)
    }

    /// Apply the configured break-even and trailing rules at `price`
    ///
    /// Returns `(breakeven_stop, trailing_update)`.
    pub fn apply_rules(&mut self, price: Decimal) -> (Option<Decimal>, Option<TrailingStopUpdate>) {
        let breakeven = self.breakeven_rule.and_then(|rule| {
            let profit = favorable_move(self.side, self.entry_price, price);
            self.apply_breakeven(profit, rule.threshold, rule.offset)
        });
        let trailing = self
            .trailing_rule
            .and_then(|rule| self.apply_trailing(price, rule.distance, rule.step));
        (breakeven, trailing)
    }

    /// Fire every untriggered tier crossed by the bar
    ///
    /// Tiers fire nearest first. Each fired tier closes `close_fraction` of
    /// the volume still held after the tiers before it in the same bar.
    pub fn evaluate_tiers(
        &mut self,
        high: Decimal,
        low: Decimal,
        position_volume: Decimal,
    ) -> Vec<TierExit> {
        let mut remaining = position_volume.abs();
        let mut exits = Vec::new();

        for (index, tier) in self.tiers.iter_mut().enumerate() {
            if tier.hit || remaining <= Decimal::ZERO {
                continue;
            }
            if !is_target_hit(self.side, low, high, tier.trigger_price, self.inclusive) {
                continue;
            }

            let volume = remaining * tier.close_fraction;
            remaining -= volume;
            tier.hit = true;
            exits.push(TierExit {
                index,
                volume,
                trigger_price: tier.trigger_price,
            });
        }

        exits
    }

    /// Re-arm a tier whose exit order did not execute
    pub fn rearm_tier(&mut self, index: usize) {
        if let Some(tier) = self.tiers.get_mut(index) {
            tier.hit = false;
        }
    }

    /// True when every tier has fired
    pub fn all_tiers_hit(&self) -> bool {
        self.tiers.iter().all(|t| t.hit)
    }
}

// =============================================================================
// Tests
// =============================================================================
