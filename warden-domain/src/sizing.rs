//! Sizing Policy
//!
//! Volume of the next order: fixed base volume, equity-risk volume, and
//! martingale/recovery scaling after losing closures.
//!
//! # Martingale state machine
//!
//! ```text
//! profit      → multiplier = 1, losses = 0
//! loss        → losses += 1
//!               ceiling reached or multiplier at cap → multiplier = 1, losses = 0
//!               otherwise                           → multiplier = min(m · factor, cap)
//! zero PnL    → unchanged
//! ```
//!
//! `SizingState` survives the flat/non-flat boundary and is only reset when
//! the strategy restarts; it is never persisted.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::value_objects::{DomainError, InstrumentSpec};

/// Sizing configuration for one strategy instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingConfig {
    /// Volume of an unscaled entry
    pub base_volume: Decimal,
    /// Multiplier growth per losing closure (≤ 0 disables martingale)
    pub escalation_factor: Decimal,
    /// Upper bound of the multiplier (< 1 disables martingale)
    pub multiplier_cap: Decimal,
    /// Consecutive losses at which sizing starts a fresh cycle
    pub max_escalations: Option<u32>,
    /// Same-direction volume cap: clamps a single engine's entries and
    /// bounds the aggregate across coordinated legs
    pub exposure_cap: Option<Decimal>,
    /// Volume constraints of the traded instrument
    pub instrument: InstrumentSpec,
}

impl SizingConfig {
    /// Fixed-volume sizing without martingale
    pub fn fixed(base_volume: Decimal) -> Self {
        Self {
            base_volume,
            escalation_factor: Decimal::ONE,
            multiplier_cap: Decimal::ONE,
            max_escalations: None,
            exposure_cap: None,
            instrument: InstrumentSpec::default(),
        }
    }

    /// Martingale is active
    pub fn martingale_enabled(&self) -> bool {
        self.escalation_factor > Decimal::ZERO && self.multiplier_cap >= Decimal::ONE
    }

    /// Validate the configuration
    ///
    /// A non-positive escalation factor or a cap below 1 is not an error on
    /// its own (sizing falls back to flat base volume), but combining it with
    /// an escalation ceiling is contradictory and rejected.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidConfig` on inconsistent values
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.base_volume <= Decimal::ZERO {
            return Err(DomainError::InvalidConfig(format!(
                "base_volume must be positive, got {}",
                self.base_volume
            )));
        }

        if self.max_escalations.is_some() && !self.martingale_enabled() {
            return Err(DomainError::InvalidConfig(
                "max_escalations requires escalation_factor > 0 and multiplier_cap >= 1".to_string(),
            ));
        }

        if let Some(cap) = self.exposure_cap {
            if cap <= Decimal::ZERO {
                return Err(DomainError::InvalidConfig(format!(
                    "exposure_cap must be positive, got {}",
                    cap
                )));
            }
        }

        self.instrument.validate()
    }
}

/// Martingale memory of a strategy instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingState {
    /// Current volume multiplier (≥ 1)
    pub multiplier: Decimal,
    /// Losing closures since the last reset
    pub consecutive_losses: u32,
}

impl Default for SizingState {
    fn default() -> Self {
        Self {
            multiplier: Decimal::ONE,
            consecutive_losses: 0,
        }
    }
}

/// Sizing policy: configuration plus martingale state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizingPolicy {
    config: SizingConfig,
    state: SizingState,
}

impl SizingPolicy {
    /// Create a policy with a fresh state
    ///
    /// # Errors
    /// Returns `DomainError::InvalidConfig` if the configuration is invalid
    pub fn new(config: SizingConfig) -> Result<Self, DomainError> {
        config.validate()?;
        Ok(Self {
            config,
            state: SizingState::default(),
        })
    }

    /// Configuration in force
    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// Current martingale state
    pub fn state(&self) -> SizingState {
        self.state
    }

    /// Multiplier actually applied to volumes
    pub fn effective_multiplier(&self) -> Decimal {
        if self.config.martingale_enabled() {
            self.state.multiplier
        } else {
            Decimal::ONE
        }
    }

    /// `base_volume × multiplier`, normalized to the instrument
    ///
    /// Returns zero (no trade) when the result is below `min_volume`.
    pub fn compute_entry_volume(&self) -> Decimal {
        self.config
            .instrument
            .normalize_volume(self.config.base_volume * self.effective_multiplier())
    }

    /// Volume risking `risk_percent` of `equity` over `stop_distance`
    ///
    /// `equity × risk% / stop_distance × multiplier`, normalized the same
    /// way as [`compute_entry_volume`](Self::compute_entry_volume).
    ///
    /// # Examples
    /// ```
    /// # use warden_domain::sizing::{SizingConfig, SizingPolicy};
    /// # use rust_decimal_macros::dec;
    /// let policy = SizingPolicy::new(SizingConfig::fixed(dec!(1))).unwrap();
    /// // 1% of 10_000 over a 50 point stop
    /// assert_eq!(policy.compute_risk_volume(dec!(10000), dec!(1), dec!(50)), dec!(2));
    /// assert_eq!(policy.compute_risk_volume(dec!(10000), dec!(1), dec!(0)), dec!(0));
    /// ```
    pub fn compute_risk_volume(
        &self,
        equity: Decimal,
        risk_percent: Decimal,
        stop_distance: Decimal,
    ) -> Decimal {
        if stop_distance <= Decimal::ZERO
            || equity <= Decimal::ZERO
            || risk_percent <= Decimal::ZERO
        {
            return Decimal::ZERO;
        }

        let max_risk = equity * risk_percent / Decimal::ONE_HUNDRED;
        let raw = max_risk / stop_distance * self.effective_multiplier();
        self.config.instrument.normalize_volume(raw)
    }

    /// Volume of a single order that flattens `current_net_volume` and
    /// opens a fresh entry on the other side
    ///
    /// Returns zero when the entry part would be zero, so the caller skips
    /// the reversal instead of merely flattening.
    pub fn compute_reversal_volume(&self, current_net_volume: Decimal) -> Decimal {
        let entry = self.compute_entry_volume();
        if entry.is_zero() {
            return Decimal::ZERO;
        }
        entry + current_net_volume.abs()
    }

    /// Feed the realized PnL of a fully closed position
    ///
    /// Must be called exactly once per flat→flat cycle. Returns the new
    /// multiplier. The loss that brings `consecutive_losses` to
    /// `max_escalations` resets sizing instead of escalating.
    pub fn on_position_closed(&mut self, realized_pnl: Decimal) -> Decimal {
        if realized_pnl > Decimal::ZERO {
            self.state = SizingState::default();
        } else if realized_pnl < Decimal::ZERO {
            self.state.consecutive_losses += 1;

            let ceiling_reached = self
                .config
                .max_escalations
                .is_some_and(|max| self.state.consecutive_losses >= max);
            let at_cap = self.state.multiplier >= self.config.multiplier_cap;

            if !self.config.martingale_enabled() {
                self.state.multiplier = Decimal::ONE;
            } else if ceiling_reached || at_cap {
                self.state = SizingState::default();
            } else {
                self.state.multiplier = (self.state.multiplier * self.config.escalation_factor)
                    .min(self.config.multiplier_cap)
                    .max(Decimal::ONE);
            }
        }

        self.state.multiplier
    }

    /// Forget martingale history (strategy restart)
    pub fn reset(&mut self) {
        self.state = SizingState::default();
    }
}

// =============================================================================
// Tests
// =============================================================================
