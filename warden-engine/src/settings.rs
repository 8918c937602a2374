//! Risk settings consumed by the engine.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use warden_domain::{InstrumentSpec, ProtectiveConfig, SizingConfig};

use crate::error::{EngineError, EngineResult};

/// How protective exits reach the market
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionMode {
    /// Stop/take are compared with each finished bar; exits are market orders
    #[default]
    Polled,
    /// Stop and take rest at the gateway as Stop and Limit orders
    Resting,
}

/// How entry volume is computed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SizingMode {
    /// `base_volume × multiplier`
    #[default]
    Fixed,
    /// Risk a percentage of equity over the initial stop distance
    EquityRisk {
        /// Account equity
        equity: Decimal,
        /// Percent of equity at risk per trade (1 = 1%)
        risk_percent: Decimal,
    },
}

/// Everything the engine needs to size and protect positions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSettings {
    /// Volume sizing and martingale
    pub sizing: SizingConfig,
    /// Fixed or equity-risk entry volume
    #[serde(default)]
    pub sizing_mode: SizingMode,
    /// Stop, target, break-even, trailing and tiers
    pub protective: ProtectiveConfig,
    /// Polled or resting protective exits
    #[serde(default)]
    pub protection_mode: ProtectionMode,
}

impl RiskSettings {
    /// Fixed-volume settings with no protection configured
    pub fn fixed(base_volume: Decimal) -> Self {
        Self {
            sizing: SizingConfig::fixed(base_volume),
            sizing_mode: SizingMode::Fixed,
            protective: ProtectiveConfig::default(),
            protection_mode: ProtectionMode::Polled,
        }
    }

    /// Instrument constraints
    pub fn instrument(&self) -> &InstrumentSpec {
        &self.sizing.instrument
    }

    /// Validate the settings (fail fast at startup)
    ///
    /// # Errors
    /// Returns `EngineError::Domain` for invalid sizing/protective parts and
    /// `EngineError::InvalidSettings` for invalid combinations.
    pub fn validate(&self) -> EngineResult<()> {
        self.sizing.validate()?;
        self.protective.validate()?;

        if let SizingMode::EquityRisk { equity, risk_percent } = self.sizing_mode {
            if equity <= Decimal::ZERO {
                return Err(EngineError::InvalidSettings(format!(
                    "equity must be positive for equity-risk sizing, got {}",
                    equity
                )));
            }
            if risk_percent <= Decimal::ZERO || risk_percent > Decimal::ONE_HUNDRED {
                return Err(EngineError::InvalidSettings(format!(
                    "risk_percent must be in (0, 100], got {}",
                    risk_percent
                )));
            }
            if self.protective.stop_distance.is_none() {
                return Err(EngineError::InvalidSettings(
                    "equity-risk sizing requires a stop_distance".to_string(),
                ));
            }
        }

        if self.protection_mode == ProtectionMode::Resting
            && self.protective.stop_distance.is_none()
            && self.protective.take_distance.is_none()
        {
            return Err(EngineError::InvalidSettings(
                "resting protection needs a stop_distance or a take_distance".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use warden_domain::Distance;

    #[test]
    fn test_fixed_settings_valid() {
        assert!(RiskSettings::fixed(dec!(1)).validate().is_ok());
    }

    #[test]
    fn test_equity_risk_requires_stop() {
        let settings = RiskSettings {
            sizing_mode: SizingMode::EquityRisk {
                equity: dec!(10000),
                risk_percent: dec!(1),
            },
            ..RiskSettings::fixed(dec!(1))
        };
        assert!(matches!(settings.validate(), Err(EngineError::InvalidSettings(_))));

        let mut with_stop = settings;
        with_stop.protective.stop_distance = Some(Distance::Percent(dec!(2)));
        assert!(with_stop.validate().is_ok());
    }

    #[test]
    fn test_resting_requires_a_level() {
        let settings = RiskSettings {
            protection_mode: ProtectionMode::Resting,
            ..RiskSettings::fixed(dec!(1))
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_whole_price_percent_stop_rejected() {
        let mut settings = RiskSettings::fixed(dec!(1));
        settings.protective.stop_distance = Some(Distance::Percent(dec!(100)));
        assert!(matches!(settings.validate(), Err(EngineError::Domain(_))));
    }

    #[test]
    fn test_fixed_settings_are_inclusive() {
        assert!(RiskSettings::fixed(dec!(1)).protective.inclusive);
    }

    #[test]
    fn test_domain_errors_propagate() {
        let settings = RiskSettings::fixed(dec!(0));
        assert!(matches!(settings.validate(), Err(EngineError::Domain(_))));
    }

    #[test]
    fn test_settings_deserialize_defaults() {
        let json = r#"{
            "sizing": {
                "base_volume": "0.1",
                "escalation_factor": "2",
                "multiplier_cap": "4",
                "max_escalations": null,
                "exposure_cap": null,
                "instrument": {
                    "price_step": "0.01",
                    "volume_step": "0.01",
                    "min_volume": "0.01",
                    "max_volume": "100"
                }
            },
            "protective": {
                "stop_distance": {"unit": "absolute", "value": "5"},
                "take_distance": null,
                "trailing": null,
                "breakeven": null,
                "tiers": [],
                "exit_priority": "stop_first",
                "inclusive": true
            }
        }"#;
        let settings: RiskSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.protection_mode, ProtectionMode::Polled);
        assert_eq!(settings.sizing_mode, SizingMode::Fixed);
        assert!(settings.validate().is_ok());
    }
}
