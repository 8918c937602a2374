//! Daemon configuration.
//!
//! Loads configuration from `WARDEN_*` environment variables with sensible
//! defaults. Distances accept absolute (`5`), percent (`1.5%`) or price
//! step (`20st`) notation; tiers are `distance:fraction` pairs
//! (`10:0.5,20:0.25`).

use crate::error::{DaemonError, DaemonResult};
use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

use warden_domain::{
    BreakevenConfig, Distance, ExitPriority, InstrumentSpec, ProtectiveConfig, SizingConfig,
    Symbol, TierConfig, TrailingConfig,
};
use warden_engine::{ProtectionMode, RiskSettings, SizingMode};

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Instrument traded by this daemon
    pub symbol: Symbol,

    /// Sizing and protection settings handed to the engine
    pub risk: RiskSettings,

    /// Stub gateway configuration
    pub stub: StubConfig,

    /// Input channel capacity
    pub channel_capacity: usize,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// Stub gateway configuration.
#[derive(Debug, Clone)]
pub struct StubConfig {
    /// Price market orders fill at
    pub fill_price: Decimal,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (uses stubs)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Settings are validated before returning.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> DaemonResult<Self> {
        let environment = load_environment(&get)?;

        let symbol_code = get("WARDEN_SYMBOL").unwrap_or_else(|| "BTCUSDT".to_string());
        let symbol = Symbol::new(symbol_code)?;

        let risk = RiskSettings {
            sizing: load_sizing(&get)?,
            sizing_mode: load_sizing_mode(&get)?,
            protective: load_protective(&get)?,
            protection_mode: load_protection_mode(&get)?,
        };
        risk.validate()?;

        let stub = StubConfig {
            fill_price: decimal(&get, "WARDEN_STUB_PRICE", Decimal::ONE_HUNDRED)?,
        };

        let capacity_str = get("WARDEN_CHANNEL_CAPACITY").unwrap_or_else(|| "1024".to_string());
        let channel_capacity = capacity_str
            .parse::<usize>()
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| {
                DaemonError::Config(format!("Invalid WARDEN_CHANNEL_CAPACITY: {}", capacity_str))
            })?;

        Ok(Self {
            symbol,
            risk,
            stub,
            channel_capacity,
            environment,
        })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            environment: Environment::Test,
            ..Self::default()
        }
    }
}

fn load_environment(get: &impl Fn(&str) -> Option<String>) -> DaemonResult<Environment> {
    let env_str = get("WARDEN_ENV").unwrap_or_else(|| "development".to_string());

    match env_str.to_lowercase().as_str() {
        "test" => Ok(Environment::Test),
        "development" | "dev" => Ok(Environment::Development),
        "production" | "prod" => Ok(Environment::Production),
        other => Err(DaemonError::Config(format!(
            "Invalid WARDEN_ENV: {}. Expected: test, development, production",
            other
        ))),
    }
}

fn load_sizing(get: &impl Fn(&str) -> Option<String>) -> DaemonResult<SizingConfig> {
    let defaults = InstrumentSpec::default();
    let instrument = InstrumentSpec {
        price_step: decimal(get, "WARDEN_PRICE_STEP", defaults.price_step)?,
        volume_step: decimal(get, "WARDEN_VOLUME_STEP", defaults.volume_step)?,
        min_volume: decimal(get, "WARDEN_MIN_VOLUME", defaults.min_volume)?,
        max_volume: decimal(get, "WARDEN_MAX_VOLUME", defaults.max_volume)?,
    };

    let max_escalations = match get("WARDEN_MAX_ESCALATIONS") {
        Some(val) => Some(val.trim().parse::<u32>().map_err(|_| {
            DaemonError::Config(format!("Invalid WARDEN_MAX_ESCALATIONS value: {}", val))
        })?),
        None => None,
    };

    Ok(SizingConfig {
        base_volume: decimal(get, "WARDEN_BASE_VOLUME", Decimal::new(1, 1))?,
        escalation_factor: decimal(get, "WARDEN_ESCALATION_FACTOR", Decimal::ONE)?,
        multiplier_cap: decimal(get, "WARDEN_MULTIPLIER_CAP", Decimal::ONE)?,
        max_escalations,
        exposure_cap: optional_decimal(get, "WARDEN_EXPOSURE_CAP")?,
        instrument,
    })
}

fn load_sizing_mode(get: &impl Fn(&str) -> Option<String>) -> DaemonResult<SizingMode> {
    let mode = get("WARDEN_SIZING_MODE").unwrap_or_else(|| "fixed".to_string());

    match mode.to_lowercase().as_str() {
        "fixed" => Ok(SizingMode::Fixed),
        "equity_risk" | "risk" => Ok(SizingMode::EquityRisk {
            equity: required_decimal(get, "WARDEN_EQUITY")?,
            risk_percent: decimal(get, "WARDEN_RISK_PERCENT", Decimal::ONE)?,
        }),
        other => Err(DaemonError::Config(format!(
            "Invalid WARDEN_SIZING_MODE: {}. Expected: fixed, equity_risk",
            other
        ))),
    }
}

fn load_protective(get: &impl Fn(&str) -> Option<String>) -> DaemonResult<ProtectiveConfig> {
    let trailing = match optional_distance(get, "WARDEN_TRAILING_DISTANCE")? {
        Some(distance) => Some(TrailingConfig {
            distance,
            // One price step unless configured
            step: optional_distance(get, "WARDEN_TRAILING_STEP")?
                .unwrap_or(Distance::Steps(Decimal::ONE)),
        }),
        None => None,
    };

    let breakeven = match optional_distance(get, "WARDEN_BREAKEVEN_THRESHOLD")? {
        Some(threshold) => Some(BreakevenConfig {
            threshold,
            offset: optional_distance(get, "WARDEN_BREAKEVEN_OFFSET")?
                .unwrap_or(Distance::Absolute(Decimal::ZERO)),
        }),
        None => None,
    };

    let tiers = match get("WARDEN_PARTIAL_TIERS") {
        Some(spec) => parse_tiers(&spec)?,
        None => Vec::new(),
    };

    let exit_priority = match get("WARDEN_EXIT_PRIORITY").as_deref().map(str::to_lowercase) {
        None => ExitPriority::default(),
        Some(p) if p == "stop_first" => ExitPriority::StopFirst,
        Some(p) if p == "take_first" => ExitPriority::TakeFirst,
        Some(other) => {
            return Err(DaemonError::Config(format!(
                "Invalid WARDEN_EXIT_PRIORITY: {}. Expected: stop_first, take_first",
                other
            )))
        },
    };

    let inclusive = match get("WARDEN_INCLUSIVE") {
        Some(val) => val.trim().parse::<bool>().map_err(|_| {
            DaemonError::Config(format!("Invalid WARDEN_INCLUSIVE value: {}", val))
        })?,
        None => true,
    };

    Ok(ProtectiveConfig {
        stop_distance: optional_distance(get, "WARDEN_STOP_DISTANCE")?,
        take_distance: optional_distance(get, "WARDEN_TAKE_DISTANCE")?,
        trailing,
        breakeven,
        tiers,
        exit_priority,
        inclusive,
    })
}

fn load_protection_mode(get: &impl Fn(&str) -> Option<String>) -> DaemonResult<ProtectionMode> {
    let mode = get("WARDEN_PROTECTION_MODE").unwrap_or_else(|| "polled".to_string());

    match mode.to_lowercase().as_str() {
        "polled" => Ok(ProtectionMode::Polled),
        "resting" => Ok(ProtectionMode::Resting),
        other => Err(DaemonError::Config(format!(
            "Invalid WARDEN_PROTECTION_MODE: {}. Expected: polled, resting",
            other
        ))),
    }
}

/// Parse `distance:fraction` pairs separated by commas.
pub fn parse_tiers(spec: &str) -> DaemonResult<Vec<TierConfig>> {
    spec.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (distance, fraction) = part.split_once(':').ok_or_else(|| {
                DaemonError::Config(format!("Invalid tier '{}': expected distance:fraction", part))
            })?;
            let close_fraction = Decimal::from_str(fraction.trim())
                .map_err(|_| DaemonError::Config(format!("Invalid tier fraction: {}", fraction)))?;
            Ok(TierConfig {
                distance: Distance::from_str(distance)?,
                close_fraction,
            })
        })
        .collect()
}

fn decimal(get: &impl Fn(&str) -> Option<String>, key: &str, default: Decimal) -> DaemonResult<Decimal> {
    Ok(optional_decimal(get, key)?.unwrap_or(default))
}

fn required_decimal(get: &impl Fn(&str) -> Option<String>, key: &str) -> DaemonResult<Decimal> {
    optional_decimal(get, key)?.ok_or_else(|| DaemonError::Config(format!("{} is required", key)))
}

fn optional_decimal(get: &impl Fn(&str) -> Option<String>, key: &str) -> DaemonResult<Option<Decimal>> {
    match get(key) {
        Some(val) => Decimal::from_str(val.trim())
            .map(Some)
            .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
        None => Ok(None),
    }
}

fn optional_distance(get: &impl Fn(&str) -> Option<String>, key: &str) -> DaemonResult<Option<Distance>> {
    match get(key) {
        Some(val) => Distance::from_str(&val)
            .map(Some)
            .map_err(|e| DaemonError::Config(format!("Invalid {}: {}", key, e))),
        None => Ok(None),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbol: Symbol::new("BTCUSDT").unwrap_or_else(|_| unreachable!("static symbol is valid")),
            risk: RiskSettings::fixed(Decimal::new(1, 1)),
            stub: StubConfig { fill_price: Decimal::ONE_HUNDRED },
            channel_capacity: 1024,
            environment: Environment::Development,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
