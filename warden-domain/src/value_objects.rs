//! Value Objects for the Warden Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Domain errors for value object and configuration validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Price must be positive
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Volume must be positive
    #[error("Invalid volume: {0}")]
    InvalidVolume(String),

    /// Symbol must be a non-empty instrument code
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Distance could not be parsed or is negative
    #[error("Invalid distance: {0}")]
    InvalidDistance(String),

    /// Protective, sizing or instrument configuration is inconsistent
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Invalid state transition
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
}

// =============================================================================
// Price
// =============================================================================

/// Price represents a positive decimal price
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Price(Decimal);

impl Price {
    /// Create a new Price with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPrice` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidPrice(format!("Price must be positive, got {}", value)));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Volume
// =============================================================================

/// Volume represents a positive order or fill size
///
/// # Invariants
/// - Must be > 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Volume(Decimal);

impl Volume {
    /// Create a new Volume with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidVolume` if value <= 0
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value <= Decimal::ZERO {
            return Err(DomainError::InvalidVolume(format!(
                "Volume must be positive, got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    /// Get the underlying Decimal value
    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Symbol
// =============================================================================

/// Symbol identifies a traded instrument (e.g., `AAPL@NASDAQ`, `BTCUSDT`)
///
/// # Invariants
/// - Non-empty after trimming
/// - No interior whitespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Create a Symbol from an instrument code
    ///
    /// # Examples
    /// ```
    /// # use warden_domain::value_objects::Symbol;
    /// let symbol = Symbol::new("ESZ4@CME").unwrap();
    /// assert_eq!(symbol.as_str(), "ESZ4@CME");
    /// assert!(Symbol::new("  ").is_err());
    /// ```
    ///
    /// # Errors
    /// Returns `DomainError::InvalidSymbol` if the code is empty or contains whitespace
    pub fn new(code: impl Into<String>) -> Result<Self, DomainError> {
        let code = code.into();
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidSymbol("Symbol must be non-empty".to_string()));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidSymbol(format!(
                "Symbol cannot contain whitespace: {:?}",
                code
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the instrument code
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Side
// =============================================================================

/// Side represents the position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Long position (buy low, sell high)
    Long,
    /// Short position (sell high, buy low)
    Short,
}

impl Side {
    /// Get the entry action for this side
    ///
    /// Long → Buy, Short → Sell
    pub fn entry_action(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Get the exit action for this side
    ///
    /// Long → Sell, Short → Buy
    pub fn exit_action(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Sell,
            Side::Short => OrderSide::Buy,
        }
    }

    /// +1 for Long, -1 for Short
    pub fn sign(&self) -> Decimal {
        match self {
            Side::Long => Decimal::ONE,
            Side::Short => Decimal::NEGATIVE_ONE,
        }
    }

    /// The other direction
    pub fn opposite(&self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }

    /// Derive a side from a signed net volume (`None` when flat)
    pub fn from_signed(net_volume: Decimal) -> Option<Side> {
        if net_volume > Decimal::ZERO {
            Some(Side::Long)
        } else if net_volume < Decimal::ZERO {
            Some(Side::Short)
        } else {
            None
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// OrderSide represents the order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    /// Buy order
    Buy,
    /// Sell order
    Sell,
}

impl OrderSide {
    /// Signed volume change this order applies to a position
    pub fn signed(&self, volume: Decimal) -> Decimal {
        match self {
            OrderSide::Buy => volume,
            OrderSide::Sell => -volume,
        }
    }

    /// Position direction this order adds to
    pub fn opens(&self) -> Side {
        match self {
            OrderSide::Buy => Side::Long,
            OrderSide::Sell => Side::Short,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

// =============================================================================
// Distance
// =============================================================================

/// Distance of a protective level from its reference price
///
/// Strategies express distances either as an absolute price offset, as a
/// percentage of the entry price, or as a count of instrument price steps.
///
/// # Parsing
///
/// ```text
/// "5"      → Absolute(5)
/// "1.5%"   → Percent(1.5)
/// "20st"   → Steps(20)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum Distance {
    /// Absolute price offset
    Absolute(Decimal),
    /// Percentage of the reference price (1.5 = 1.5%)
    Percent(Decimal),
    /// Multiple of the instrument price step
    Steps(Decimal),
}

impl Distance {
    /// Resolve to an absolute price offset
    ///
    /// A non-positive `price_step` is treated as `1`.
    ///
    /// # Examples
    /// ```
    /// # use warden_domain::value_objects::Distance;
    /// # use rust_decimal_macros::dec;
    /// assert_eq!(Distance::Absolute(dec!(5)).resolve(dec!(100), dec!(0.01)), dec!(5));
    /// assert_eq!(Distance::Percent(dec!(2)).resolve(dec!(250), dec!(0.01)), dec!(5));
    /// assert_eq!(Distance::Steps(dec!(20)).resolve(dec!(100), dec!(0.25)), dec!(5));
    /// assert_eq!(Distance::Steps(dec!(3)).resolve(dec!(100), dec!(0)), dec!(3));
    /// ```
    pub fn resolve(&self, reference_price: Decimal, price_step: Decimal) -> Decimal {
        match self {
            Distance::Absolute(value) => *value,
            Distance::Percent(pct) => reference_price * *pct / Decimal::ONE_HUNDRED,
            Distance::Steps(steps) => *steps * effective_step(price_step),
        }
    }

    /// Raw configured value (units depend on the variant)
    pub fn value(&self) -> Decimal {
        match self {
            Distance::Absolute(v) | Distance::Percent(v) | Distance::Steps(v) => *v,
        }
    }

    /// True when the configured value is zero
    pub fn is_zero(&self) -> bool {
        self.value().is_zero()
    }
}

impl FromStr for Distance {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (number, ctor): (&str, fn(Decimal) -> Distance) = if let Some(n) = s.strip_suffix('%')
        {
            (n, Distance::Percent)
        } else if let Some(n) = s.strip_suffix("steps").or_else(|| s.strip_suffix("st")) {
            (n, Distance::Steps)
        } else {
            (s, Distance::Absolute)
        };

        let value = Decimal::from_str(number.trim())
            .map_err(|_| DomainError::InvalidDistance(format!("Cannot parse distance: {}", s)))?;
        if value < Decimal::ZERO {
            return Err(DomainError::InvalidDistance(format!("Distance cannot be negative: {}", s)));
        }
        Ok(ctor(value))
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Distance::Absolute(v) => write!(f, "{}", v),
            Distance::Percent(v) => write!(f, "{}%", v),
            Distance::Steps(v) => write!(f, "{}st", v),
        }
    }
}

fn effective_step(step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        Decimal::ONE
    } else {
        step
    }
}

// =============================================================================
// InstrumentSpec
// =============================================================================

/// Trading constraints of an instrument
///
/// # Invariants (checked by `validate`)
/// - `min_volume >= 0`
/// - `max_volume >= min_volume` and `max_volume > 0`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    /// Minimal price increment
    pub price_step: Decimal,
    /// Minimal volume increment (non-positive disables rounding)
    pub volume_step: Decimal,
    /// Smallest tradable volume
    pub min_volume: Decimal,
    /// Largest tradable volume
    pub max_volume: Decimal,
}

impl InstrumentSpec {
    /// Price step with a zero or negative step degraded to `1`
    pub fn effective_price_step(&self) -> Decimal {
        effective_step(self.price_step)
    }

    /// Floor a raw volume to the volume step and clamp to `max_volume`
    ///
    /// Returns zero when the result falls below `min_volume` (no trade).
    ///
    /// # Examples
    /// ```
    /// # use warden_domain::value_objects::InstrumentSpec;
    /// # use rust_decimal_macros::dec;
    /// let spec = InstrumentSpec {
    ///     price_step: dec!(0.01),
    ///     volume_step: dec!(0.1),
    ///     min_volume: dec!(0.1),
    ///     max_volume: dec!(5),
    /// };
    /// assert_eq!(spec.normalize_volume(dec!(0.37)), dec!(0.3));
    /// assert_eq!(spec.normalize_volume(dec!(12)), dec!(5));
    /// assert_eq!(spec.normalize_volume(dec!(0.05)), dec!(0));
    /// ```
    pub fn normalize_volume(&self, raw: Decimal) -> Decimal {
        if raw <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let stepped = if self.volume_step > Decimal::ZERO {
            (raw / self.volume_step).floor() * self.volume_step
        } else {
            raw
        };

        let clamped = stepped.min(self.max_volume);
        if clamped < self.min_volume || clamped <= Decimal::ZERO {
            Decimal::ZERO
        } else {
            clamped.normalize()
        }
    }

    /// Validate the instrument constraints
    ///
    /// # Errors
    /// Returns `DomainError::InvalidConfig` on inconsistent bounds
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.min_volume < Decimal::ZERO {
            return Err(DomainError::InvalidConfig("min_volume cannot be negative".to_string()));
        }
        if self.max_volume <= Decimal::ZERO {
            return Err(DomainError::InvalidConfig("max_volume must be positive".to_string()));
        }
        if self.max_volume < self.min_volume {
            return Err(DomainError::InvalidConfig(format!(
                "max_volume {} is below min_volume {}",
                self.max_volume, self.min_volume
            )));
        }
        Ok(())
    }
}

impl Default for InstrumentSpec {
    fn default() -> Self {
        Self {
            price_step: Decimal::new(1, 2),   // 0.01
            volume_step: Decimal::new(1, 2),  // 0.01
            min_volume: Decimal::new(1, 2),   // 0.01
            max_volume: Decimal::from(1_000_000),
        }
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
    fn test_price_validation() {
        assert!(Price::new(dec!(100.0)).is_ok());
        assert!(Price::new(dec!(0)).is_err());
        assert!(Price::new(dec!(-1)).is_err());
    }

    #[test]
    fn test_volume_validation() {
        assert_eq!(Volume::new(dec!(0.5)).unwrap().as_decimal(), dec!(0.5));
        assert!(Volume::new(Decimal::ZERO).is_err());
    }

    #[test]
    fn test_symbol_trims_and_rejects_whitespace() {
        assert_eq!(Symbol::new(" BTCUSDT ").unwrap().as_str(), "BTCUSDT");
        assert!(Symbol::new("BTC USDT").is_err());
        assert!(Symbol::new("").is_err());
    }

    #[test]
    fn test_side_actions() {
        assert_eq!(Side::Long.entry_action(), OrderSide::Buy);
        assert_eq!(Side::Long.exit_action(), OrderSide::Sell);
        assert_eq!(Side::Short.entry_action(), OrderSide::Sell);
        assert_eq!(Side::Short.exit_action(), OrderSide::Buy);
        assert_eq!(Side::Short.opposite(), Side::Long);
    }

    #[test]
    fn test_side_from_signed() {
        assert_eq!(Side::from_signed(dec!(1.5)), Some(Side::Long));
        assert_eq!(Side::from_signed(dec!(-0.1)), Some(Side::Short));
        assert_eq!(Side::from_signed(Decimal::ZERO), None);
    }

    #[test]
    fn test_order_side_signed() {
        assert_eq!(OrderSide::Buy.signed(dec!(2)), dec!(2));
        assert_eq!(OrderSide::Sell.signed(dec!(2)), dec!(-2));
        assert_eq!(OrderSide::Sell.opens(), Side::Short);
    }

    #[test]
    fn test_distance_parsing() {
        assert_eq!("5".parse::<Distance>().unwrap(), Distance::Absolute(dec!(5)));
        assert_eq!("1.5%".parse::<Distance>().unwrap(), Distance::Percent(dec!(1.5)));
        assert_eq!("20st".parse::<Distance>().unwrap(), Distance::Steps(dec!(20)));
        assert_eq!("8 steps".parse::<Distance>().unwrap(), Distance::Steps(dec!(8)));
        assert!("-3".parse::<Distance>().is_err());
        assert!("abc".parse::<Distance>().is_err());
    }

    #[test]
    fn test_distance_display_round_trips() {
        for raw in ["5", "1.5%", "20st"] {
            let parsed: Distance = raw.parse().unwrap();
            assert_eq!(parsed.to_string(), raw);
        }
    }

    #[test]
    fn test_zero_price_step_treated_as_one() {
        let spec = InstrumentSpec {
            price_step: Decimal::ZERO,
            ..InstrumentSpec::default()
        };
        assert_eq!(spec.effective_price_step(), Decimal::ONE);
        assert_eq!(Distance::Steps(dec!(4)).resolve(dec!(10), spec.price_step), dec!(4));
    }

    #[test]
    fn test_normalize_volume_without_step() {
        let spec = InstrumentSpec {
            price_step: dec!(0.01),
            volume_step: Decimal::ZERO,
            min_volume: Decimal::ZERO,
            max_volume: dec!(10),
        };
        assert_eq!(spec.normalize_volume(dec!(0.333)), dec!(0.333));
        assert_eq!(spec.normalize_volume(dec!(-1)), Decimal::ZERO);
    }

    #[test]
    fn test_instrument_spec_validation() {
        assert!(InstrumentSpec::default().validate().is_ok());

        let inverted = InstrumentSpec {
            min_volume: dec!(5),
            max_volume: dec!(1),
            ..InstrumentSpec::default()
        };
        assert!(matches!(inverted.validate(), Err(DomainError::InvalidConfig(_))));
    }
}
