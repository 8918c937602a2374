//! Market Data Types
//!
//! Candle and quote records delivered by the (external) aggregation layer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Side, Symbol};

// =============================================================================
// Candle
// =============================================================================

/// OHLCV candlestick data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Trading symbol
    pub symbol: Symbol,
    /// Candle open time
    pub open_time: DateTime<Utc>,
    /// Open price
    pub open: Decimal,
    /// High price
    pub high: Decimal,
    /// Low price
    pub low: Decimal,
    /// Close price
    pub close: Decimal,
    /// Total volume traded
    #[serde(default)]
    pub volume: Decimal,
    /// False while the candle is still forming
    #[serde(default = "default_final")]
    pub is_final: bool,
}

fn default_final() -> bool {
    true
}

impl Candle {
    /// Create a finished candle.
    pub fn new(
        symbol: Symbol,
        open_time: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    ) -> Self {
        Self {
            symbol,
            open_time,
            open,
            high,
            low,
            close,
            volume: Decimal::ZERO,
            is_final: true,
        }
    }

    /// Best price reached in the position's favor during the bar.
    pub fn favorable_extreme(&self, side: Side) -> Decimal {
        match side {
            Side::Long => self.high,
            Side::Short => self.low,
        }
    }

    /// High/low are consistent with each other and with open/close.
    pub fn is_well_formed(&self) -> bool {
        self.low <= self.high
            && self.low <= self.open.min(self.close)
            && self.high >= self.open.max(self.close)
    }
}

// =============================================================================
// Quote
// =============================================================================

/// Best bid/ask update.
///
/// Either side may be missing (empty book side, feed gap).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Trading symbol
    pub symbol: Symbol,
    /// Best bid
    pub bid: Option<Decimal>,
    /// Best ask
    pub ask: Option<Decimal>,
    /// Exchange time of the update
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Price at which a position on `side` would be closed.
    ///
    /// Longs exit at the bid, shorts at the ask.
    pub fn exit_price(&self, side: Side) -> Option<Decimal> {
        let price = match side {
            Side::Long => self.bid,
            Side::Short => self.ask,
        };
        price.filter(|p| *p > Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn symbol() -> Symbol {
        Symbol::new("EURUSD").unwrap()
    }

    #[test]
    fn test_quote_exit_price_by_side() {
        let quote = Quote {
            symbol: symbol(),
            bid: Some(dec!(1.1000)),
            ask: Some(dec!(1.1002)),
            timestamp: Utc::now(),
        };
        assert_eq!(quote.exit_price(Side::Long), Some(dec!(1.1000)));
        assert_eq!(quote.exit_price(Side::Short), Some(dec!(1.1002)));
    }

    #[test]
    fn test_quote_missing_side() {
        let quote = Quote {
            symbol: symbol(),
            bid: None,
            ask: Some(dec!(0)),
            timestamp: Utc::now(),
        };
        assert_eq!(quote.exit_price(Side::Long), None);
        assert_eq!(quote.exit_price(Side::Short), None);
    }

    #[test]
    fn test_candle_defaults_when_deserialized() {
        let json = r#"{
            "symbol": "EURUSD",
            "open_time": "2024-01-02T00:00:00Z",
            "open": "1.10", "high": "1.12", "low": "1.09", "close": "1.11"
        }"#;
        let candle: Candle = serde_json::from_str(json).unwrap();
        assert!(candle.is_final);
        assert!(candle.is_well_formed());
        assert_eq!(candle.favorable_extreme(Side::Short), dec!(1.09));
    }
}
