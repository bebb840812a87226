//! Core data types shared across the signal engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for candle data
#[derive(Debug, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("close time {close_time} precedes open time {open_time}")]
    InvertedTimes {
        open_time: DateTime<Utc>,
        close_time: DateTime<Utc>,
    },
}

/// One OHLCV bar. Series are always ordered oldest to newest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: DateTime<Utc>,
}

impl Candle {
    /// Create a new candle with validation
    pub fn new(
        open_time: DateTime<Utc>,
        close_time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self::new_unchecked(open_time, close_time, open, high, low, close, volume);
        candle.validate()?;
        Ok(candle)
    }

    /// Create a candle without validation (test fixtures, trusted sources)
    pub fn new_unchecked(
        open_time: DateTime<Utc>,
        close_time: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            open_time,
            open,
            high,
            low,
            close,
            volume,
            close_time,
        }
    }

    pub fn validate(&self) -> Result<(), CandleValidationError> {
        if self.open <= 0.0 || self.high <= 0.0 || self.low <= 0.0 || self.close <= 0.0 {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }
        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }
        if self.open < self.low || self.open > self.high {
            return Err(CandleValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }
        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }
        if self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }
        if self.close_time < self.open_time {
            return Err(CandleValidationError::InvertedTimes {
                open_time: self.open_time,
                close_time: self.close_time,
            });
        }
        Ok(())
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn is_green(&self) -> bool {
        self.close > self.open
    }

    pub fn is_red(&self) -> bool {
        self.close < self.open
    }

    /// Percent change from open to close
    pub fn change_pct(&self) -> f64 {
        if self.open == 0.0 {
            return 0.0;
        }
        (self.close - self.open) / self.open * 100.0
    }
}

/// Trading pair symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Symbol(s.into().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn asset_class(&self) -> AssetClass {
        AssetClass::from_symbol(self.as_str())
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "buy",
            Direction::Sell => "sell",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Direction::Buy),
            "sell" => Ok(Direction::Sell),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}

/// Macro trend label derived from the 1h series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketTrend {
    Bullish,
    Bearish,
    #[default]
    Sideways,
}

impl MarketTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketTrend::Bullish => "BULLISH",
            MarketTrend::Bearish => "BEARISH",
            MarketTrend::Sideways => "SIDEWAYS",
        }
    }

    /// Whether this trend favors a signal in `direction`
    pub fn favors(&self, direction: Direction) -> bool {
        matches!(
            (self, direction),
            (MarketTrend::Bullish, Direction::Buy) | (MarketTrend::Bearish, Direction::Sell)
        )
    }
}

impl std::fmt::Display for MarketTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MarketTrend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BULLISH" => Ok(MarketTrend::Bullish),
            "BEARISH" => Ok(MarketTrend::Bearish),
            "SIDEWAYS" => Ok(MarketTrend::Sideways),
            other => Err(format!("unknown market trend '{}'", other)),
        }
    }
}

/// Per-pair tuning bucket, see `IndicatorConfig::tuning`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetClass {
    Btc,
    Eth,
    Alt,
}

impl AssetClass {
    pub fn from_symbol(symbol: &str) -> Self {
        let upper = symbol.trim().to_uppercase();
        if upper.starts_with("BTC") {
            AssetClass::Btc
        } else if upper.starts_with("ETH") {
            AssetClass::Eth
        } else {
            AssetClass::Alt
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_candle_validation() {
        let ok = Candle::new(t0(), t0() + Duration::minutes(1), 100.0, 101.0, 99.0, 100.5, 10.0);
        assert!(ok.is_ok());

        let inverted = Candle::new(t0(), t0(), 100.0, 99.0, 101.0, 100.0, 10.0);
        assert!(matches!(
            inverted,
            Err(CandleValidationError::HighLessThanLow { .. })
        ));

        let close_out = Candle::new(t0(), t0(), 100.0, 101.0, 99.0, 102.0, 10.0);
        assert!(matches!(
            close_out,
            Err(CandleValidationError::CloseOutOfRange { .. })
        ));

        let times = Candle::new(t0(), t0() - Duration::minutes(1), 100.0, 101.0, 99.0, 100.0, 1.0);
        assert!(matches!(
            times,
            Err(CandleValidationError::InvertedTimes { .. })
        ));
    }

    #[test]
    fn test_candle_shape_helpers() {
        let c = Candle::new_unchecked(t0(), t0(), 100.0, 102.0, 99.5, 101.5, 5.0);
        assert!(c.is_green());
        assert!(!c.is_red());
        assert!((c.body() - 1.5).abs() < 1e-9);
        assert!((c.range() - 2.5).abs() < 1e-9);
        assert!((c.change_pct() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_asset_class_mapping() {
        assert_eq!(AssetClass::from_symbol("BTCUSDT"), AssetClass::Btc);
        assert_eq!(AssetClass::from_symbol("ethusdt"), AssetClass::Eth);
        assert_eq!(AssetClass::from_symbol("SOLUSDT"), AssetClass::Alt);
        assert_eq!(Symbol::new(" btcusdt ").as_str(), "BTCUSDT");
    }

    #[test]
    fn test_trend_direction_relations() {
        assert!(MarketTrend::Bullish.favors(Direction::Buy));
        assert!(MarketTrend::Bearish.favors(Direction::Sell));
        assert!(!MarketTrend::Sideways.favors(Direction::Buy));
        assert!(!MarketTrend::Bullish.favors(Direction::Sell));
        assert_eq!("bearish".parse::<MarketTrend>(), Ok(MarketTrend::Bearish));
        assert_eq!("SELL".parse::<Direction>(), Ok(Direction::Sell));
    }
}
