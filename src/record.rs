//! Persisted signal records and their outcome lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::criteria::CriteriaResult;
use crate::{Direction, MarketTrend, Symbol};

/// PENDING until resolved; every other state is terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    #[default]
    Pending,
    WinTp,
    LossSl,
    WinTime,
    LossTime,
    Expired,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Pending => "PENDING",
            Outcome::WinTp => "WIN_TP",
            Outcome::LossSl => "LOSS_SL",
            Outcome::WinTime => "WIN_TIME",
            Outcome::LossTime => "LOSS_TIME",
            Outcome::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Pending)
    }

    pub fn is_win(&self) -> bool {
        matches!(self, Outcome::WinTp | Outcome::WinTime)
    }

    pub fn is_loss(&self) -> bool {
        matches!(self, Outcome::LossSl | Outcome::LossTime)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Outcome::Pending),
            "WIN_TP" => Ok(Outcome::WinTp),
            "LOSS_SL" => Ok(Outcome::LossSl),
            "WIN_TIME" => Ok(Outcome::WinTime),
            "LOSS_TIME" => Ok(Outcome::LossTime),
            "EXPIRED" => Ok(Outcome::Expired),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

/// Terminal resolution of a pending record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub outcome: Outcome,
    pub exit_price: f64,
    pub exit_timestamp: DateTime<Utc>,
    pub actual_return_pct: f64,
    pub minutes_to_resolution: i64,
}

/// A fired signal with its indicator context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub symbol: Symbol,
    pub direction: Direction,
    pub entry_price: f64,
    pub score: f64,
    pub criteria_met: usize,
    pub total_criteria: usize,
    pub rsi_1m: f64,
    pub rsi_5m: f64,
    pub rsi_15m: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub volume_ratio: f64,
    pub atr: f64,
    pub adx: f64,
    pub candle_change_pct: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
    pub expected_move_pct: f64,
    pub risk_reward: f64,
    pub market_trend: MarketTrend,
    pub criteria: CriteriaResult,
    pub notified: bool,
    pub outcome: Outcome,
    pub exit_price: Option<f64>,
    pub exit_timestamp: Option<DateTime<Utc>>,
    pub actual_return_pct: Option<f64>,
    pub minutes_to_resolution: Option<i64>,
    pub notes: Option<String>,
}

impl SignalRecord {
    /// Direction-aware percent return if the position were closed at `price`
    pub fn return_at(&self, price: f64) -> f64 {
        directional_return(self.direction, self.entry_price, price)
    }

    pub fn apply(&mut self, resolution: &Resolution) {
        self.outcome = resolution.outcome;
        self.exit_price = Some(resolution.exit_price);
        self.exit_timestamp = Some(resolution.exit_timestamp);
        self.actual_return_pct = Some(resolution.actual_return_pct);
        self.minutes_to_resolution = Some(resolution.minutes_to_resolution);
    }
}

/// BUY: (exit - entry) / entry × 100, SELL: (entry - exit) / entry × 100
pub fn directional_return(direction: Direction, entry: f64, exit: f64) -> f64 {
    if entry == 0.0 {
        return 0.0;
    }
    match direction {
        Direction::Buy => (exit - entry) / entry * 100.0,
        Direction::Sell => (entry - exit) / entry * 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directional_return() {
        assert!((directional_return(Direction::Buy, 100.0, 102.0) - 2.0).abs() < 1e-9);
        assert!((directional_return(Direction::Sell, 100.0, 102.0) + 2.0).abs() < 1e-9);
        assert!((directional_return(Direction::Sell, 200.0, 190.0) - 5.0).abs() < 1e-9);
        assert_eq!(directional_return(Direction::Buy, 0.0, 1.0), 0.0);
    }

    #[test]
    fn test_outcome_labels_round_trip() {
        for outcome in [
            Outcome::Pending,
            Outcome::WinTp,
            Outcome::LossSl,
            Outcome::WinTime,
            Outcome::LossTime,
            Outcome::Expired,
        ] {
            assert_eq!(outcome.as_str().parse::<Outcome>(), Ok(outcome));
            let json = serde_json::to_string(&outcome).unwrap();
            assert_eq!(json, format!("\"{}\"", outcome.as_str()));
        }
        assert!(Outcome::WinTime.is_win());
        assert!(Outcome::LossSl.is_loss());
        assert!(!Outcome::Expired.is_win() && !Outcome::Expired.is_loss());
        assert!(!Outcome::Pending.is_terminal());
    }
}
