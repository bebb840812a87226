//! The eight named BUY/SELL criteria
//!
//! One evaluation path serves both the snapshot breakdown shown to readers and
//! the evaluator gate, so what is displayed is exactly what is gated on.
//! Criterion names are part of the stored record format and are matched by
//! downstream analytics; do not rename them.

use serde::{Deserialize, Serialize};

use crate::config::GateConfig;
use crate::{Candle, Direction, MarketTrend};

/// Number of counted criteria per direction
pub const PRIMARY_CRITERIA: usize = 8;

/// Name of the hard-gate distance check, stored beside the eight
pub const SIGNAL_DISTANCE: &str = "Signal_distance";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Criterion {
    #[serde(rename = "RSI_1m_favorable")]
    Rsi1mFavorable,
    #[serde(rename = "RSI_15m_bullish")]
    Rsi15mBullish,
    #[serde(rename = "RSI_15m_bearish")]
    Rsi15mBearish,
    #[serde(rename = "EMA_crossover")]
    EmaCrossover,
    #[serde(rename = "EMA_crossunder")]
    EmaCrossunder,
    #[serde(rename = "Volume_high")]
    VolumeHigh,
    #[serde(rename = "Confidence_good")]
    ConfidenceGood,
    #[serde(rename = "Price_above_EMA")]
    PriceAboveEma,
    #[serde(rename = "Price_below_EMA")]
    PriceBelowEma,
    #[serde(rename = "Candle_positive")]
    CandlePositive,
    #[serde(rename = "Candle_negative")]
    CandleNegative,
    #[serde(rename = "Breakout_candle")]
    BreakoutCandle,
}

impl Criterion {
    pub fn name(&self) -> &'static str {
        match self {
            Criterion::Rsi1mFavorable => "RSI_1m_favorable",
            Criterion::Rsi15mBullish => "RSI_15m_bullish",
            Criterion::Rsi15mBearish => "RSI_15m_bearish",
            Criterion::EmaCrossover => "EMA_crossover",
            Criterion::EmaCrossunder => "EMA_crossunder",
            Criterion::VolumeHigh => "Volume_high",
            Criterion::ConfidenceGood => "Confidence_good",
            Criterion::PriceAboveEma => "Price_above_EMA",
            Criterion::PriceBelowEma => "Price_below_EMA",
            Criterion::CandlePositive => "Candle_positive",
            Criterion::CandleNegative => "Candle_negative",
            Criterion::BreakoutCandle => "Breakout_candle",
        }
    }

    /// The eight criteria of a direction, in display order
    pub fn for_direction(direction: Direction) -> [Criterion; PRIMARY_CRITERIA] {
        match direction {
            Direction::Buy => [
                Criterion::Rsi1mFavorable,
                Criterion::Rsi15mBullish,
                Criterion::EmaCrossover,
                Criterion::VolumeHigh,
                Criterion::ConfidenceGood,
                Criterion::PriceAboveEma,
                Criterion::CandlePositive,
                Criterion::BreakoutCandle,
            ],
            Direction::Sell => [
                Criterion::Rsi1mFavorable,
                Criterion::Rsi15mBearish,
                Criterion::EmaCrossunder,
                Criterion::VolumeHigh,
                Criterion::ConfidenceGood,
                Criterion::PriceBelowEma,
                Criterion::CandleNegative,
                Criterion::BreakoutCandle,
            ],
        }
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriterionCheck {
    pub criterion: Criterion,
    pub passed: bool,
}

/// Result of the hard-gate distance check (cooldown window plus price move)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceCheck {
    pub passed: bool,
    pub reason: String,
}

/// Ordered criterion -> pass mapping for one direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriteriaResult {
    pub direction: Direction,
    pub checks: Vec<CriterionCheck>,
    /// Filled in by the gate; never counted in `met` or `total`
    #[serde(
        rename = "Signal_distance",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub signal_distance: Option<DistanceCheck>,
}

impl CriteriaResult {
    /// All eight criteria failed; used before a symbol has been evaluated
    pub fn empty(direction: Direction) -> Self {
        let checks = Criterion::for_direction(direction)
            .into_iter()
            .map(|criterion| CriterionCheck {
                criterion,
                passed: false,
            })
            .collect();
        CriteriaResult {
            direction,
            checks,
            signal_distance: None,
        }
    }

    pub fn met(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    pub fn total(&self) -> usize {
        self.checks.len()
    }

    pub fn get(&self, criterion: Criterion) -> Option<bool> {
        self.checks
            .iter()
            .find(|c| c.criterion == criterion)
            .map(|c| c.passed)
    }

    /// Look up by stored name, e.g. `"EMA_crossover"` or [`SIGNAL_DISTANCE`]
    pub fn get_by_name(&self, name: &str) -> Option<bool> {
        if name == SIGNAL_DISTANCE {
            return self.signal_distance.as_ref().map(|d| d.passed);
        }
        self.checks
            .iter()
            .find(|c| c.criterion.name() == name)
            .map(|c| c.passed)
    }

    pub fn passed_names(&self) -> Vec<&'static str> {
        self.checks
            .iter()
            .filter(|c| c.passed)
            .map(|c| c.criterion.name())
            .collect()
    }
}

/// Snapshot readings the criteria are computed from
#[derive(Debug, Clone, Copy)]
pub struct CriteriaInputs<'a> {
    pub price: f64,
    pub rsi_1m: f64,
    pub rsi_15m: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub volume: f64,
    pub volume_avg: f64,
    pub score: f64,
    pub candle_change_pct: f64,
    pub trend: MarketTrend,
    pub one_minute: &'a [Candle],
}

/// Minimum score for `Confidence_good`, lower when the trend favors `direction`
pub fn required_score(direction: Direction, trend: MarketTrend, gate: &GateConfig) -> f64 {
    match (direction, trend.favors(direction)) {
        (Direction::Buy, true) => gate.buy_min_score_favorable,
        (Direction::Buy, false) => gate.buy_min_score,
        (Direction::Sell, true) => gate.sell_min_score_favorable,
        (Direction::Sell, false) => gate.sell_min_score,
    }
}

/// How many of the eight must pass, lower when the trend favors `direction`
pub fn required_count(direction: Direction, trend: MarketTrend, gate: &GateConfig) -> usize {
    match (direction, trend.favors(direction)) {
        (Direction::Buy, true) => gate.buy_required_favorable,
        (Direction::Buy, false) => gate.buy_required,
        (Direction::Sell, true) => gate.sell_required_favorable,
        (Direction::Sell, false) => gate.sell_required,
    }
}

pub fn evaluate_criteria(
    direction: Direction,
    inputs: &CriteriaInputs<'_>,
    gate: &GateConfig,
) -> CriteriaResult {
    let checks = Criterion::for_direction(direction)
        .into_iter()
        .map(|criterion| CriterionCheck {
            criterion,
            passed: check(criterion, direction, inputs, gate),
        })
        .collect();

    CriteriaResult {
        direction,
        checks,
        signal_distance: None,
    }
}

fn check(
    criterion: Criterion,
    direction: Direction,
    inputs: &CriteriaInputs<'_>,
    gate: &GateConfig,
) -> bool {
    match criterion {
        Criterion::Rsi1mFavorable => (gate.rsi_lower..=gate.rsi_upper).contains(&inputs.rsi_1m),
        Criterion::Rsi15mBullish => inputs.rsi_15m > gate.rsi_15m_pivot,
        Criterion::Rsi15mBearish => inputs.rsi_15m < gate.rsi_15m_pivot,
        Criterion::EmaCrossover => inputs.ema_fast > inputs.ema_slow,
        Criterion::EmaCrossunder => inputs.ema_fast < inputs.ema_slow,
        Criterion::VolumeHigh => inputs.volume > inputs.volume_avg * gate.volume_multiplier,
        Criterion::ConfidenceGood => {
            inputs.score >= required_score(direction, inputs.trend, gate)
        }
        Criterion::PriceAboveEma => inputs.price > inputs.ema_fast,
        Criterion::PriceBelowEma => inputs.price < inputs.ema_fast,
        Criterion::CandlePositive => inputs.candle_change_pct > gate.candle_change_min_pct,
        Criterion::CandleNegative => inputs.candle_change_pct < -gate.candle_change_min_pct,
        Criterion::BreakoutCandle => breakout_candle(inputs.one_minute, direction, gate),
    }
}

/// Strong-candle check on the latest 1m bar
///
/// Volume must beat the recent average (latest bar included), the body must
/// dominate the range, and the close must sit near the extreme in the signal
/// direction.
pub fn breakout_candle(candles: &[Candle], direction: Direction, gate: &GateConfig) -> bool {
    let Some(last) = candles.last() else {
        return false;
    };

    let lookback = gate.breakout_volume_lookback.min(candles.len());
    if lookback == 0 {
        return false;
    }
    let recent = &candles[candles.len() - lookback..];
    let avg_volume = recent.iter().map(|c| c.volume).sum::<f64>() / lookback as f64;
    if last.volume <= avg_volume * gate.breakout_volume_multiplier {
        return false;
    }

    let range = last.range();
    if range <= 0.0 || last.body() / range < gate.breakout_min_body_ratio {
        return false;
    }

    match direction {
        Direction::Buy => {
            last.is_green() && (last.close - last.low) / range > gate.breakout_close_position
        }
        Direction::Sell => {
            last.is_red() && (last.high - last.close) / range > gate.breakout_close_position
        }
    }
}
