//! Per-symbol market snapshot
//!
//! [`SnapshotBuilder::build`] turns the multi-timeframe candle series of one
//! symbol into a flat [`SymbolSnapshot`]: indicators, score, price targets
//! for both directions and the BUY/SELL criteria breakdowns.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{Config, GateConfig, IndicatorConfig};
use crate::criteria::{evaluate_criteria, CriteriaInputs, CriteriaResult};
use crate::error::{EngineError, EngineResult};
use crate::evaluator::CooldownState;
use crate::indicators::{adx, atr, ema, rsi, volume_sma};
use crate::market_data::{TimeframeCandles, INTERVAL_1M};
use crate::scoring::{scorer_for, ScoreInputs, ScoringStrategy};
use crate::targets::{price_targets, PriceTargets};
use crate::trend::market_trend;
use crate::{Candle, Direction, MarketTrend, Symbol};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSnapshot {
    pub symbol: Symbol,
    pub updated_at: DateTime<Utc>,
    pub price: f64,
    pub change_24h_pct: Option<f64>,
    pub rsi_1m: f64,
    pub rsi_5m: f64,
    pub rsi_15m: f64,
    pub ema_fast_period: usize,
    pub ema_slow_period: usize,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub volume: f64,
    pub volume_avg: f64,
    pub volume_ratio: f64,
    pub atr: f64,
    pub adx: f64,
    /// Always within [0, 100]
    pub score: f64,
    pub candle_change_pct: f64,
    pub trend: MarketTrend,
    pub buy_targets: PriceTargets,
    pub sell_targets: PriceTargets,
    pub buy_criteria: CriteriaResult,
    pub sell_criteria: CriteriaResult,
    pub last_signal: Option<CooldownState>,
}

impl SymbolSnapshot {
    pub fn criteria_inputs<'a>(&self, one_minute: &'a [Candle]) -> CriteriaInputs<'a> {
        CriteriaInputs {
            price: self.price,
            rsi_1m: self.rsi_1m,
            rsi_15m: self.rsi_15m,
            ema_fast: self.ema_fast,
            ema_slow: self.ema_slow,
            volume: self.volume,
            volume_avg: self.volume_avg,
            score: self.score,
            candle_change_pct: self.candle_change_pct,
            trend: self.trend,
            one_minute,
        }
    }

    pub fn targets(&self, direction: Direction) -> &PriceTargets {
        match direction {
            Direction::Buy => &self.buy_targets,
            Direction::Sell => &self.sell_targets,
        }
    }

    pub fn criteria(&self, direction: Direction) -> &CriteriaResult {
        match direction {
            Direction::Buy => &self.buy_criteria,
            Direction::Sell => &self.sell_criteria,
        }
    }
}

pub struct SnapshotBuilder {
    indicators: IndicatorConfig,
    gate: GateConfig,
    min_one_minute: usize,
    scorer: Box<dyn ScoringStrategy>,
}

impl SnapshotBuilder {
    pub fn new(config: &Config) -> Self {
        Self::with_scorer(config, scorer_for(&config.scoring))
    }

    pub fn with_scorer(config: &Config, scorer: Box<dyn ScoringStrategy>) -> Self {
        SnapshotBuilder {
            indicators: config.indicators.clone(),
            gate: config.gate.clone(),
            min_one_minute: config.data.min_one_minute_candles,
            scorer,
        }
    }

    /// Compute a fresh snapshot for `symbol` as of `now`
    pub fn build(
        &self,
        symbol: &Symbol,
        frames: &TimeframeCandles,
        now: DateTime<Utc>,
    ) -> EngineResult<SymbolSnapshot> {
        let one = &frames.one_minute;
        if one.len() < self.min_one_minute {
            return Err(EngineError::InsufficientData {
                symbol: symbol.to_string(),
                interval: INTERVAL_1M.to_string(),
                got: one.len(),
                need: self.min_one_minute,
            });
        }
        let Some(last) = one.last() else {
            return Err(EngineError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "empty 1m series".to_string(),
            });
        };

        let closes: Vec<f64> = one.iter().map(|c| c.close).collect();
        let highs: Vec<f64> = one.iter().map(|c| c.high).collect();
        let lows: Vec<f64> = one.iter().map(|c| c.low).collect();
        let volumes: Vec<f64> = one.iter().map(|c| c.volume).collect();

        let period = self.indicators.rsi_period;
        let rsi_1m = rsi(&closes, period);
        let rsi_5m = rsi_or(&frames.five_minute, period, rsi_1m);
        let rsi_15m = rsi_or(&frames.fifteen_minute, period, rsi_5m);

        let tuning = self.indicators.tuning(symbol.asset_class());
        let (fast_period, slow_period) = (tuning.ema_fast, tuning.ema_slow);
        let ema_fast = ema(&closes, fast_period);
        let ema_slow = ema(&closes, slow_period);

        let volume = last.volume;
        let volume_avg = volume_sma(&volumes, self.indicators.volume_sma_period);
        let volume_ratio = if volume_avg > 0.0 {
            volume / volume_avg
        } else {
            0.0
        };

        let atr_value = atr(&highs, &lows, &closes, self.indicators.atr_period);
        let adx_value = adx(&highs, &lows, &closes, self.indicators.adx_period);
        let candle_change_pct = last.change_pct();
        let trend = market_trend(&frames.one_hour, &self.indicators);
        let price = last.close;

        let score = self
            .scorer
            .score(&ScoreInputs {
                price,
                rsi_1m,
                rsi_5m,
                rsi_15m,
                ema_fast,
                ema_slow,
                volume_ratio,
                candle_change_pct,
                atr: atr_value,
                adx: adx_value,
                trend,
                utc_hour: now.hour(),
            })
            .clamp(0.0, 100.0);

        let mut snapshot = SymbolSnapshot {
            symbol: symbol.clone(),
            updated_at: now,
            price,
            change_24h_pct: frames.change_24h_pct,
            rsi_1m,
            rsi_5m,
            rsi_15m,
            ema_fast_period: fast_period,
            ema_slow_period: slow_period,
            ema_fast,
            ema_slow,
            volume,
            volume_avg,
            volume_ratio,
            atr: atr_value,
            adx: adx_value,
            score,
            candle_change_pct,
            trend,
            buy_targets: price_targets(price, atr_value, Direction::Buy, tuning),
            sell_targets: price_targets(price, atr_value, Direction::Sell, tuning),
            buy_criteria: CriteriaResult::empty(Direction::Buy),
            sell_criteria: CriteriaResult::empty(Direction::Sell),
            last_signal: None,
        };

        let inputs = snapshot.criteria_inputs(one);
        snapshot.buy_criteria = evaluate_criteria(Direction::Buy, &inputs, &self.gate);
        snapshot.sell_criteria = evaluate_criteria(Direction::Sell, &inputs, &self.gate);

        debug!(
            "{} snapshot: price={:.4} score={:.1} rsi(1m/5m/15m)={:.1}/{:.1}/{:.1} vol_ratio={:.2} trend={} buy={}/8 sell={}/8",
            symbol,
            price,
            score,
            rsi_1m,
            rsi_5m,
            rsi_15m,
            volume_ratio,
            trend,
            snapshot.buy_criteria.met(),
            snapshot.sell_criteria.met()
        );

        Ok(snapshot)
    }
}

/// RSI of a higher timeframe, or `fallback` when it has too little history
fn rsi_or(candles: &[Candle], period: usize, fallback: f64) -> f64 {
    if candles.len() <= period {
        return fallback;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    rsi(&closes, period)
}
