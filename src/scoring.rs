//! Confidence scoring
//!
//! The score is a weighted heuristic in `[0, 100]`, not a calibrated
//! probability. It sits behind [`ScoringStrategy`] so the gate and cooldown
//! logic never depend on a particular formula.

use serde::{Deserialize, Serialize};

use crate::config::{ScoringConfig, ScoringModel, SessionConfig};
use crate::MarketTrend;

/// Indicator readings a scoring strategy may look at
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreInputs {
    pub price: f64,
    pub rsi_1m: f64,
    pub rsi_5m: f64,
    pub rsi_15m: f64,
    pub ema_fast: f64,
    pub ema_slow: f64,
    pub volume_ratio: f64,
    pub candle_change_pct: f64,
    pub atr: f64,
    pub adx: f64,
    pub trend: MarketTrend,
    /// Hour of day in UTC, 0..=23
    pub utc_hour: u32,
}

impl ScoreInputs {
    pub fn atr_pct(&self) -> f64 {
        if self.price > 0.0 {
            self.atr / self.price * 100.0
        } else {
            0.0
        }
    }
}

/// Pluggable scoring formula
pub trait ScoringStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Score in `[0, 100]`
    fn score(&self, inputs: &ScoreInputs) -> f64;
}

/// Build the configured scoring strategy
pub fn scorer_for(config: &ScoringConfig) -> Box<dyn ScoringStrategy> {
    match config.model {
        ScoringModel::Realistic => Box::new(RealisticScalpingScore {
            sessions: config.sessions.clone(),
            ..RealisticScalpingScore::default()
        }),
        ScoringModel::Classic => Box::new(ClassicConfidenceScore),
    }
}

/// Canonical score with the default weights
pub fn confidence_score(inputs: &ScoreInputs) -> f64 {
    RealisticScalpingScore::default().score(inputs)
}

// =============================================================================
// Realistic scalping score
// =============================================================================

/// Five weighted sub-scores, each direction-symmetric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealisticScalpingScore {
    pub momentum_aligned: f64,
    pub momentum_partial: f64,
    pub momentum_coherent: f64,
    /// Max spread between the three RSI readings to count as coherent
    pub coherence_spread: f64,
    pub rsi_zone_bonus: f64,
    pub rsi_zone: (f64, f64),
    /// (ratio threshold, points), checked top down with `>`
    pub volume_tiers: Vec<(f64, f64)>,
    pub ema_alignment: f64,
    pub price_vs_ema: f64,
    pub candle_confirmation: f64,
    pub candle_threshold_pct: f64,
    pub volatility_sweet_spot: (f64, f64),
    pub volatility_tolerable: (f64, f64),
    pub volatility_full: f64,
    pub volatility_partial: f64,
    pub sessions: SessionConfig,
}

impl Default for RealisticScalpingScore {
    fn default() -> Self {
        RealisticScalpingScore {
            momentum_aligned: 20.0,
            momentum_partial: 10.0,
            momentum_coherent: 10.0,
            coherence_spread: 15.0,
            rsi_zone_bonus: 5.0,
            rsi_zone: (30.0, 70.0),
            volume_tiers: vec![(2.0, 30.0), (1.5, 22.0), (1.2, 15.0), (1.0, 8.0)],
            ema_alignment: 10.0,
            price_vs_ema: 8.0,
            candle_confirmation: 7.0,
            candle_threshold_pct: 0.1,
            volatility_sweet_spot: (0.5, 3.0),
            volatility_tolerable: (0.25, 5.0),
            volatility_full: 10.0,
            volatility_partial: 5.0,
            sessions: SessionConfig::default(),
        }
    }
}

impl RealisticScalpingScore {
    /// Momentum alignment across 1m/5m/15m plus the RSI zone bonus (max 35)
    pub fn momentum(&self, inputs: &ScoreInputs) -> f64 {
        let readings = [inputs.rsi_1m, inputs.rsi_5m, inputs.rsi_15m];
        let above = readings.iter().filter(|&&r| r > 50.0).count();
        let below = readings.iter().filter(|&&r| r < 50.0).count();

        let with_1m = if inputs.rsi_1m > 50.0 {
            above
        } else if inputs.rsi_1m < 50.0 {
            below
        } else {
            0
        };

        let mut points = match with_1m {
            3 => self.momentum_aligned,
            2 => self.momentum_partial,
            _ => 0.0,
        };

        if points > 0.0 {
            let max = readings.iter().cloned().fold(f64::MIN, f64::max);
            let min = readings.iter().cloned().fold(f64::MAX, f64::min);
            if max - min <= self.coherence_spread {
                points += self.momentum_coherent;
            }
        }

        let (lo, hi) = self.rsi_zone;
        if (lo..=hi).contains(&inputs.rsi_1m) {
            points += self.rsi_zone_bonus;
        }

        points
    }

    pub fn volume(&self, inputs: &ScoreInputs) -> f64 {
        self.volume_tiers
            .iter()
            .find(|(threshold, _)| inputs.volume_ratio > *threshold)
            .map(|(_, points)| *points)
            .unwrap_or(0.0)
    }

    /// EMA alignment, price beyond EMA-fast and candle direction, best side wins
    pub fn price_action(&self, inputs: &ScoreInputs) -> f64 {
        let side = |ema_ok: bool, price_ok: bool, candle_ok: bool| {
            let mut points = 0.0;
            if ema_ok {
                points += self.ema_alignment;
            }
            if price_ok {
                points += self.price_vs_ema;
            }
            if candle_ok {
                points += self.candle_confirmation;
            }
            points
        };

        let bullish = side(
            inputs.ema_fast > inputs.ema_slow,
            inputs.price > inputs.ema_fast,
            inputs.candle_change_pct > self.candle_threshold_pct,
        );
        let bearish = side(
            inputs.ema_fast < inputs.ema_slow,
            inputs.price < inputs.ema_fast,
            inputs.candle_change_pct < -self.candle_threshold_pct,
        );

        bullish.max(bearish)
    }

    pub fn volatility(&self, inputs: &ScoreInputs) -> f64 {
        let atr_pct = inputs.atr_pct();
        let (sweet_lo, sweet_hi) = self.volatility_sweet_spot;
        let (ok_lo, ok_hi) = self.volatility_tolerable;

        if (sweet_lo..=sweet_hi).contains(&atr_pct) {
            self.volatility_full
        } else if (ok_lo..=ok_hi).contains(&atr_pct) {
            self.volatility_partial
        } else {
            0.0
        }
    }

    /// Liquidity bonus by UTC session
    pub fn time_of_day(&self, utc_hour: u32) -> f64 {
        self.sessions.points(utc_hour)
    }
}

impl ScoringStrategy for RealisticScalpingScore {
    fn name(&self) -> &'static str {
        "realistic"
    }

    fn score(&self, inputs: &ScoreInputs) -> f64 {
        let total = self.momentum(inputs)
            + self.volume(inputs)
            + self.price_action(inputs)
            + self.volatility(inputs)
            + self.time_of_day(inputs.utc_hour);

        if total.is_nan() {
            return 0.0;
        }
        total.clamp(0.0, 100.0)
    }
}

// =============================================================================
// Classic confidence score
// =============================================================================

/// Earlier band-based formula: RSI bands, volume, ADX and macro trend
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassicConfidenceScore;

impl ClassicConfidenceScore {
    fn rsi_band(rsi: f64) -> f64 {
        if (30.0..=70.0).contains(&rsi) {
            25.0
        } else if (25.0..=75.0).contains(&rsi) {
            15.0
        } else if (20.0..=80.0).contains(&rsi) {
            10.0
        } else {
            0.0
        }
    }
}

impl ScoringStrategy for ClassicConfidenceScore {
    fn name(&self) -> &'static str {
        "classic"
    }

    fn score(&self, inputs: &ScoreInputs) -> f64 {
        let mut score = Self::rsi_band(inputs.rsi_1m) + Self::rsi_band(inputs.rsi_15m);

        score += if inputs.volume_ratio > 1.5 {
            20.0
        } else if inputs.volume_ratio > 1.2 {
            15.0
        } else if inputs.volume_ratio > 1.0 {
            10.0
        } else {
            0.0
        };

        score += if inputs.adx > 40.0 {
            15.0
        } else if inputs.adx > 25.0 {
            10.0
        } else if inputs.adx > 20.0 {
            5.0
        } else {
            0.0
        };

        if inputs.trend != MarketTrend::Sideways {
            score += 15.0;
        }

        score.clamp(0.0, 100.0)
    }
}
