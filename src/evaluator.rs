//! BUY/SELL gate
//!
//! A direction passes when enough of its eight criteria hold for the current
//! trend, the trend filter does not reject it, and the distance filter
//! (score-tiered cooldown plus minimum price move) allows another signal for
//! the symbol.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{CooldownConfig, GateConfig};
use crate::criteria::{evaluate_criteria, required_count, CriteriaResult, DistanceCheck};
use crate::snapshot::SymbolSnapshot;
use crate::{Candle, Direction, MarketTrend, Symbol};

/// Last accepted signal for a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownState {
    pub direction: Direction,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub score: f64,
}

/// Per-symbol cooldown bookkeeping, written only when a gate passes
pub type CooldownBook = HashMap<Symbol, CooldownState>;

/// Full record of one gate evaluation. The distance check travels inside
/// `criteria` as `Signal_distance`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateDecision {
    pub direction: Direction,
    pub trend: MarketTrend,
    pub criteria: CriteriaResult,
    pub met: usize,
    pub required: usize,
    pub trend_rejected: bool,
    pub passed: bool,
}

impl GateDecision {
    pub fn distance_ok(&self) -> bool {
        self.criteria.signal_distance.as_ref().is_some_and(|d| d.passed)
    }
}

pub struct SignalEvaluator {
    gate: GateConfig,
    cooldown: CooldownConfig,
}

impl SignalEvaluator {
    pub fn new(gate: GateConfig, cooldown: CooldownConfig) -> Self {
        SignalEvaluator { gate, cooldown }
    }

    /// Whether another signal for `symbol` is allowed at `price` right now
    pub fn check_distance(
        &self,
        book: &CooldownBook,
        symbol: &Symbol,
        price: f64,
        score: f64,
        now: DateTime<Utc>,
    ) -> (bool, String) {
        let Some(last) = book.get(symbol) else {
            return (true, "no previous signal".to_string());
        };

        let window = self.cooldown.window_for(score);
        let elapsed = now - last.timestamp;
        if elapsed < window {
            let remaining = (window - elapsed).num_seconds().max(0);
            return (
                false,
                format!(
                    "cooldown active: {}m{}s left of {}m (score {:.1})",
                    remaining / 60,
                    remaining % 60,
                    window.num_minutes(),
                    score
                ),
            );
        }

        if last.price <= 0.0 {
            return (true, "previous price unknown".to_string());
        }
        let moved = (price - last.price).abs() / last.price * 100.0;
        if moved < self.cooldown.min_price_move_pct {
            return (
                false,
                format!(
                    "price moved {:.2}% since last signal (min {:.2}%)",
                    moved, self.cooldown.min_price_move_pct
                ),
            );
        }

        (true, format!("price moved {:.2}%", moved))
    }

    /// Trend filter: BUY only in BULLISH, SELL never in BULLISH
    fn trend_rejects(&self, direction: Direction, trend: MarketTrend) -> bool {
        if !self.gate.trend_filter {
            return false;
        }
        match direction {
            Direction::Buy => trend != MarketTrend::Bullish,
            Direction::Sell => trend == MarketTrend::Bullish,
        }
    }

    pub fn evaluate(
        &self,
        direction: Direction,
        snapshot: &SymbolSnapshot,
        one_minute: &[Candle],
        book: &CooldownBook,
        now: DateTime<Utc>,
    ) -> GateDecision {
        let trend = snapshot.trend;
        let mut criteria =
            evaluate_criteria(direction, &snapshot.criteria_inputs(one_minute), &self.gate);
        let met = criteria.met();
        let required = required_count(direction, trend, &self.gate);
        let trend_rejected = self.trend_rejects(direction, trend);
        let (distance_ok, distance_reason) =
            self.check_distance(book, &snapshot.symbol, snapshot.price, snapshot.score, now);

        let passed = !trend_rejected && met >= required && distance_ok;

        debug!(
            "{} {}: {}/{} criteria (need {}), trend {}{}, distance {} ({}) => {}",
            direction,
            snapshot.symbol,
            met,
            criteria.total(),
            required,
            trend,
            if trend_rejected { " rejected" } else { "" },
            if distance_ok { "ok" } else { "blocked" },
            distance_reason,
            if passed { "PASS" } else { "no signal" }
        );

        criteria.signal_distance = Some(DistanceCheck {
            passed: distance_ok,
            reason: distance_reason,
        });

        GateDecision {
            direction,
            trend,
            criteria,
            met,
            required,
            trend_rejected,
            passed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn evaluator() -> SignalEvaluator {
        SignalEvaluator::new(GateConfig::default(), CooldownConfig::default())
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn book_with(symbol: &Symbol, price: f64, score: f64) -> CooldownBook {
        let mut book = CooldownBook::new();
        book.insert(
            symbol.clone(),
            CooldownState {
                direction: Direction::Buy,
                price,
                timestamp: t0(),
                score,
            },
        );
        book
    }

    #[test]
    fn test_first_signal_is_allowed() {
        let (ok, reason) =
            evaluator().check_distance(&CooldownBook::new(), &Symbol::new("BTCUSDT"), 100.0, 96.0, t0());
        assert!(ok);
        assert_eq!(reason, "no previous signal");
    }

    #[test]
    fn test_ultra_score_cooldown_boundary() {
        let symbol = Symbol::new("BTCUSDT");
        let book = book_with(&symbol, 100.0, 96.0);
        let ev = evaluator();

        let (early, _) = ev.check_distance(&book, &symbol, 101.0, 96.0, t0() + Duration::minutes(4));
        assert!(!early);
        let (later, _) = ev.check_distance(&book, &symbol, 101.0, 96.0, t0() + Duration::minutes(6));
        assert!(later);
    }

    #[test]
    fn test_cooldown_uses_current_score() {
        let symbol = Symbol::new("ETHUSDT");
        let book = book_with(&symbol, 100.0, 96.0);
        let ev = evaluator();
        // 10 minutes is past the ultra window but inside the 15m high-score window
        let at = t0() + Duration::minutes(10);
        assert!(ev.check_distance(&book, &symbol, 101.0, 96.0, at).0);
        assert!(!ev.check_distance(&book, &symbol, 101.0, 91.0, at).0);
        assert!(!ev.check_distance(&book, &symbol, 101.0, 80.0, at).0);
    }

    #[test]
    fn test_identical_price_rejected_after_cooldown() {
        let symbol = Symbol::new("SOLUSDT");
        let book = book_with(&symbol, 150.0, 96.0);
        let (ok, reason) =
            evaluator().check_distance(&book, &symbol, 150.0, 96.0, t0() + Duration::hours(2));
        assert!(!ok);
        assert!(reason.contains("0.00%"));

        let (small, _) =
            evaluator().check_distance(&book, &symbol, 150.6, 96.0, t0() + Duration::hours(2));
        assert!(!small);
        let (enough, _) =
            evaluator().check_distance(&book, &symbol, 149.0, 96.0, t0() + Duration::hours(2));
        assert!(enough);
    }

    #[test]
    fn test_trend_filter() {
        let ev = evaluator();
        assert!(ev.trend_rejects(Direction::Buy, MarketTrend::Sideways));
        assert!(ev.trend_rejects(Direction::Buy, MarketTrend::Bearish));
        assert!(!ev.trend_rejects(Direction::Buy, MarketTrend::Bullish));
        assert!(ev.trend_rejects(Direction::Sell, MarketTrend::Bullish));
        assert!(!ev.trend_rejects(Direction::Sell, MarketTrend::Sideways));
        assert!(!ev.trend_rejects(Direction::Sell, MarketTrend::Bearish));

        let gate = GateConfig {
            trend_filter: false,
            ..GateConfig::default()
        };
        let open = SignalEvaluator::new(gate, CooldownConfig::default());
        assert!(!open.trend_rejects(Direction::Buy, MarketTrend::Bearish));
        assert!(!open.trend_rejects(Direction::Sell, MarketTrend::Bullish));
    }
}
