//! Performance analytics over stored signal records
//!
//! [`PerformanceStats`] summarises a slice of history; [`recommendations`]
//! turns the recent part of it into threshold advice.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Timelike, Utc};
use itertools::Itertools;
use serde::Serialize;
use statrs::statistics::Statistics;

use crate::criteria::PRIMARY_CRITERIA;
use crate::record::{Outcome, SignalRecord};
use crate::{AssetClass, Config};

/// Win/loss summary for one slice of the history
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupStats {
    pub label: String,
    pub signals: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub avg_return_pct: f64,
    pub avg_minutes_to_resolution: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PerformanceStats {
    pub total_signals: usize,
    pub wins: usize,
    pub losses: usize,
    pub expired: usize,
    pub pending: usize,
    /// wins / (wins + losses) × 100
    pub win_rate: f64,
    pub avg_return_pct: f64,
    pub return_std_pct: f64,
    pub best_return_pct: f64,
    pub worst_return_pct: f64,
    pub net_return_pct: f64,
    pub profit_factor: f64,
    pub avg_score: f64,
    pub avg_minutes_to_resolution: f64,
    pub by_score_bucket: Vec<GroupStats>,
    pub by_symbol: Vec<GroupStats>,
    /// UTC hours with at least two signals
    pub by_hour: Vec<GroupStats>,
    /// Resolved signals by how many of the eight criteria held, most first
    pub by_criteria_met: Vec<GroupStats>,
    /// Resolved signals by outcome, most frequent first
    pub by_outcome: Vec<GroupStats>,
    /// Positive for a run of wins, negative for a run of losses
    pub current_streak: i64,
    pub max_win_streak: usize,
    pub max_loss_streak: usize,
}

const SCORE_BUCKETS: [(&str, f64); 6] = [
    ("90-100", 90.0),
    ("85-89", 85.0),
    ("80-84", 80.0),
    ("70-79", 70.0),
    ("60-69", 60.0),
    ("<60", f64::NEG_INFINITY),
];

fn score_bucket(score: f64) -> usize {
    SCORE_BUCKETS
        .iter()
        .position(|(_, floor)| score >= *floor)
        .unwrap_or(SCORE_BUCKETS.len() - 1)
}

fn win_rate(wins: usize, losses: usize) -> f64 {
    if wins + losses == 0 {
        0.0
    } else {
        wins as f64 / (wins + losses) as f64 * 100.0
    }
}

fn mean_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().mean()
    }
}

fn group(label: String, records: &[&SignalRecord]) -> GroupStats {
    let wins = records.iter().filter(|r| r.outcome.is_win()).count();
    let losses = records.iter().filter(|r| r.outcome.is_loss()).count();
    let returns: Vec<f64> = records.iter().filter_map(|r| r.actual_return_pct).collect();
    let minutes: Vec<f64> = records
        .iter()
        .filter_map(|r| r.minutes_to_resolution)
        .map(|m| m as f64)
        .collect();
    GroupStats {
        label,
        signals: records.len(),
        wins,
        losses,
        win_rate: win_rate(wins, losses),
        avg_return_pct: mean_or_zero(&returns),
        avg_minutes_to_resolution: mean_or_zero(&minutes),
    }
}

/// (current signed streak, max win streak, max loss streak); expired records are skipped
fn streaks(records: &[SignalRecord]) -> (i64, usize, usize) {
    let mut current: i64 = 0;
    let mut max_win = 0;
    let mut max_loss = 0;

    let resolved = records
        .iter()
        .filter(|r| r.outcome.is_win() || r.outcome.is_loss())
        .sorted_by_key(|r| r.timestamp);

    for record in resolved {
        if record.outcome.is_win() {
            current = if current > 0 { current + 1 } else { 1 };
            max_win = max_win.max(current as usize);
        } else {
            current = if current < 0 { current - 1 } else { -1 };
            max_loss = max_loss.max(current.unsigned_abs() as usize);
        }
    }

    (current, max_win, max_loss)
}

impl PerformanceStats {
    pub fn from_records(records: &[SignalRecord]) -> Self {
        if records.is_empty() {
            return PerformanceStats::default();
        }

        let count = |o: Outcome| records.iter().filter(|r| r.outcome == o).count();
        let wins = records.iter().filter(|r| r.outcome.is_win()).count();
        let losses = records.iter().filter(|r| r.outcome.is_loss()).count();

        let returns: Vec<f64> = records
            .iter()
            .filter(|r| r.outcome.is_terminal())
            .filter_map(|r| r.actual_return_pct)
            .collect();
        let gains: f64 = returns.iter().filter(|r| **r > 0.0).sum();
        let pains: f64 = returns.iter().filter(|r| **r < 0.0).map(|r| r.abs()).sum();
        let profit_factor = if pains > 0.0 {
            gains / pains
        } else if gains > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        let scores: Vec<f64> = records.iter().map(|r| r.score).collect();
        let minutes: Vec<f64> = records
            .iter()
            .filter_map(|r| r.minutes_to_resolution)
            .map(|m| m as f64)
            .collect();

        let by_bucket = records.iter().into_group_map_by(|r| score_bucket(r.score));
        let by_score_bucket = (0..SCORE_BUCKETS.len())
            .filter_map(|i| {
                by_bucket
                    .get(&i)
                    .map(|rs| group(SCORE_BUCKETS[i].0.to_string(), rs))
            })
            .collect();

        let by_symbol: HashMap<_, Vec<&SignalRecord>> =
            records.iter().into_group_map_by(|r| r.symbol.clone());
        let by_symbol = by_symbol
            .into_iter()
            .sorted_by(|a, b| a.0.cmp(&b.0))
            .map(|(symbol, rs)| group(symbol.to_string(), &rs))
            .collect();

        let by_hour = records
            .iter()
            .into_group_map_by(|r| r.timestamp.hour())
            .into_iter()
            .filter(|(_, rs)| rs.len() >= 2)
            .sorted_by_key(|(hour, _)| *hour)
            .map(|(hour, rs)| group(format!("{:02}:00", hour), &rs))
            .collect();

        let resolved = || records.iter().filter(|r| r.outcome.is_terminal());

        let by_criteria_met = resolved()
            .into_group_map_by(|r| r.criteria_met)
            .into_iter()
            .sorted_by(|a, b| b.0.cmp(&a.0))
            .map(|(met, rs)| group(format!("{}/{}", met, PRIMARY_CRITERIA), &rs))
            .collect();

        let by_outcome = resolved()
            .into_group_map_by(|r| r.outcome)
            .into_iter()
            .sorted_by(|a, b| {
                b.1.len()
                    .cmp(&a.1.len())
                    .then_with(|| a.0.as_str().cmp(b.0.as_str()))
            })
            .map(|(outcome, rs)| group(outcome.as_str().to_string(), &rs))
            .collect();

        let (current_streak, max_win_streak, max_loss_streak) = streaks(records);

        PerformanceStats {
            total_signals: records.len(),
            wins,
            losses,
            expired: count(Outcome::Expired),
            pending: count(Outcome::Pending),
            win_rate: win_rate(wins, losses),
            avg_return_pct: mean_or_zero(&returns),
            return_std_pct: if returns.len() > 1 {
                returns.iter().std_dev()
            } else {
                0.0
            },
            best_return_pct: returns.iter().copied().fold(0.0, f64::max),
            worst_return_pct: returns.iter().copied().fold(0.0, f64::min),
            net_return_pct: returns.iter().sum(),
            profit_factor,
            avg_score: mean_or_zero(&scores),
            avg_minutes_to_resolution: mean_or_zero(&minutes),
            by_score_bucket,
            by_symbol,
            by_hour,
            by_criteria_met,
            by_outcome,
            current_streak,
            max_win_streak,
            max_loss_streak,
        }
    }
}

// =============================================================================
// Threshold advice
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Adjustment {
    RaiseScoreBar,
    LowerScoreBar,
    ShortenTimeout,
    WidenTakeProfit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub adjustment: Adjustment,
    /// The window metric that triggered the advice
    pub observed: f64,
    pub message: String,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Advice from the signals resolved in the last `advisor.window_hours`
///
/// Empty when the window holds fewer than `advisor.min_signals` resolved
/// signals. Win rate drives the score bar, average resolution time the
/// expiry, and average return the take-profit distance.
pub fn recommendations(
    records: &[SignalRecord],
    now: DateTime<Utc>,
    config: &Config,
) -> Vec<Recommendation> {
    let advisor = &config.advisor;
    let since = now - Duration::hours(advisor.window_hours);
    let recent: Vec<SignalRecord> = records
        .iter()
        .filter(|r| r.outcome.is_terminal() && r.timestamp > since)
        .cloned()
        .collect();
    if recent.len() < advisor.min_signals.max(1) {
        return Vec::new();
    }

    let stats = PerformanceStats::from_records(&recent);
    let mut advice = Vec::new();

    let bar = config.dispatch.notify_min_score;
    if stats.win_rate < advisor.low_win_rate_pct {
        advice.push(Recommendation {
            adjustment: Adjustment::RaiseScoreBar,
            observed: stats.win_rate,
            message: format!(
                "win rate {:.1}% below {:.0}%: raise dispatch.notify_min_score {:.0} -> {:.0}",
                stats.win_rate,
                advisor.low_win_rate_pct,
                bar,
                (bar + advisor.score_step).min(100.0)
            ),
        });
    } else if stats.win_rate > advisor.high_win_rate_pct {
        advice.push(Recommendation {
            adjustment: Adjustment::LowerScoreBar,
            observed: stats.win_rate,
            message: format!(
                "win rate {:.1}% above {:.0}%: lower dispatch.notify_min_score {:.0} -> {:.0}",
                stats.win_rate,
                advisor.high_win_rate_pct,
                bar,
                (bar - advisor.score_step).max(0.0)
            ),
        });
    }

    if stats.avg_minutes_to_resolution > advisor.max_avg_minutes {
        let expiry = config.outcome.scheduled.expire_after_minutes;
        advice.push(Recommendation {
            adjustment: Adjustment::ShortenTimeout,
            observed: stats.avg_minutes_to_resolution,
            message: format!(
                "avg resolution {:.0} min above {:.0}: shorten outcome.scheduled.expire_after_minutes {} -> {:.0}",
                stats.avg_minutes_to_resolution,
                advisor.max_avg_minutes,
                expiry,
                advisor.max_avg_minutes.min(expiry as f64)
            ),
        });
    }

    if stats.avg_return_pct < advisor.min_avg_return_pct {
        let factor = advisor.take_profit_widen_factor;
        let classes = [AssetClass::Btc, AssetClass::Eth, AssetClass::Alt]
            .iter()
            .map(|class| {
                let tp = config.indicators.tuning(*class).tp_atr_multiplier;
                format!("{:?} {:.2} -> {:.2}", class, tp, tp * factor)
            })
            .join(", ");
        advice.push(Recommendation {
            adjustment: Adjustment::WidenTakeProfit,
            observed: stats.avg_return_pct,
            message: format!(
                "avg return {:.2}% below {:.2}%: widen tp_atr_multiplier x{:.2} ({})",
                stats.avg_return_pct, advisor.min_avg_return_pct, factor, classes
            ),
        });
    }

    advice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::CriteriaResult;
    use crate::{Direction, MarketTrend, Symbol};
    use approx::assert_relative_eq;
    use chrono::{DateTime, Duration};

    fn rec(minute: i64, symbol: &str, score: f64, outcome: Outcome, ret: Option<f64>) -> SignalRecord {
        SignalRecord {
            id: Some(minute),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::minutes(minute),
            symbol: Symbol::new(symbol),
            direction: Direction::Buy,
            entry_price: 100.0,
            score,
            criteria_met: 6,
            total_criteria: 8,
            rsi_1m: 50.0,
            rsi_5m: 50.0,
            rsi_15m: 50.0,
            ema_fast: 100.0,
            ema_slow: 100.0,
            volume_ratio: 1.0,
            atr: 1.0,
            adx: 25.0,
            candle_change_pct: 0.0,
            take_profit: 102.5,
            stop_loss: 98.8,
            expected_move_pct: 2.5,
            risk_reward: 2.08,
            market_trend: MarketTrend::Bullish,
            criteria: CriteriaResult::empty(Direction::Buy),
            notified: false,
            outcome,
            exit_price: None,
            exit_timestamp: None,
            actual_return_pct: ret,
            minutes_to_resolution: ret.map(|_| 30),
            notes: None,
        }
    }

    fn history() -> Vec<SignalRecord> {
        vec![
            rec(0, "BTCUSDT", 96.0, Outcome::WinTp, Some(2.0)),
            rec(10, "BTCUSDT", 91.0, Outcome::LossSl, Some(-1.0)),
            rec(20, "ETHUSDT", 82.0, Outcome::WinTime, Some(1.0)),
            rec(30, "ETHUSDT", 72.0, Outcome::WinTp, Some(3.0)),
            rec(40, "SOLUSDT", 65.0, Outcome::Expired, Some(0.1)),
            rec(50, "SOLUSDT", 55.0, Outcome::Pending, None),
        ]
    }

    #[test]
    fn test_totals() {
        let stats = PerformanceStats::from_records(&history());
        assert_eq!(stats.total_signals, 6);
        assert_eq!((stats.wins, stats.losses, stats.expired, stats.pending), (3, 1, 1, 1));
        assert_relative_eq!(stats.win_rate, 75.0);
        assert_relative_eq!(stats.net_return_pct, 5.1, epsilon = 1e-9);
        assert_relative_eq!(stats.avg_return_pct, 1.02, epsilon = 1e-9);
        assert_relative_eq!(stats.best_return_pct, 3.0);
        assert_relative_eq!(stats.worst_return_pct, -1.0);
        assert_relative_eq!(stats.profit_factor, 6.1, epsilon = 1e-9);
        assert!(stats.return_std_pct > 0.0);
    }

    #[test]
    fn test_breakdowns() {
        let stats = PerformanceStats::from_records(&history());
        let labels: Vec<&str> = stats.by_score_bucket.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(labels, vec!["90-100", "80-84", "70-79", "60-69", "<60"]);
        assert_eq!(stats.by_score_bucket[0].signals, 2);
        assert_relative_eq!(stats.by_score_bucket[0].win_rate, 50.0);

        let symbols: Vec<&str> = stats.by_symbol.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(symbols, vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]);
        assert_relative_eq!(stats.by_symbol[1].win_rate, 100.0);

        // 22:13..22:53 UTC; the lone 23:03 signal is below the two-signal floor
        assert_eq!(stats.by_hour.len(), 1);
        assert_eq!(stats.by_hour[0].label, "22:00");
        assert_eq!(stats.by_hour[0].signals, 5);
    }

    #[test]
    fn test_criteria_and_outcome_breakdowns() {
        let mut records = history();
        records[0].criteria_met = 8;
        records[1].criteria_met = 8;
        records[2].minutes_to_resolution = Some(90);
        let stats = PerformanceStats::from_records(&records);

        // the pending record is left out of both
        let met: Vec<(&str, usize)> = stats
            .by_criteria_met
            .iter()
            .map(|g| (g.label.as_str(), g.signals))
            .collect();
        assert_eq!(met, vec![("8/8", 2), ("6/8", 3)]);
        assert_relative_eq!(stats.by_criteria_met[0].win_rate, 50.0);
        assert_relative_eq!(stats.by_criteria_met[1].win_rate, 100.0);
        assert_relative_eq!(stats.by_criteria_met[1].avg_return_pct, 4.1 / 3.0, epsilon = 1e-9);

        let outcomes: Vec<(&str, usize)> = stats
            .by_outcome
            .iter()
            .map(|g| (g.label.as_str(), g.signals))
            .collect();
        assert_eq!(
            outcomes,
            vec![("WIN_TP", 2), ("EXPIRED", 1), ("LOSS_SL", 1), ("WIN_TIME", 1)]
        );
        assert_relative_eq!(stats.by_outcome[0].avg_return_pct, 2.5);
        assert_relative_eq!(stats.by_outcome[3].avg_minutes_to_resolution, 90.0);
    }

    fn window(wins: usize, losses: usize, win_ret: f64, loss_ret: f64, minutes: i64) -> Vec<SignalRecord> {
        (0..wins + losses)
            .map(|i| {
                let (outcome, ret) = if i < wins {
                    (Outcome::WinTp, win_ret)
                } else {
                    (Outcome::LossSl, loss_ret)
                };
                let mut r = rec(i as i64, "BTCUSDT", 92.0, outcome, Some(ret));
                r.minutes_to_resolution = Some(minutes);
                r
            })
            .collect()
    }

    fn advised_at() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap() + Duration::hours(2)
    }

    #[test]
    fn test_recommendations_for_weak_window() {
        // 30% win rate, -0.1% average return, quick resolutions
        let advice = recommendations(&window(6, 14, 2.0, -1.0, 30), advised_at(), &Config::default());
        let kinds: Vec<Adjustment> = advice.iter().map(|r| r.adjustment).collect();
        assert_eq!(kinds, vec![Adjustment::RaiseScoreBar, Adjustment::WidenTakeProfit]);
        assert_relative_eq!(advice[0].observed, 30.0);
        assert!(advice[0].message.ends_with("90 -> 95"));
        assert_relative_eq!(advice[1].observed, -0.1, epsilon = 1e-9);
        assert!(advice[1].to_string().contains("Btc 2.50 -> 2.75"));
    }

    #[test]
    fn test_recommendations_for_strong_slow_window() {
        // 75% win rate, 0.625% average return, 150 minute resolutions
        let advice = recommendations(&window(15, 5, 1.0, -0.5, 150), advised_at(), &Config::default());
        let kinds: Vec<Adjustment> = advice.iter().map(|r| r.adjustment).collect();
        assert_eq!(kinds, vec![Adjustment::LowerScoreBar, Adjustment::ShortenTimeout]);
        assert!(advice[0].message.ends_with("90 -> 85"));
        assert!(advice[1].message.ends_with("180 -> 120"));
    }

    #[test]
    fn test_recommendations_need_enough_recent_signals() {
        let config = Config::default();
        let weak = window(6, 14, 2.0, -1.0, 30);
        assert!(recommendations(&weak[..19], advised_at(), &config).is_empty());

        // all twenty fell out of the 24h window
        let later = advised_at() + Duration::hours(30);
        assert!(recommendations(&weak, later, &config).is_empty());

        // pending records do not count toward the minimum
        let mut mixed = weak.clone();
        mixed[0].outcome = Outcome::Pending;
        assert!(recommendations(&mixed, advised_at(), &config).is_empty());
    }

    #[test]
    fn test_streaks() {
        let stats = PerformanceStats::from_records(&history());
        assert_eq!(stats.current_streak, 2);
        assert_eq!(stats.max_win_streak, 2);
        assert_eq!(stats.max_loss_streak, 1);

        let losing = vec![
            rec(0, "BTCUSDT", 90.0, Outcome::LossSl, Some(-1.0)),
            rec(1, "BTCUSDT", 90.0, Outcome::LossTime, Some(-0.5)),
        ];
        assert_eq!(PerformanceStats::from_records(&losing).current_streak, -2);
    }

    #[test]
    fn test_empty_history() {
        assert_eq!(PerformanceStats::from_records(&[]), PerformanceStats::default());
    }
}
