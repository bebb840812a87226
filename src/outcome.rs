//! Outcome resolution for pending signals
//!
//! A pending record is resolved against the current price in a fixed order:
//! TP/SL crossing, decisive return, soft return (after the soft delay), and
//! finally expiry. Two policies exist: the periodic `scheduled` one and the
//! more aggressive `forced` one used by the administrative trigger.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::market_data::CandleSource;
use crate::record::{Outcome, Resolution, SignalRecord};
use crate::store::SignalStore;
use crate::{Direction, Symbol};

/// Return thresholds (percent) and age thresholds (minutes)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomePolicy {
    pub decisive_win_pct: f64,
    pub decisive_loss_pct: f64,
    pub decisive_after_minutes: i64,
    pub soft_win_pct: f64,
    pub soft_loss_pct: f64,
    pub soft_after_minutes: i64,
    pub expire_after_minutes: i64,
}

impl OutcomePolicy {
    pub fn scheduled() -> Self {
        OutcomePolicy {
            decisive_win_pct: 1.2,
            decisive_loss_pct: -0.8,
            decisive_after_minutes: 60,
            soft_win_pct: 0.4,
            soft_loss_pct: -0.3,
            soft_after_minutes: 60,
            expire_after_minutes: 180,
        }
    }

    pub fn forced() -> Self {
        OutcomePolicy {
            decisive_after_minutes: 0,
            expire_after_minutes: 120,
            ..Self::scheduled()
        }
    }
}

impl Default for OutcomePolicy {
    fn default() -> Self {
        Self::scheduled()
    }
}

fn tp_crossed(record: &SignalRecord, price: f64) -> bool {
    match record.direction {
        Direction::Buy => price >= record.take_profit,
        Direction::Sell => price <= record.take_profit,
    }
}

fn sl_crossed(record: &SignalRecord, price: f64) -> bool {
    match record.direction {
        Direction::Buy => price <= record.stop_loss,
        Direction::Sell => price >= record.stop_loss,
    }
}

/// Decide a terminal outcome for `record` at `price`, or `None` to keep waiting
///
/// Terminal records are never re-resolved.
pub fn resolve(
    record: &SignalRecord,
    price: f64,
    now: DateTime<Utc>,
    policy: &OutcomePolicy,
) -> Option<Resolution> {
    if record.outcome.is_terminal() || price <= 0.0 {
        return None;
    }

    let age = (now - record.timestamp).num_minutes();
    let ret = record.return_at(price);

    let outcome = if tp_crossed(record, price) {
        Outcome::WinTp
    } else if sl_crossed(record, price) {
        Outcome::LossSl
    } else if age >= policy.decisive_after_minutes && ret >= policy.decisive_win_pct {
        Outcome::WinTime
    } else if age >= policy.decisive_after_minutes && ret <= policy.decisive_loss_pct {
        Outcome::LossTime
    } else if age >= policy.soft_after_minutes && ret >= policy.soft_win_pct {
        Outcome::WinTime
    } else if age >= policy.soft_after_minutes && ret <= policy.soft_loss_pct {
        Outcome::LossTime
    } else if age >= policy.expire_after_minutes {
        Outcome::Expired
    } else {
        return None;
    };

    Some(Resolution {
        outcome,
        exit_price: price,
        exit_timestamp: now,
        actual_return_pct: ret,
        minutes_to_resolution: age.max(0),
    })
}

/// Counts from one pass over the pending records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    pub checked: usize,
    pub resolved: usize,
    pub still_pending: usize,
    pub price_failures: usize,
}

/// Polls current prices and closes out pending records in the store
pub struct OutcomeTracker {
    store: Arc<dyn SignalStore>,
    scheduled: OutcomePolicy,
    forced: OutcomePolicy,
}

impl OutcomeTracker {
    pub fn new(store: Arc<dyn SignalStore>, scheduled: OutcomePolicy, forced: OutcomePolicy) -> Self {
        OutcomeTracker {
            store,
            scheduled,
            forced,
        }
    }

    /// Periodic pass with the scheduled policy
    pub async fn check_pending(
        &self,
        source: &dyn CandleSource,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ResolutionReport> {
        self.run(source, now, &self.scheduled).await
    }

    /// Administrative pass with the forced policy
    pub async fn force_evaluate_pending(
        &self,
        source: &dyn CandleSource,
        now: DateTime<Utc>,
    ) -> anyhow::Result<ResolutionReport> {
        self.run(source, now, &self.forced).await
    }

    async fn run(
        &self,
        source: &dyn CandleSource,
        now: DateTime<Utc>,
        policy: &OutcomePolicy,
    ) -> anyhow::Result<ResolutionReport> {
        let pending = self.store.pending()?;
        let mut report = ResolutionReport {
            checked: pending.len(),
            ..ResolutionReport::default()
        };
        if pending.is_empty() {
            return Ok(report);
        }

        // one price lookup per symbol per pass
        let mut prices: HashMap<Symbol, Option<f64>> = HashMap::new();

        for record in &pending {
            let price = match prices.get(&record.symbol) {
                Some(cached) => *cached,
                None => {
                    let fetched = match source.current_price(&record.symbol).await {
                        Ok(p) => p,
                        Err(e) => {
                            warn!("Price lookup failed for {}: {:#}", record.symbol, e);
                            None
                        }
                    };
                    prices.insert(record.symbol.clone(), fetched);
                    fetched
                }
            };

            let Some(price) = price else {
                report.price_failures += 1;
                report.still_pending += 1;
                continue;
            };
            let Some(id) = record.id else {
                report.still_pending += 1;
                continue;
            };

            match resolve(record, price, now, policy) {
                Some(resolution) => {
                    if self.store.resolve(id, &resolution)? {
                        info!(
                            "{} {} #{} -> {} ({:+.2}%) after {}m",
                            record.symbol,
                            record.direction,
                            id,
                            resolution.outcome,
                            resolution.actual_return_pct,
                            resolution.minutes_to_resolution
                        );
                        report.resolved += 1;
                    }
                }
                None => report.still_pending += 1,
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::CriteriaResult;
    use crate::MarketTrend;
    use chrono::Duration;

    fn pending_record(direction: Direction, entry: f64, tp: f64, sl: f64) -> SignalRecord {
        SignalRecord {
            id: Some(1),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            symbol: Symbol::new("BTCUSDT"),
            direction,
            entry_price: entry,
            score: 92.0,
            criteria_met: 7,
            total_criteria: 8,
            rsi_1m: 55.0,
            rsi_5m: 56.0,
            rsi_15m: 57.0,
            ema_fast: entry,
            ema_slow: entry,
            volume_ratio: 1.5,
            atr: 1.0,
            adx: 25.0,
            candle_change_pct: 0.2,
            take_profit: tp,
            stop_loss: sl,
            expected_move_pct: 2.5,
            risk_reward: 2.0,
            market_trend: MarketTrend::Bullish,
            criteria: CriteriaResult::empty(direction),
            notified: false,
            outcome: Outcome::Pending,
            exit_price: None,
            exit_timestamp: None,
            actual_return_pct: None,
            minutes_to_resolution: None,
            notes: None,
        }
    }

    #[test]
    fn test_take_profit_wins_first() {
        let record = pending_record(Direction::Buy, 100.0, 102.5, 98.8);
        let now = record.timestamp + Duration::minutes(12);
        let res = resolve(&record, 102.6, now, &OutcomePolicy::scheduled()).unwrap();
        assert_eq!(res.outcome, Outcome::WinTp);
        assert!((res.actual_return_pct - 2.6).abs() < 1e-9);
        assert_eq!(res.minutes_to_resolution, 12);
    }

    #[test]
    fn test_sell_stop_loss() {
        let record = pending_record(Direction::Sell, 100.0, 97.5, 101.2);
        let now = record.timestamp + Duration::minutes(3);
        let res = resolve(&record, 101.5, now, &OutcomePolicy::scheduled()).unwrap();
        assert_eq!(res.outcome, Outcome::LossSl);
        assert!((res.actual_return_pct + 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_scheduled_waits_an_hour() {
        let record = pending_record(Direction::Buy, 100.0, 105.0, 95.0);
        let policy = OutcomePolicy::scheduled();

        let early = record.timestamp + Duration::minutes(30);
        assert!(resolve(&record, 101.5, early, &policy).is_none());

        let later = record.timestamp + Duration::minutes(61);
        assert_eq!(resolve(&record, 101.5, later, &policy).unwrap().outcome, Outcome::WinTime);
        assert_eq!(resolve(&record, 99.6, later, &policy).unwrap().outcome, Outcome::LossTime);
        assert!(resolve(&record, 100.1, later, &policy).is_none());

        let old = record.timestamp + Duration::minutes(181);
        assert_eq!(resolve(&record, 100.1, old, &policy).unwrap().outcome, Outcome::Expired);
    }

    #[test]
    fn test_forced_policy() {
        let record = pending_record(Direction::Sell, 100.0, 95.0, 105.0);
        let policy = OutcomePolicy::forced();

        // decisive move counts at any age
        let early = record.timestamp + Duration::minutes(10);
        assert_eq!(resolve(&record, 98.7, early, &policy).unwrap().outcome, Outcome::WinTime);
        assert!(resolve(&record, 99.7, early, &policy).is_none());

        let two_hours = record.timestamp + Duration::minutes(120);
        assert_eq!(resolve(&record, 100.05, two_hours, &policy).unwrap().outcome, Outcome::Expired);
    }

    #[test]
    fn test_forced_small_moves_past_two_hours_expire() {
        let policy = OutcomePolicy::forced();
        let buy = pending_record(Direction::Buy, 100.0, 105.0, 95.0);
        let sell = pending_record(Direction::Sell, 100.0, 95.0, 105.0);
        let late = buy.timestamp + Duration::minutes(130);

        // +0.2% and -0.2% sit inside the soft band, so no time-based win or loss
        for (record, price) in [(&buy, 100.2), (&buy, 99.8), (&sell, 99.8), (&sell, 100.2)] {
            let res = resolve(record, price, late, &policy).unwrap();
            assert_eq!(res.outcome, Outcome::Expired, "{} at {}", record.direction, price);
            assert!((res.actual_return_pct.abs() - 0.2).abs() < 1e-9);
        }
    }

    #[test]
    fn test_terminal_records_are_untouched() {
        let mut record = pending_record(Direction::Buy, 100.0, 102.0, 99.0);
        record.outcome = Outcome::Expired;
        let now = record.timestamp + Duration::hours(5);
        assert!(resolve(&record, 110.0, now, &OutcomePolicy::forced()).is_none());
    }
}
