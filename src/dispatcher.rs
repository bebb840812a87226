//! Signal dispatch: persist, notify, update cooldown
//!
//! The effects of an accepted signal run in a fixed order and each one is
//! independent of the others' failure: persist the record, notify if the
//! score clears the bar and the daily cap allows it, then write the cooldown
//! entry for the symbol.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::DispatchConfig;
use crate::criteria::SIGNAL_DISTANCE;
use crate::error::EngineError;
use crate::evaluator::{CooldownBook, CooldownState, GateDecision};
use crate::notifier::{render_signal_message, Notifier};
use crate::record::{Outcome, SignalRecord};
use crate::snapshot::SymbolSnapshot;
use crate::store::SignalStore;

/// What happened to one accepted signal
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub record_id: Option<i64>,
    pub notified: bool,
    pub notify_error: Option<String>,
    pub persist_error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchCounters {
    /// UTC date the daily counter belongs to
    pub day: Option<NaiveDate>,
    pub notifications_today: u32,
    pub notifications_sent: u64,
    pub signals_dispatched: u64,
}

pub struct SignalDispatcher {
    config: DispatchConfig,
    notifier: Box<dyn Notifier>,
    store: Arc<dyn SignalStore>,
    counters: DispatchCounters,
}

impl SignalDispatcher {
    pub fn new(config: DispatchConfig, notifier: Box<dyn Notifier>, store: Arc<dyn SignalStore>) -> Self {
        SignalDispatcher {
            config,
            notifier,
            store,
            counters: DispatchCounters::default(),
        }
    }

    pub fn counters(&self) -> &DispatchCounters {
        &self.counters
    }

    fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.counters.day != Some(today) {
            if self.counters.day.is_some() {
                info!(
                    "New UTC day {}, resetting daily notification count ({} sent)",
                    today, self.counters.notifications_today
                );
            }
            self.counters.day = Some(today);
            self.counters.notifications_today = 0;
        }
    }

    /// Score bar plus daily cap; ultra-high scores bypass the cap
    pub fn should_notify(&mut self, score: f64, now: DateTime<Utc>) -> bool {
        self.roll_day(now);
        if score < self.config.notify_min_score {
            return false;
        }
        if self.counters.notifications_today < self.config.daily_cap {
            return true;
        }
        if score >= self.config.cap_bypass_score {
            info!(
                "Daily cap of {} reached, score {:.1} bypasses it",
                self.config.daily_cap, score
            );
            return true;
        }
        info!(
            "Daily cap of {} reached, not notifying score {:.1}",
            self.config.daily_cap, score
        );
        false
    }

    pub async fn dispatch(
        &mut self,
        decision: &GateDecision,
        snapshot: &SymbolSnapshot,
        book: &mut CooldownBook,
        now: DateTime<Utc>,
    ) -> DispatchOutcome {
        let notify = self.should_notify(snapshot.score, now);
        let record = build_record(decision, snapshot, now, notify);
        let mut outcome = DispatchOutcome::default();

        match self.store.persist(&record) {
            Ok(id) => outcome.record_id = Some(id),
            Err(e) => {
                let err = EngineError::Persistence(format!("{:#}", e));
                error!("{} {} signal: {}", record.symbol, record.direction, err);
                outcome.persist_error = Some(err.to_string());
            }
        }

        if notify {
            let message = render_signal_message(&record);
            match self.notifier.send(&message).await {
                Ok(()) => {
                    outcome.notified = true;
                    self.counters.notifications_today += 1;
                    self.counters.notifications_sent += 1;
                }
                Err(e) => {
                    let err = EngineError::Notification(format!(
                        "{} via {}: {:#}",
                        record.symbol,
                        self.notifier.name(),
                        e
                    ));
                    warn!("{}", err);
                    outcome.notify_error = Some(err.to_string());
                }
            }
        }

        book.insert(
            snapshot.symbol.clone(),
            CooldownState {
                direction: decision.direction,
                price: snapshot.price,
                timestamp: now,
                score: snapshot.score,
            },
        );
        self.counters.signals_dispatched += 1;

        info!(
            "🚨 {} {} @ {:.4} score {:.1} ({}/{}) id={:?} notified={}",
            decision.direction,
            snapshot.symbol,
            snapshot.price,
            snapshot.score,
            decision.met,
            decision.criteria.total(),
            outcome.record_id,
            outcome.notified
        );

        outcome
    }
}

/// Flatten a passed gate and its snapshot into a storable record
pub fn build_record(
    decision: &GateDecision,
    snapshot: &SymbolSnapshot,
    now: DateTime<Utc>,
    notify: bool,
) -> SignalRecord {
    let targets = snapshot.targets(decision.direction);
    let mut notes = format!("required {}/{}", decision.required, decision.criteria.total());
    if let Some(distance) = &decision.criteria.signal_distance {
        notes.push_str(&format!("; {}: {}", SIGNAL_DISTANCE, distance.reason));
    }
    SignalRecord {
        id: None,
        timestamp: now,
        symbol: snapshot.symbol.clone(),
        direction: decision.direction,
        entry_price: snapshot.price,
        score: snapshot.score,
        criteria_met: decision.met,
        total_criteria: decision.criteria.total(),
        rsi_1m: snapshot.rsi_1m,
        rsi_5m: snapshot.rsi_5m,
        rsi_15m: snapshot.rsi_15m,
        ema_fast: snapshot.ema_fast,
        ema_slow: snapshot.ema_slow,
        volume_ratio: snapshot.volume_ratio,
        atr: snapshot.atr,
        adx: snapshot.adx,
        candle_change_pct: snapshot.candle_change_pct,
        take_profit: targets.take_profit,
        stop_loss: targets.stop_loss,
        expected_move_pct: targets.expected_move_pct,
        risk_reward: targets.risk_reward,
        market_trend: decision.trend,
        criteria: decision.criteria.clone(),
        notified: notify,
        outcome: Outcome::Pending,
        exit_price: None,
        exit_timestamp: None,
        actual_return_pct: None,
        minutes_to_resolution: None,
        notes: Some(notes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::RecordingNotifier;
    use crate::store::MemorySignalStore;
    use chrono::Duration;

    fn dispatcher(cap: u32) -> SignalDispatcher {
        let config = DispatchConfig {
            daily_cap: cap,
            ..DispatchConfig::default()
        };
        SignalDispatcher::new(
            config,
            Box::new(RecordingNotifier::new()),
            Arc::new(MemorySignalStore::new()),
        )
    }

    fn noon() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_score_bar() {
        let mut d = dispatcher(10);
        assert!(!d.should_notify(89.9, noon()));
        assert!(d.should_notify(90.0, noon()));
    }

    #[test]
    fn test_cap_and_bypass() {
        let mut d = dispatcher(2);
        d.should_notify(91.0, noon());
        d.counters.notifications_today = 2;
        assert!(!d.should_notify(94.0, noon()));
        assert!(d.should_notify(95.0, noon()));
    }

    #[test]
    fn test_daily_counter_resets_on_utc_date_change() {
        let mut d = dispatcher(1);
        d.should_notify(91.0, noon());
        d.counters.notifications_today = 1;
        assert!(!d.should_notify(91.0, noon() + Duration::hours(11)));
        assert!(d.should_notify(91.0, noon() + Duration::hours(12)));
        assert_eq!(d.counters.notifications_today, 0);
    }
}
