//! Signal engine: one cycle over all symbols
//!
//! For every symbol: fetch candles, rebuild the snapshot, run the BUY gate
//! and then (only if BUY did not fire) the SELL gate, and dispatch whatever
//! passed. A failing symbol keeps its previous snapshot and never aborts
//! the cycle.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{Config, DataConfig};
use crate::dispatcher::{DispatchOutcome, SignalDispatcher};
use crate::error::EngineResult;
use crate::evaluator::{CooldownBook, CooldownState, GateDecision, SignalEvaluator};
use crate::market_data::{fetch_timeframes, CandleSource, TimeframeCandles};
use crate::notifier::Notifier;
use crate::snapshot::{SnapshotBuilder, SymbolSnapshot};
use crate::store::SignalStore;
use crate::{Direction, Symbol};

/// Counters exposed to readers of the [`MarketView`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TradingStats {
    pub total_signals: u64,
    pub notifications_sent: u64,
    pub notifications_today: u32,
    pub cycles: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub cooldowns: HashMap<Symbol, CooldownState>,
    /// Latest failure per symbol, cleared on the next successful update
    pub last_errors: HashMap<Symbol, String>,
}

#[derive(Debug, Default)]
struct ViewState {
    snapshots: HashMap<Symbol, SymbolSnapshot>,
    stats: TradingStats,
}

/// Read handle over the latest snapshots and counters
///
/// Readers get a copy; the worker replaces entries as it goes, last writer wins.
#[derive(Debug, Clone, Default)]
pub struct MarketView {
    inner: Arc<RwLock<ViewState>>,
}

impl MarketView {
    pub fn market_snapshot(&self) -> HashMap<Symbol, SymbolSnapshot> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshots
            .clone()
    }

    pub fn snapshot(&self, symbol: &Symbol) -> Option<SymbolSnapshot> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshots
            .get(symbol)
            .cloned()
    }

    pub fn trading_stats(&self) -> TradingStats {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
            .clone()
    }

    fn publish_snapshot(&self, snapshot: SymbolSnapshot) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshots
            .insert(snapshot.symbol.clone(), snapshot);
    }

    fn publish_stats(&self, stats: TradingStats) {
        self.inner.write().unwrap_or_else(PoisonError::into_inner).stats = stats;
    }
}

/// A signal that passed its gate and went through the dispatcher
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalEvent {
    pub symbol: Symbol,
    pub direction: Direction,
    pub price: f64,
    pub score: f64,
    pub decision: GateDecision,
    pub dispatch: DispatchOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub symbols: usize,
    pub updated: usize,
    pub failed: usize,
    pub signals: Vec<SignalEvent>,
}

pub struct SignalEngine {
    data: DataConfig,
    symbols: Vec<Symbol>,
    snapshots: HashMap<Symbol, SymbolSnapshot>,
    cooldowns: CooldownBook,
    builder: SnapshotBuilder,
    evaluator: SignalEvaluator,
    dispatcher: SignalDispatcher,
    view: MarketView,
    cycles: u64,
    last_cycle_at: Option<DateTime<Utc>>,
    last_errors: HashMap<Symbol, String>,
}

impl SignalEngine {
    pub fn new(config: &Config, notifier: Box<dyn Notifier>, store: Arc<dyn SignalStore>) -> Self {
        SignalEngine {
            data: config.data.clone(),
            symbols: config.data.symbols(),
            snapshots: HashMap::new(),
            cooldowns: CooldownBook::new(),
            builder: SnapshotBuilder::new(config),
            evaluator: SignalEvaluator::new(config.gate.clone(), config.cooldown.clone()),
            dispatcher: SignalDispatcher::new(config.dispatch.clone(), notifier, store),
            view: MarketView::default(),
            cycles: 0,
            last_cycle_at: None,
            last_errors: HashMap::new(),
        }
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn view(&self) -> MarketView {
        self.view.clone()
    }

    pub fn snapshots(&self) -> &HashMap<Symbol, SymbolSnapshot> {
        &self.snapshots
    }

    pub fn cooldowns(&self) -> &CooldownBook {
        &self.cooldowns
    }

    pub fn evaluator(&self) -> &SignalEvaluator {
        &self.evaluator
    }

    pub fn trading_stats(&self) -> TradingStats {
        let counters = self.dispatcher.counters();
        TradingStats {
            total_signals: counters.signals_dispatched,
            notifications_sent: counters.notifications_sent,
            notifications_today: counters.notifications_today,
            cycles: self.cycles,
            last_cycle_at: self.last_cycle_at,
            cooldowns: self.cooldowns.clone(),
            last_errors: self.last_errors.clone(),
        }
    }

    /// Process every configured symbol once
    pub async fn run_cycle(&mut self, source: &dyn CandleSource, now: DateTime<Utc>) -> CycleReport {
        let symbols = self.symbols.clone();
        let mut report = CycleReport {
            symbols: symbols.len(),
            ..CycleReport::default()
        };

        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 && self.data.symbol_pause_ms > 0 {
                tokio::time::sleep(StdDuration::from_millis(self.data.symbol_pause_ms)).await;
            }

            match self.process_symbol(source, symbol, now).await {
                Ok(event) => {
                    report.updated += 1;
                    report.signals.extend(event);
                }
                Err(e) => {
                    report.failed += 1;
                    if e.is_data_error() {
                        warn!("Skipping {} this cycle: {}", symbol, e);
                    } else {
                        error!("Skipping {} this cycle: {}", symbol, e);
                    }
                    self.last_errors.insert(symbol.clone(), e.to_string());
                    self.view.publish_stats(self.trading_stats());
                }
            }
        }

        self.cycles += 1;
        self.last_cycle_at = Some(now);
        self.view.publish_stats(self.trading_stats());

        info!(
            "Cycle {} done: {}/{} symbols updated, {} failed, {} signal(s)",
            self.cycles,
            report.updated,
            report.symbols,
            report.failed,
            report.signals.len()
        );
        report
    }

    pub async fn process_symbol(
        &mut self,
        source: &dyn CandleSource,
        symbol: &Symbol,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<SignalEvent>> {
        let frames = fetch_timeframes(source, symbol, &self.data).await?;
        self.evaluate_frames(symbol, &frames, now).await
    }

    /// Snapshot, gate and dispatch from already fetched candles
    pub async fn evaluate_frames(
        &mut self,
        symbol: &Symbol,
        frames: &TimeframeCandles,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<SignalEvent>> {
        let mut snapshot = self.builder.build(symbol, frames, now)?;
        snapshot.last_signal = self.cooldowns.get(symbol).cloned();
        self.last_errors.remove(symbol);

        let one_minute = &frames.one_minute;
        let mut fired = None;

        // BUY first; a passing BUY skips SELL for this cycle
        for direction in [Direction::Buy, Direction::Sell] {
            let decision =
                self.evaluator
                    .evaluate(direction, &snapshot, one_minute, &self.cooldowns, now);
            if !decision.passed {
                continue;
            }

            let dispatch = self
                .dispatcher
                .dispatch(&decision, &snapshot, &mut self.cooldowns, now)
                .await;
            fired = Some(SignalEvent {
                symbol: symbol.clone(),
                direction,
                price: snapshot.price,
                score: snapshot.score,
                decision,
                dispatch,
            });
            break;
        }

        if fired.is_some() {
            snapshot.last_signal = self.cooldowns.get(symbol).cloned();
        } else {
            debug!("No signal for {} (score {:.1})", symbol, snapshot.score);
        }

        self.snapshots.insert(symbol.clone(), snapshot.clone());
        self.view.publish_snapshot(snapshot);
        self.view.publish_stats(self.trading_stats());
        Ok(fired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::RecordingNotifier;
    use crate::store::MemorySignalStore;
    use crate::Candle;
    use async_trait::async_trait;

    struct EmptySource;

    #[async_trait]
    impl CandleSource for EmptySource {
        async fn candles(&self, _: &Symbol, _: &str, _: u32) -> anyhow::Result<Vec<Candle>> {
            Ok(Vec::new())
        }

        async fn current_price(&self, _: &Symbol) -> anyhow::Result<Option<f64>> {
            Ok(None)
        }
    }

    fn engine() -> SignalEngine {
        let mut config = Config::default();
        config.data.symbol_pause_ms = 0;
        SignalEngine::new(
            &config,
            Box::new(RecordingNotifier::new()),
            Arc::new(MemorySignalStore::new()),
        )
    }

    #[tokio::test]
    async fn test_data_outage_does_not_abort_cycle() {
        let mut engine = engine();
        let view = engine.view();
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

        let report = engine.run_cycle(&EmptySource, now).await;
        assert_eq!(report.symbols, 3);
        assert_eq!(report.failed, 3);
        assert!(report.signals.is_empty());

        let stats = view.trading_stats();
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.last_errors.len(), 3);
        assert!(view.market_snapshot().is_empty());
    }
}
