//! One-shot scan: a single cycle against live data, nothing persisted

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;

use scalp_signals::binance::BinanceClient;
use scalp_signals::notifier::LogNotifier;
use scalp_signals::snapshot::SymbolSnapshot;
use scalp_signals::store::MemorySignalStore;
use scalp_signals::{Direction, SignalEngine};

pub fn run(config_path: String, symbols: Option<String>) -> Result<()> {
    let runtime = super::runtime()?;
    runtime.block_on(run_async(config_path, symbols))
}

async fn run_async(config_path: String, symbols: Option<String>) -> Result<()> {
    let mut config = super::load_config(&config_path)?;
    if let Some(list) = symbols {
        config.data.symbols = list
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    config.validate()?;

    let source = BinanceClient::with_timeout(config.data.fetch_timeout_secs)?;
    let mut engine = SignalEngine::new(
        &config,
        Box::new(LogNotifier),
        Arc::new(MemorySignalStore::new()),
    );

    let report = engine.run_cycle(&source, Utc::now()).await;

    println!();
    println!(
        "{:<10} {:>12} {:>6} {:>6} {:>6} {:>6} {:>7} {:>6} {:>9} {:>4} {:>4}",
        "SYMBOL", "PRICE", "SCORE", "RSI1m", "RSI5m", "RSI15m", "VOLx", "ADX", "TREND", "BUY", "SELL"
    );
    println!("{}", "-".repeat(88));

    let mut symbols: Vec<_> = engine.snapshots().keys().cloned().collect();
    symbols.sort();
    for symbol in &symbols {
        if let Some(snap) = engine.snapshots().get(symbol) {
            print_row(snap);
        }
    }

    for symbol in &symbols {
        if let Some(snap) = engine.snapshots().get(symbol) {
            print_breakdown(snap);
        }
    }

    println!();
    if report.signals.is_empty() {
        println!("No signals this cycle ({} failed symbols)", report.failed);
    }
    for event in &report.signals {
        println!(
            "SIGNAL {} {} @ {:.4} score {:.1} ({}/{} criteria)",
            event.direction,
            event.symbol,
            event.price,
            event.score,
            event.decision.met,
            event.decision.criteria.total()
        );
    }
    Ok(())
}

fn print_row(snap: &SymbolSnapshot) {
    println!(
        "{:<10} {:>12.4} {:>6.1} {:>6.1} {:>6.1} {:>6.1} {:>7.2} {:>6.1} {:>9} {:>2}/8 {:>2}/8",
        snap.symbol.as_str(),
        snap.price,
        snap.score,
        snap.rsi_1m,
        snap.rsi_5m,
        snap.rsi_15m,
        snap.volume_ratio,
        snap.adx,
        snap.trend.as_str(),
        snap.buy_criteria.met(),
        snap.sell_criteria.met()
    );
}

fn print_breakdown(snap: &SymbolSnapshot) {
    println!();
    println!("{} (updated {})", snap.symbol, snap.updated_at.format("%H:%M:%S UTC"));
    for direction in [Direction::Buy, Direction::Sell] {
        let targets = snap.targets(direction);
        println!(
            "  {:<4} TP {:.4}  SL {:.4}  R:R {:.2}",
            direction.label(),
            targets.take_profit,
            targets.stop_loss,
            targets.risk_reward
        );
        for check in &snap.criteria(direction).checks {
            println!(
                "       {} {}",
                if check.passed { "[x]" } else { "[ ]" },
                check.criterion
            );
        }
    }
}
