//! Signal loop
//!
//! Two timers share one task: the signal cycle (default 60s) and the
//! outcome check (default 300s). Ctrl+C stops both after the current tick.

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use scalp_signals::binance::BinanceClient;
use scalp_signals::notifier::{notifier_from_config, LogNotifier, Notifier};
use scalp_signals::outcome::OutcomeTracker;
use scalp_signals::store::{MemorySignalStore, SignalStore};
use scalp_signals::SignalEngine;

pub fn run(config_path: String, dry_run: bool, interval_secs: Option<u64>) -> Result<()> {
    let runtime = super::runtime()?;
    runtime.block_on(run_async(config_path, dry_run, interval_secs))
}

async fn run_async(config_path: String, dry_run: bool, interval_secs: Option<u64>) -> Result<()> {
    let mut config = super::load_config(&config_path)?;
    if let Some(secs) = interval_secs {
        config.data.poll_interval_secs = secs.max(1);
    }

    let (store, notifier): (Arc<dyn SignalStore>, Box<dyn Notifier>) = if dry_run {
        (Arc::new(MemorySignalStore::new()), Box::new(LogNotifier))
    } else {
        (super::open_store(&config)?, notifier_from_config(&config.notifier)?)
    };

    info!("Scalping signal engine starting");
    info!("  Symbols:   {}", config.data.symbols.join(", "));
    info!("  Cycle:     {}s", config.data.poll_interval_secs);
    info!("  Outcomes:  every {}s", config.outcome.check_interval_secs);
    info!("  Scoring:   {:?}", config.scoring.model);
    info!("  Notifier:  {}", notifier.name());
    info!(
        "  Storage:   {}",
        if dry_run { "memory (dry run)" } else { config.storage.db_path.as_str() }
    );

    let source = BinanceClient::with_timeout(config.data.fetch_timeout_secs)?;
    let tracker = OutcomeTracker::new(
        Arc::clone(&store),
        config.outcome.scheduled.clone(),
        config.outcome.forced.clone(),
    );
    let mut engine = SignalEngine::new(&config, notifier, store);

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                let _ = shutdown_tx.send(()).await;
            }
            Err(e) => error!("Error setting up signal handler: {}", e),
        }
    });

    let mut cycle_interval = interval(Duration::from_secs(config.data.poll_interval_secs.max(1)));
    cycle_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut outcome_interval = interval(Duration::from_secs(config.outcome.check_interval_secs.max(1)));
    outcome_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Starting signal loop...");

    loop {
        tokio::select! {
            _ = cycle_interval.tick() => {
                engine.run_cycle(&source, Utc::now()).await;
            }
            _ = outcome_interval.tick() => {
                match tracker.check_pending(&source, Utc::now()).await {
                    Ok(report) if report.resolved > 0 => info!(
                        "Resolved {}/{} pending signals ({} price failures)",
                        report.resolved, report.checked, report.price_failures
                    ),
                    Ok(_) => {}
                    Err(e) => error!("Outcome check failed: {:#}", e),
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    let stats = engine.trading_stats();
    info!(
        "Session ended after {} cycles: {} signals, {} notifications",
        stats.cycles, stats.total_signals, stats.notifications_sent
    );
    Ok(())
}
