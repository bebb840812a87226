//! Administrative trigger: force-evaluate all pending signals

use anyhow::Result;
use chrono::Utc;
use tracing::info;

use scalp_signals::binance::BinanceClient;
use scalp_signals::outcome::OutcomeTracker;

pub fn run(config_path: String) -> Result<()> {
    let runtime = super::runtime()?;
    runtime.block_on(async move {
        let config = super::load_config(&config_path)?;
        let store = super::open_store(&config)?;
        let source = BinanceClient::with_timeout(config.data.fetch_timeout_secs)?;
        let tracker = OutcomeTracker::new(
            store,
            config.outcome.scheduled.clone(),
            config.outcome.forced.clone(),
        );

        let report = tracker.force_evaluate_pending(&source, Utc::now()).await?;
        info!(
            "Checked {} pending signals: {} resolved, {} still pending, {} without price",
            report.checked, report.resolved, report.still_pending, report.price_failures
        );
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok::<(), anyhow::Error>(())
    })
}
