//! CSV export of stored signals

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::info;

use scalp_signals::record::SignalRecord;

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: Option<i64>,
    timestamp: String,
    symbol: &'a str,
    direction: &'a str,
    entry_price: f64,
    score: f64,
    criteria_met: usize,
    total_criteria: usize,
    criteria_passed: String,
    rsi_1m: f64,
    rsi_5m: f64,
    rsi_15m: f64,
    volume_ratio: f64,
    atr: f64,
    adx: f64,
    take_profit: f64,
    stop_loss: f64,
    risk_reward: f64,
    market_trend: &'a str,
    notified: bool,
    outcome: &'a str,
    exit_price: Option<f64>,
    actual_return_pct: Option<f64>,
    minutes_to_resolution: Option<i64>,
}

impl<'a> From<&'a SignalRecord> for CsvRow<'a> {
    fn from(r: &'a SignalRecord) -> Self {
        CsvRow {
            id: r.id,
            timestamp: r.timestamp.to_rfc3339(),
            symbol: r.symbol.as_str(),
            direction: r.direction.as_str(),
            entry_price: r.entry_price,
            score: r.score,
            criteria_met: r.criteria_met,
            total_criteria: r.total_criteria,
            criteria_passed: r.criteria.passed_names().join("|"),
            rsi_1m: r.rsi_1m,
            rsi_5m: r.rsi_5m,
            rsi_15m: r.rsi_15m,
            volume_ratio: r.volume_ratio,
            atr: r.atr,
            adx: r.adx,
            take_profit: r.take_profit,
            stop_loss: r.stop_loss,
            risk_reward: r.risk_reward,
            market_trend: r.market_trend.as_str(),
            notified: r.notified,
            outcome: r.outcome.as_str(),
            exit_price: r.exit_price,
            actual_return_pct: r.actual_return_pct,
            minutes_to_resolution: r.minutes_to_resolution,
        }
    }
}

pub fn run(config_path: String, output: String, days: i64) -> Result<()> {
    let config = super::load_config(&config_path)?;
    let store = super::open_store(&config)?;
    let records = store.since(Utc::now() - Duration::days(days.max(1)))?;

    let mut writer = csv::Writer::from_path(&output)
        .with_context(|| format!("Failed to create {}", output))?;
    for record in &records {
        writer.serialize(CsvRow::from(record))?;
    }
    writer.flush()?;

    info!("Exported {} signals to {}", records.len(), output);
    println!("Exported {} signals to {}", records.len(), output);
    Ok(())
}
