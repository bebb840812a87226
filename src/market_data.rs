//! Candle source abstraction and multi-timeframe fetching
//!
//! The engine only ever talks to a [`CandleSource`]. `BinanceClient` is the
//! production implementation; tests plug in fixed series.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::DataConfig;
use crate::error::{EngineError, EngineResult};
use crate::{Candle, Symbol};

pub const INTERVAL_1M: &str = "1m";
pub const INTERVAL_5M: &str = "5m";
pub const INTERVAL_15M: &str = "15m";
pub const INTERVAL_1H: &str = "1h";

/// Market data provider
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Most recent `limit` candles, oldest first. Empty means no data.
    async fn candles(&self, symbol: &Symbol, interval: &str, limit: u32)
        -> anyhow::Result<Vec<Candle>>;

    /// Latest traded price, `None` when the source has no quote
    async fn current_price(&self, symbol: &Symbol) -> anyhow::Result<Option<f64>>;

    /// 24h price change percent, if the source provides one
    async fn change_24h_pct(&self, _symbol: &Symbol) -> anyhow::Result<Option<f64>> {
        Ok(None)
    }
}

/// What to do when a fetch fails or times out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Give up on the symbol for this cycle; the next tick tries again
    #[default]
    NextTick,
    /// Retry within the cycle
    Immediate { attempts: u32, backoff_ms: u64 },
}

impl RetryPolicy {
    fn attempts(&self) -> u32 {
        match self {
            RetryPolicy::NextTick => 1,
            RetryPolicy::Immediate { attempts, .. } => (*attempts).max(1),
        }
    }

    fn backoff(&self) -> Duration {
        match self {
            RetryPolicy::NextTick => Duration::ZERO,
            RetryPolicy::Immediate { backoff_ms, .. } => Duration::from_millis(*backoff_ms),
        }
    }
}

/// Candle series for one symbol across the four timeframes
#[derive(Debug, Clone, Default)]
pub struct TimeframeCandles {
    pub one_minute: Vec<Candle>,
    pub five_minute: Vec<Candle>,
    pub fifteen_minute: Vec<Candle>,
    pub one_hour: Vec<Candle>,
    pub change_24h_pct: Option<f64>,
}

/// Run `fetch` under a timeout, retrying according to `policy`
async fn with_policy<T, F, Fut>(
    symbol: &Symbol,
    interval: &str,
    cfg: &DataConfig,
    mut fetch: F,
) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let policy = cfg.retry;
    let timeout = Duration::from_secs(cfg.fetch_timeout_secs);
    let mut last_err = None;

    for attempt in 1..=policy.attempts() {
        match tokio::time::timeout(timeout, fetch()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                last_err = Some(EngineError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason: format!("{} fetch failed: {:#}", interval, e),
                });
            }
            Err(_) => {
                last_err = Some(EngineError::Timeout {
                    symbol: symbol.to_string(),
                    interval: interval.to_string(),
                    secs: cfg.fetch_timeout_secs,
                });
            }
        }

        if attempt < policy.attempts() {
            debug!(
                "Retrying {} {} (attempt {}/{})",
                symbol,
                interval,
                attempt + 1,
                policy.attempts()
            );
            tokio::time::sleep(policy.backoff()).await;
        }
    }

    Err(last_err.unwrap_or_else(|| EngineError::DataUnavailable {
        symbol: symbol.to_string(),
        reason: format!("{} fetch not attempted", interval),
    }))
}

/// Fetch all four timeframes for `symbol`
///
/// The 1m series is mandatory: a failure, an empty answer or fewer than
/// `min_one_minute_candles` bars is an error. Higher timeframes are
/// best-effort and come back empty on failure.
pub async fn fetch_timeframes(
    source: &dyn CandleSource,
    symbol: &Symbol,
    cfg: &DataConfig,
) -> EngineResult<TimeframeCandles> {
    let one_minute = with_policy(symbol, INTERVAL_1M, cfg, || {
        source.candles(symbol, INTERVAL_1M, cfg.one_minute_limit)
    })
    .await?;

    if one_minute.is_empty() {
        return Err(EngineError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: "empty 1m series".to_string(),
        });
    }
    if one_minute.len() < cfg.min_one_minute_candles {
        return Err(EngineError::InsufficientData {
            symbol: symbol.to_string(),
            interval: INTERVAL_1M.to_string(),
            got: one_minute.len(),
            need: cfg.min_one_minute_candles,
        });
    }

    let mut frames = TimeframeCandles {
        one_minute,
        ..TimeframeCandles::default()
    };

    for (interval, limit) in [
        (INTERVAL_5M, cfg.five_minute_limit),
        (INTERVAL_15M, cfg.fifteen_minute_limit),
        (INTERVAL_1H, cfg.one_hour_limit),
    ] {
        let series = match with_policy(symbol, interval, cfg, || {
            source.candles(symbol, interval, limit)
        })
        .await
        {
            Ok(series) => series,
            Err(e) => {
                warn!("{}; continuing with degraded {} data", e, interval);
                Vec::new()
            }
        };

        match interval {
            INTERVAL_5M => frames.five_minute = series,
            INTERVAL_15M => frames.fifteen_minute = series,
            _ => frames.one_hour = series,
        }
    }

    let timeout = Duration::from_secs(cfg.fetch_timeout_secs);
    frames.change_24h_pct = match tokio::time::timeout(timeout, source.change_24h_pct(symbol)).await {
        Ok(Ok(change)) => change,
        Ok(Err(e)) => {
            debug!("No 24h change for {}: {:#}", symbol, e);
            None
        }
        Err(_) => {
            debug!("24h change for {} timed out", symbol);
            None
        }
    };

    Ok(frames)
}
