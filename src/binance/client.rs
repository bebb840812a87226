//! Binance public REST client for klines and ticker prices
//!
//! No API key required for public market data endpoints.
//!
//! # Example
//! ```no_run
//! use scalp_signals::binance::BinanceClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = BinanceClient::new()?;
//!     let klines = client.get_klines("BTCUSDT", "1m", 100).await?;
//!     println!("Fetched {} klines", klines.len());
//!     Ok(())
//! }
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration as StdDuration;
use tracing::{debug, warn};

use super::types::{is_valid_interval, BinanceKline, Ticker24h, TickerPrice};
use crate::market_data::CandleSource;
use crate::{Candle, Symbol};

/// Base URL for Binance API
const BINANCE_API_BASE: &str = "https://api.binance.com/api/v3";

/// Maximum klines per request (Binance limit)
const MAX_KLINES_PER_REQUEST: u32 = 1000;

/// Default per-request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Binance API client
#[derive(Debug, Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
}

impl BinanceClient {
    /// Create a new Binance client with the default 10s timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(BinanceClient {
            client,
            base_url: BINANCE_API_BASE.to_string(),
        })
    }

    /// Point the client at another API root (testnet, proxy)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Fetch the most recent `limit` klines (candlesticks), oldest first
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<BinanceKline>> {
        if !is_valid_interval(interval) {
            anyhow::bail!("Invalid Binance interval: {}", interval);
        }

        let url = format!("{}/klines", self.base_url);
        let limit = limit.clamp(1, MAX_KLINES_PER_REQUEST);
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];

        debug!(
            "Fetching klines: symbol={}, interval={}, limit={}",
            symbol, interval, limit
        );

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .context("Failed to send request to Binance")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Binance API error {}: {}", status, body);
        }

        let raw_data: Vec<Vec<serde_json::Value>> = response
            .json()
            .await
            .context("Failed to parse Binance response")?;

        let klines: Vec<BinanceKline> = raw_data
            .iter()
            .filter_map(|row| BinanceKline::from_raw(row))
            .collect();

        if klines.len() < raw_data.len() {
            warn!(
                "Dropped {} malformed {} {} klines",
                raw_data.len() - klines.len(),
                symbol,
                interval
            );
        }

        Ok(klines)
    }

    /// Latest traded price
    pub async fn get_ticker_price(&self, symbol: &str) -> Result<f64> {
        let url = format!("{}/ticker/price", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .context("Failed to request ticker price")?;

        if !response.status().is_success() {
            anyhow::bail!("Binance ticker error {} for {}", response.status(), symbol);
        }

        let ticker: TickerPrice = response
            .json()
            .await
            .context("Failed to parse ticker price")?;
        ticker
            .price
            .parse()
            .with_context(|| format!("Invalid price '{}' for {}", ticker.price, ticker.symbol))
    }

    /// 24h rolling ticker statistics
    pub async fn get_24h_ticker(&self, symbol: &str) -> Result<Ticker24h> {
        let url = format!("{}/ticker/24hr", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .context("Failed to request 24h ticker")?;

        if !response.status().is_success() {
            anyhow::bail!("Binance 24h ticker error {} for {}", response.status(), symbol);
        }

        response
            .json()
            .await
            .context("Failed to parse 24h ticker")
    }
}

#[async_trait]
impl CandleSource for BinanceClient {
    async fn candles(&self, symbol: &Symbol, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let klines = self.get_klines(symbol.as_str(), interval, limit).await?;

        let candles: Vec<Candle> = klines
            .iter()
            .filter_map(|k| match k.to_candle() {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!("Skipping invalid {} {} candle: {}", symbol, interval, e);
                    None
                }
            })
            .collect();

        Ok(candles)
    }

    async fn current_price(&self, symbol: &Symbol) -> Result<Option<f64>> {
        let price = self.get_ticker_price(symbol.as_str()).await?;
        Ok((price > 0.0).then_some(price))
    }

    async fn change_24h_pct(&self, symbol: &Symbol) -> Result<Option<f64>> {
        let ticker = self.get_24h_ticker(symbol.as_str()).await?;
        Ok(ticker.price_change_percent.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = BinanceClient::new().unwrap();
        assert_eq!(client.base_url, BINANCE_API_BASE);

        let custom = BinanceClient::with_timeout(3)
            .unwrap()
            .with_base_url("https://testnet.binance.vision/api/v3/");
        assert_eq!(custom.base_url, "https://testnet.binance.vision/api/v3");
    }

    #[tokio::test]
    async fn test_invalid_interval_is_rejected_before_request() {
        let client = BinanceClient::new().unwrap();
        let err = client.get_klines("BTCUSDT", "7m", 10).await.unwrap_err();
        assert!(err.to_string().contains("Invalid Binance interval"));
    }
}
