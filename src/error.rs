//! Error taxonomy for the signal engine
//!
//! Only errors that stop a symbol's update for the current cycle live here.
//! Short indicator windows never error: the indicator library returns
//! neutral defaults instead (RSI 50, ADX 25, EMA = last value).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Candle fetch failed or returned nothing
    #[error("market data unavailable for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("insufficient {interval} candles for {symbol}: got {got}, need {need}")]
    InsufficientData {
        symbol: String,
        interval: String,
        got: usize,
        need: usize,
    },

    #[error("fetch of {symbol} {interval} timed out after {secs}s")]
    Timeout {
        symbol: String,
        interval: String,
        secs: u64,
    },

    #[error("notification failed: {0}")]
    Notification(String),

    #[error("persistence failed: {0}")]
    Persistence(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// True for the data-source family of errors, which leave the stale
    /// snapshot in place and are retried on the next tick.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            EngineError::DataUnavailable { .. }
                | EngineError::InsufficientData { .. }
                | EngineError::Timeout { .. }
        )
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
