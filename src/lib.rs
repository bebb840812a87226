//! Crypto scalping signal engine
//!
//! Polls 1m/5m/15m/1h candles for a set of USDT pairs, scores each pair,
//! gates BUY/SELL signals on eight named criteria plus a cooldown/distance
//! filter, and hands accepted signals to a notification sink and a signal
//! store. Stored signals are later resolved to WIN/LOSS/EXPIRED against the
//! live price.

pub mod binance;
pub mod config;
pub mod criteria;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod indicators;
pub mod market_data;
pub mod notifier;
pub mod outcome;
pub mod record;
pub mod scoring;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod targets;
pub mod trend;
pub mod types;

pub use config::Config;
pub use engine::{MarketView, SignalEngine, TradingStats};
pub use error::{EngineError, EngineResult};
pub use types::*;
