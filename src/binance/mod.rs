//! Binance public market data client
//! No API key needed for public market data endpoints.

mod client;
mod types;

pub use client::BinanceClient;
pub use types::*;
