//! CLI command implementations

pub mod export;
pub mod resolve;
pub mod run;
pub mod scan;
pub mod stats;

use anyhow::{Context, Result};
use std::sync::Arc;

use scalp_signals::store::{SignalStore, SqliteSignalStore};
use scalp_signals::Config;

pub(crate) fn load_config(path: &str) -> Result<Config> {
    Config::load_or_default(path).with_context(|| format!("Failed to load config from {}", path))
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")
}

pub(crate) fn open_store(config: &Config) -> Result<Arc<dyn SignalStore>> {
    let store = SqliteSignalStore::open(&config.storage.db_path)?;
    Ok(Arc::new(store))
}
