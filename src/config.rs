//! Configuration management
//!
//! Loads the engine configuration from a JSON file. Every section has a
//! `Default` carrying the canonical thresholds, and every field is optional in
//! the file, so `{}` is a valid configuration. Environment variables (after
//! `.env` is loaded) override storage, notifier and symbol settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::EngineError;
use crate::market_data::RetryPolicy;
use crate::outcome::OutcomePolicy;
use crate::{AssetClass, Symbol};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub indicators: IndicatorConfig,
    pub scoring: ScoringConfig,
    pub gate: GateConfig,
    pub cooldown: CooldownConfig,
    pub dispatch: DispatchConfig,
    pub outcome: OutcomeConfig,
    pub storage: StorageConfig,
    pub notifier: NotifierConfig,
    pub advisor: AdvisorConfig,
}

impl Config {
    /// Load configuration from a JSON file and apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let mut config = Config::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(db) = std::env::var("SCALP_SIGNALS_DB") {
            self.storage.db_path = db;
        }
        if let Ok(url) = std::env::var("SCALP_NOTIFY_WEBHOOK") {
            self.notifier.kind = NotifierKind::Webhook;
            self.notifier.webhook_url = Some(url);
        }
        if let Ok(symbols) = std::env::var("SCALP_SYMBOLS") {
            let parsed: Vec<String> = symbols
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if !parsed.is_empty() {
                self.data.symbols = parsed;
            }
        }
    }

    /// Reject threshold combinations the engine cannot act on
    pub fn validate(&self) -> Result<(), EngineError> {
        let fail = |msg: &str| Err(EngineError::Config(msg.to_string()));

        if self.data.symbols.is_empty() {
            return fail("data.symbols must not be empty");
        }
        if self.data.min_one_minute_candles > self.data.one_minute_limit as usize {
            return fail("data.min_one_minute_candles exceeds data.one_minute_limit");
        }
        let periods = [
            self.indicators.rsi_period,
            self.indicators.atr_period,
            self.indicators.adx_period,
            self.indicators.volume_sma_period,
            self.indicators.trend_fast_period,
            self.indicators.trend_slow_period,
            self.indicators.trend_slope_lookback,
            self.gate.breakout_volume_lookback,
            self.indicators.btc.ema_fast,
            self.indicators.btc.ema_slow,
            self.indicators.eth.ema_fast,
            self.indicators.eth.ema_slow,
            self.indicators.alt.ema_fast,
            self.indicators.alt.ema_slow,
        ];
        if periods.contains(&0) {
            return fail("indicator periods must be positive");
        }
        let tunings = [&self.indicators.btc, &self.indicators.eth, &self.indicators.alt];
        if tunings
            .iter()
            .any(|t| t.tp_atr_multiplier <= 0.0 || t.sl_atr_multiplier <= 0.0)
        {
            return fail("ATR multipliers must be positive");
        }
        let sessions = &self.scoring.sessions;
        if sessions
            .active_hours
            .iter()
            .chain(std::iter::once(&sessions.peak_hours))
            .any(|(start, end)| start > end || *end > 23)
        {
            return fail("scoring.sessions hour ranges must be ordered within 0..=23");
        }
        if self.gate.rsi_lower >= self.gate.rsi_upper {
            return fail("gate.rsi_lower must be below gate.rsi_upper");
        }
        let counts = [
            self.gate.buy_required_favorable,
            self.gate.buy_required,
            self.gate.sell_required_favorable,
            self.gate.sell_required,
        ];
        if counts.iter().any(|&c| c == 0 || c > crate::criteria::PRIMARY_CRITERIA) {
            return fail("gate required counts must be within 1..=8");
        }
        if self.dispatch.cap_bypass_score < self.dispatch.notify_min_score {
            return fail("dispatch.cap_bypass_score must not be below dispatch.notify_min_score");
        }
        if self.cooldown.ultra_score < self.cooldown.high_score {
            return fail("cooldown.ultra_score must not be below cooldown.high_score");
        }
        if self.advisor.low_win_rate_pct >= self.advisor.high_win_rate_pct {
            return fail("advisor.low_win_rate_pct must be below advisor.high_win_rate_pct");
        }
        if self.notifier.kind == NotifierKind::Webhook && self.notifier.webhook_url.is_none() {
            return fail("notifier.webhook_url is required for the webhook notifier");
        }
        Ok(())
    }
}

/// Market data polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub symbols: Vec<String>,
    pub poll_interval_secs: u64,
    /// Pause between symbols inside one cycle
    pub symbol_pause_ms: u64,
    pub fetch_timeout_secs: u64,
    pub one_minute_limit: u32,
    pub five_minute_limit: u32,
    pub fifteen_minute_limit: u32,
    pub one_hour_limit: u32,
    /// Below this many 1m candles the symbol is skipped for the cycle
    pub min_one_minute_candles: usize,
    pub retry: RetryPolicy,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            symbols: vec![
                "BTCUSDT".to_string(),
                "ETHUSDT".to_string(),
                "SOLUSDT".to_string(),
            ],
            poll_interval_secs: 60,
            symbol_pause_ms: 100,
            fetch_timeout_secs: 10,
            one_minute_limit: 100,
            five_minute_limit: 50,
            fifteen_minute_limit: 50,
            one_hour_limit: 100,
            min_one_minute_candles: 50,
            retry: RetryPolicy::NextTick,
        }
    }
}

impl DataConfig {
    pub fn symbols(&self) -> Vec<Symbol> {
        self.symbols.iter().map(Symbol::new).collect()
    }
}

/// 1m EMA periods and ATR target multipliers for one asset class.
/// All four fields are required when a class is overridden.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AssetTuning {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub tp_atr_multiplier: f64,
    pub sl_atr_multiplier: f64,
}

/// Indicator periods
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub atr_period: usize,
    pub adx_period: usize,
    pub volume_sma_period: usize,
    pub trend_fast_period: usize,
    pub trend_slow_period: usize,
    pub trend_slope_lookback: usize,
    pub trend_slope_threshold_pct: f64,
    pub btc: AssetTuning,
    pub eth: AssetTuning,
    pub alt: AssetTuning,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig {
            rsi_period: 14,
            atr_period: 14,
            adx_period: 14,
            volume_sma_period: 20,
            trend_fast_period: 20,
            trend_slow_period: 50,
            trend_slope_lookback: 10,
            trend_slope_threshold_pct: 0.1,
            btc: AssetTuning {
                ema_fast: 10,
                ema_slow: 21,
                tp_atr_multiplier: 2.5,
                sl_atr_multiplier: 1.2,
            },
            eth: AssetTuning {
                ema_fast: 9,
                ema_slow: 23,
                tp_atr_multiplier: 2.8,
                sl_atr_multiplier: 1.3,
            },
            alt: AssetTuning {
                ema_fast: 7,
                ema_slow: 20,
                tp_atr_multiplier: 3.0,
                sl_atr_multiplier: 1.5,
            },
        }
    }
}

impl IndicatorConfig {
    pub fn tuning(&self, class: AssetClass) -> &AssetTuning {
        match class {
            AssetClass::Btc => &self.btc,
            AssetClass::Eth => &self.eth,
            AssetClass::Alt => &self.alt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoringModel {
    #[default]
    Realistic,
    Classic,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub model: ScoringModel,
    pub sessions: SessionConfig,
}

/// Liquidity points by UTC session; hour ranges are inclusive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub peak_hours: (u32, u32),
    pub peak_points: f64,
    pub active_hours: Vec<(u32, u32)>,
    pub active_points: f64,
    pub off_points: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            peak_hours: (13, 16),
            peak_points: 10.0,
            active_hours: vec![(7, 12), (17, 21)],
            active_points: 6.0,
            off_points: 2.0,
        }
    }
}

impl SessionConfig {
    pub fn points(&self, utc_hour: u32) -> f64 {
        let within = |(start, end): &(u32, u32)| (*start..=*end).contains(&utc_hour);
        if within(&self.peak_hours) {
            self.peak_points
        } else if self.active_hours.iter().any(within) {
            self.active_points
        } else {
            self.off_points
        }
    }
}

/// Thresholds for the eight criteria and the required counts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Reject counter-trend directions outright
    pub trend_filter: bool,
    pub rsi_lower: f64,
    pub rsi_upper: f64,
    pub rsi_15m_pivot: f64,
    pub volume_multiplier: f64,
    pub candle_change_min_pct: f64,
    pub breakout_volume_lookback: usize,
    pub breakout_volume_multiplier: f64,
    pub breakout_min_body_ratio: f64,
    /// Close must sit in the outer part of the range beyond this fraction
    pub breakout_close_position: f64,
    pub buy_required_favorable: usize,
    pub buy_required: usize,
    pub sell_required_favorable: usize,
    pub sell_required: usize,
    pub buy_min_score_favorable: f64,
    pub buy_min_score: f64,
    pub sell_min_score_favorable: f64,
    pub sell_min_score: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig {
            trend_filter: true,
            rsi_lower: 30.0,
            rsi_upper: 70.0,
            rsi_15m_pivot: 50.0,
            volume_multiplier: 1.2,
            candle_change_min_pct: 0.1,
            breakout_volume_lookback: 10,
            breakout_volume_multiplier: 1.2,
            breakout_min_body_ratio: 0.6,
            breakout_close_position: 0.6,
            buy_required_favorable: 5,
            buy_required: 6,
            sell_required_favorable: 4,
            sell_required: 6,
            buy_min_score_favorable: 70.0,
            buy_min_score: 75.0,
            sell_min_score_favorable: 65.0,
            sell_min_score: 70.0,
        }
    }
}

/// Score-tiered cooldown and minimum price distance between signals
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub ultra_score: f64,
    pub ultra_minutes: i64,
    pub high_score: f64,
    pub high_minutes: i64,
    pub default_minutes: i64,
    pub min_price_move_pct: f64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        CooldownConfig {
            ultra_score: 95.0,
            ultra_minutes: 5,
            high_score: 90.0,
            high_minutes: 15,
            default_minutes: 30,
            min_price_move_pct: 0.5,
        }
    }
}

impl CooldownConfig {
    /// Cooldown window for a signal with the given score
    pub fn window_for(&self, score: f64) -> chrono::Duration {
        let minutes = if score >= self.ultra_score {
            self.ultra_minutes
        } else if score >= self.high_score {
            self.high_minutes
        } else {
            self.default_minutes
        };
        chrono::Duration::minutes(minutes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub notify_min_score: f64,
    pub daily_cap: u32,
    /// Scores at or above this are notified even when the cap is reached
    pub cap_bypass_score: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        DispatchConfig {
            notify_min_score: 90.0,
            daily_cap: 10,
            cap_bypass_score: 95.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutcomeConfig {
    pub check_interval_secs: u64,
    pub scheduled: OutcomePolicy,
    pub forced: OutcomePolicy,
}

impl Default for OutcomeConfig {
    fn default() -> Self {
        OutcomeConfig {
            check_interval_secs: 300,
            scheduled: OutcomePolicy::scheduled(),
            forced: OutcomePolicy::forced(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            db_path: "data/signals.db".to_string(),
        }
    }
}

/// Thresholds for the tuning recommendations printed by `stats`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorConfig {
    pub window_hours: i64,
    /// Fewer resolved signals than this in the window gives no advice
    pub min_signals: usize,
    pub low_win_rate_pct: f64,
    pub high_win_rate_pct: f64,
    /// Step applied to `dispatch.notify_min_score` when suggesting a new bar
    pub score_step: f64,
    pub max_avg_minutes: f64,
    pub min_avg_return_pct: f64,
    /// Factor suggested for the TP ATR multipliers
    pub take_profit_widen_factor: f64,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        AdvisorConfig {
            window_hours: 24,
            min_signals: 20,
            low_win_rate_pct: 40.0,
            high_win_rate_pct: 60.0,
            score_step: 5.0,
            max_avg_minutes: 120.0,
            min_avg_return_pct: 0.3,
            take_profit_widen_factor: 1.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Log,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub kind: NotifierKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        NotifierConfig {
            kind: NotifierKind::Log,
            webhook_url: None,
            timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_gives_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.data.symbols.len(), 3);
        assert_eq!(config.data.poll_interval_secs, 60);
        assert_eq!(config.gate.buy_required_favorable, 5);
        assert_eq!(config.gate.sell_required_favorable, 4);
        assert_eq!(config.dispatch.daily_cap, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_section_override() {
        let config: Config =
            serde_json::from_str(r#"{"gate": {"trend_filter": false}, "dispatch": {"notify_min_score": 80}}"#)
                .unwrap();
        assert!(!config.gate.trend_filter);
        assert_eq!(config.gate.rsi_upper, 70.0);
        assert_eq!(config.dispatch.notify_min_score, 80.0);
        assert_eq!(config.dispatch.cap_bypass_score, 95.0);
    }

    #[test]
    fn test_cooldown_tiers() {
        let cooldown = CooldownConfig::default();
        assert_eq!(cooldown.window_for(96.0), chrono::Duration::minutes(5));
        assert_eq!(cooldown.window_for(95.0), chrono::Duration::minutes(5));
        assert_eq!(cooldown.window_for(92.0), chrono::Duration::minutes(15));
        assert_eq!(cooldown.window_for(60.0), chrono::Duration::minutes(30));
    }

    #[test]
    fn test_validation_rejects_bad_thresholds() {
        let mut config = Config::default();
        config.gate.buy_required = 9;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.data.symbols.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.dispatch.cap_bypass_score = 50.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.notifier.kind = NotifierKind::Webhook;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.indicators.eth.sl_atr_multiplier = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scoring.sessions.peak_hours = (16, 13);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_asset_tuning_and_sessions() {
        let config: Config = serde_json::from_str(
            r#"{"indicators": {"alt": {"ema_fast": 5, "ema_slow": 15, "tp_atr_multiplier": 4.0, "sl_atr_multiplier": 2.0}},
                "scoring": {"sessions": {"peak_points": 12}}}"#,
        )
        .unwrap();
        assert_eq!(config.indicators.tuning(AssetClass::Alt).ema_fast, 5);
        assert_eq!(config.indicators.tuning(AssetClass::Btc).tp_atr_multiplier, 2.5);
        assert_eq!(config.indicators.tuning(AssetClass::Eth).ema_slow, 23);

        let sessions = &config.scoring.sessions;
        assert_eq!(sessions.points(14), 12.0);
        assert_eq!(sessions.points(7), 6.0);
        assert_eq!(sessions.points(21), 6.0);
        assert_eq!(sessions.points(3), 2.0);
        assert!(config.validate().is_ok());
    }
}
