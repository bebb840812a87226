//! Macro trend label from the 1h series

use crate::config::IndicatorConfig;
use crate::indicators::ema;
use crate::{Candle, MarketTrend};

/// Percent move of the close over the last `lookback` bars
pub fn slope_pct(closes: &[f64], lookback: usize) -> Option<f64> {
    if lookback == 0 || closes.len() <= lookback {
        return None;
    }
    let last = closes[closes.len() - 1];
    let base = closes[closes.len() - 1 - lookback];
    if base == 0.0 {
        return None;
    }
    Some((last - base) / base * 100.0)
}

/// BULLISH / BEARISH when EMA(fast) vs EMA(slow) and the recent slope agree,
/// SIDEWAYS otherwise or when there is not enough 1h history.
pub fn market_trend(one_hour: &[Candle], cfg: &IndicatorConfig) -> MarketTrend {
    let closes: Vec<f64> = one_hour.iter().map(|c| c.close).collect();

    let Some(slope) = slope_pct(&closes, cfg.trend_slope_lookback) else {
        return MarketTrend::Sideways;
    };

    let fast = ema(&closes, cfg.trend_fast_period);
    let slow = ema(&closes, cfg.trend_slow_period);
    let threshold = cfg.trend_slope_threshold_pct;

    if fast > slow && slope > threshold {
        MarketTrend::Bullish
    } else if fast < slow && slope < -threshold {
        MarketTrend::Bearish
    } else {
        MarketTrend::Sideways
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};

    fn hourly(closes: &[f64]) -> Vec<Candle> {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let t = start + Duration::hours(i as i64);
                Candle::new_unchecked(t, t + Duration::hours(1), c, c + 0.5, c - 0.5, c, 1000.0)
            })
            .collect()
    }

    #[test]
    fn test_uptrend_is_bullish() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + i as f64 * 0.5).collect();
        assert_eq!(
            market_trend(&hourly(&closes), &IndicatorConfig::default()),
            MarketTrend::Bullish
        );
    }

    #[test]
    fn test_downtrend_is_bearish() {
        let closes: Vec<f64> = (0..100).map(|i| 200.0 - i as f64 * 0.5).collect();
        assert_eq!(
            market_trend(&hourly(&closes), &IndicatorConfig::default()),
            MarketTrend::Bearish
        );
    }

    #[test]
    fn test_flat_and_short_series_are_sideways() {
        let cfg = IndicatorConfig::default();
        assert_eq!(market_trend(&hourly(&[100.0; 100]), &cfg), MarketTrend::Sideways);
        assert_eq!(market_trend(&hourly(&[100.0, 101.0, 102.0]), &cfg), MarketTrend::Sideways);
        assert_eq!(market_trend(&[], &cfg), MarketTrend::Sideways);
    }

    #[test]
    fn test_slope_needs_lookback() {
        assert_eq!(slope_pct(&[1.0, 2.0], 10), None);
        let closes: Vec<f64> = (0..11).map(|i| 100.0 + i as f64).collect();
        assert_eq!(slope_pct(&closes, 10), Some(10.0));
    }
}
