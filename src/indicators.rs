//! Technical indicators for the signal engine
//!
//! Every function here reduces an ordered (oldest to newest) series to the
//! latest indicator value. Short or empty inputs never fail: they degrade to a
//! documented neutral value so a thin warmup window only weakens a snapshot
//! instead of aborting it.
//!
//! | Indicator    | Short-input value            |
//! |--------------|------------------------------|
//! | `ema`        | last value, 0 when empty     |
//! | `rsi`        | 50                           |
//! | `atr`        | mean true range, 0 when empty|
//! | `adx`        | 25                           |
//! | `volume_sma` | mean of all samples          |

use ta::indicators::{ExponentialMovingAverage, SimpleMovingAverage};
use ta::Next;

/// RSI reported when there is not enough history
pub const NEUTRAL_RSI: f64 = 50.0;

/// ADX reported when there is not enough history
pub const NEUTRAL_ADX: f64 = 25.0;

// =============================================================================
// Moving Averages
// =============================================================================

/// Exponential moving average of `values`, seeded with the first sample
///
/// Returns the last value when fewer than `period` samples exist, and 0 for
/// an empty slice.
pub fn ema(values: &[f64], period: usize) -> f64 {
    let Some(&last) = values.last() else {
        return 0.0;
    };
    if values.len() < period {
        return last;
    }

    let mut indicator = match ExponentialMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return last,
    };

    values.iter().fold(last, |_, &v| indicator.next(v))
}

/// Simple moving average over the trailing `period` values
///
/// Falls back to the mean of everything available when the series is shorter
/// than `period`.
pub fn sma(values: &[f64], period: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    if period == 0 || values.len() < period {
        return mean(values);
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return mean(values),
    };

    values.iter().fold(0.0, |_, &v| indicator.next(v))
}

/// Trailing mean volume, same fallback rules as [`sma`]
pub fn volume_sma(volumes: &[f64], period: usize) -> f64 {
    sma(volumes, period)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

// =============================================================================
// Momentum
// =============================================================================

/// Relative Strength Index with Wilder smoothing
///
/// The first average gain/loss is the plain mean of the first `period`
/// changes; later changes are folded in as `(prev * (period - 1) + x) / period`.
/// Returns 50 when `prices.len() <= period` and 100 when there are no losses.
pub fn rsi(prices: &[f64], period: usize) -> f64 {
    if period == 0 || prices.len() <= period {
        return NEUTRAL_RSI;
    }

    let changes: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    let (seed, rest) = changes.split_at(period);

    let mut avg_gain = seed.iter().map(|c| c.max(0.0)).sum::<f64>() / period as f64;
    let mut avg_loss = seed.iter().map(|c| (-c).max(0.0)).sum::<f64>() / period as f64;

    let p = period as f64;
    for change in rest {
        avg_gain = (avg_gain * (p - 1.0) + change.max(0.0)) / p;
        avg_loss = (avg_loss * (p - 1.0) + (-change).max(0.0)) / p;
    }

    if avg_loss == 0.0 {
        return 100.0;
    }

    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}

// =============================================================================
// Volatility
// =============================================================================

/// True range series; the first bar has no previous close and uses high - low
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let n = high.len().min(low.len()).min(close.len());
    let mut tr = Vec::with_capacity(n);

    for i in 0..n {
        let hl = high[i] - low[i];
        let value = if i == 0 {
            hl
        } else {
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            hl.max(hc).max(lc)
        };
        tr.push(value);
    }

    tr
}

/// Average True Range, EMA-smoothed
///
/// Seeds with the mean of the first `period` true ranges, then applies
/// exponential smoothing with alpha = 2/(period+1). With fewer than `period`
/// bars the mean of the available true ranges is returned.
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> f64 {
    if high.len() != low.len() || high.len() != close.len() {
        return 0.0;
    }

    let tr = true_range(high, low, close);
    if tr.is_empty() {
        return 0.0;
    }
    if period == 0 || tr.len() < period {
        return mean(&tr);
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let seed = mean(&tr[..period]);

    tr[period..]
        .iter()
        .fold(seed, |prev, &x| alpha * x + (1.0 - alpha) * prev)
}

// =============================================================================
// Trend Strength
// =============================================================================

/// Apply Wilder's smoothing to a series
/// Wilder's smoothing: new_value = (prev_value * (period - 1) + current) / period
fn wilders_smooth(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![];
    }

    let mut result = Vec::with_capacity(values.len());
    let mut smoothed: Option<f64> = None;

    for i in 0..values.len() {
        if i + 1 < period {
            result.push(None);
        } else if i + 1 == period {
            smoothed = Some(mean(&values[0..period]));
            result.push(smoothed);
        } else if let Some(prev) = smoothed {
            let next = (prev * (period - 1) as f64 + values[i]) / period as f64;
            smoothed = Some(next);
            result.push(smoothed);
        } else {
            result.push(None);
        }
    }

    result
}

/// Directional indicators (+DI, -DI) with Wilder smoothing of DM and TR
pub fn dmi(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    period: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = high.len().min(low.len()).min(close.len());
    if n == 0 || period == 0 {
        return (vec![], vec![]);
    }

    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];

    for i in 1..n {
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];

        if up_move > down_move && up_move > 0.0 {
            plus_dm[i] = up_move;
        }
        if down_move > up_move && down_move > 0.0 {
            minus_dm[i] = down_move;
        }
    }

    let smoothed_plus = wilders_smooth(&plus_dm, period);
    let smoothed_minus = wilders_smooth(&minus_dm, period);
    let smoothed_tr = wilders_smooth(&true_range(&high[..n], &low[..n], &close[..n]), period);

    let mut plus_di = Vec::with_capacity(n);
    let mut minus_di = Vec::with_capacity(n);

    for i in 0..n {
        match (smoothed_plus[i], smoothed_minus[i], smoothed_tr[i]) {
            (Some(pdm), Some(mdm), Some(tr)) if tr > 0.0 => {
                plus_di.push(Some(pdm / tr * 100.0));
                minus_di.push(Some(mdm / tr * 100.0));
            }
            _ => {
                plus_di.push(None);
                minus_di.push(None);
            }
        }
    }

    (plus_di, minus_di)
}

/// Average Directional Index of the latest bar
///
/// Needs `2 * period` bars (one period for DI, one for smoothing DX);
/// returns 25 otherwise.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> f64 {
    let n = high.len().min(low.len()).min(close.len());
    if period == 0 || n < 2 * period {
        return NEUTRAL_ADX;
    }

    let (plus_di, minus_di) = dmi(high, low, close, period);

    let dx: Vec<f64> = plus_di
        .iter()
        .zip(minus_di.iter())
        .skip(period - 1)
        .map(|pair| match pair {
            (Some(p), Some(m)) if p + m > 0.0 => (p - m).abs() / (p + m) * 100.0,
            _ => 0.0,
        })
        .collect();

    wilders_smooth(&dx, period)
        .last()
        .copied()
        .flatten()
        .map(|v| v.clamp(0.0, 100.0))
        .unwrap_or(NEUTRAL_ADX)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_ema_degenerate_inputs() {
        assert_eq!(ema(&[], 10), 0.0);
        assert_eq!(ema(&[3.0, 4.0, 5.0], 10), 5.0);
        assert_eq!(ema(&[7.0], 0), 7.0);
    }

    #[test]
    fn test_ema_recursive_form() {
        // alpha = 0.5: 1, 1.5, 2.25, 3.125, 4.0625
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(ema(&values, 3), 4.0625, epsilon = 1e-9);

        let flat = vec![42.0; 30];
        assert_relative_eq!(ema(&flat, 9), 42.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sma_and_volume_fallback() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(sma(&values, 3), 4.0, epsilon = 1e-9);
        assert_relative_eq!(volume_sma(&values, 20), 3.0, epsilon = 1e-9);
        assert_eq!(volume_sma(&[], 20), 0.0);
    }

    #[test]
    fn test_rsi_neutral_when_short() {
        let prices: Vec<f64> = (0..15).map(|x| 100.0 + x as f64).collect();
        assert_eq!(rsi(&prices[..14], 14), 50.0);
        assert_eq!(rsi(&prices[..1], 14), 50.0);
        assert_eq!(rsi(&[], 14), 50.0);
        // 15 samples is the first length with a real reading
        assert_eq!(rsi(&prices, 14), 100.0);
    }

    #[test]
    fn test_rsi_bounds() {
        let falling: Vec<f64> = (0..40).map(|x| 200.0 - x as f64).collect();
        assert_relative_eq!(rsi(&falling, 14), 0.0, epsilon = 1e-9);

        let values = vec![
            44.0, 44.25, 44.5, 43.75, 44.5, 44.25, 44.0, 43.5, 44.0, 44.5, 45.0, 45.25, 45.5, 45.0,
            44.75, 45.5, 46.0, 45.25,
        ];
        for period in [2, 5, 9, 14] {
            let value = rsi(&values, period);
            assert!((0.0..=100.0).contains(&value), "rsi({}) = {}", period, value);
        }
    }

    #[test]
    fn test_rsi_balanced_zigzag_is_midrange() {
        let mut prices = vec![100.0];
        for i in 0..60 {
            let step = if i % 2 == 0 { 0.3 } else { -0.2 };
            prices.push(prices[i] + step);
        }
        let value = rsi(&prices, 14);
        assert!(value > 52.0 && value < 68.0, "rsi = {}", value);
    }

    #[test]
    fn test_true_range_uses_previous_close() {
        let high = vec![10.0, 12.0];
        let low = vec![9.0, 11.5];
        let close = vec![9.5, 12.0];
        let tr = true_range(&high, &low, &close);
        assert_eq!(tr, vec![1.0, 2.5]);
    }

    #[test]
    fn test_atr_constant_range() {
        let high = vec![101.0; 40];
        let low = vec![99.0; 40];
        let close = vec![100.0; 40];
        assert_relative_eq!(atr(&high, &low, &close, 14), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_atr_non_negative_and_degenerate() {
        assert_eq!(atr(&[], &[], &[], 14), 0.0);
        assert_eq!(atr(&[1.0], &[1.0, 2.0], &[1.0], 14), 0.0);

        let high: Vec<f64> = (0..30).map(|i| 100.0 + (i % 5) as f64).collect();
        let low: Vec<f64> = high.iter().map(|h| h - 1.5).collect();
        let close: Vec<f64> = high.iter().map(|h| h - 0.7).collect();
        assert!(atr(&high, &low, &close, 14) >= 0.0);
        // Short window falls back to the mean true range
        assert!(atr(&high[..5], &low[..5], &close[..5], 14) > 0.0);
    }

    #[test]
    fn test_adx_neutral_when_short() {
        let high = vec![10.0; 20];
        let low = vec![9.0; 20];
        let close = vec![9.5; 20];
        assert_eq!(adx(&high, &low, &close, 14), 25.0);
    }

    #[test]
    fn test_adx_strong_trend() {
        let high: Vec<f64> = (0..60).map(|i| 101.0 + i as f64).collect();
        let low: Vec<f64> = (0..60).map(|i| 99.0 + i as f64).collect();
        let close: Vec<f64> = (0..60).map(|i| 100.5 + i as f64).collect();
        let value = adx(&high, &low, &close, 14);
        assert!(value > 40.0 && value <= 100.0, "adx = {}", value);
    }
}
